use crate::{error::LedgerError, ledger::view::LedgerView, pricing::PriceMap, transaction::PendingTransaction};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tally_instrument::unit::{UnitSymbol, kind::UnitKind};

/// Bilateral options with physical delivery.
pub mod option;

/// Bilateral forwards with unconditional delivery.
pub mod forward;

/// Exchange-traded futures with virtual-cash daily mark-to-market.
pub mod future;

/// Dividend-paying stocks with deferred-cash entitlement settlement.
pub mod stock;

/// Deferred-cash payment obligations.
pub mod deferred_cash;

/// Delta-hedge strategies rebalancing against Black-Scholes delta.
pub mod delta_hedge;

/// Quantitative investment strategy swaps.
pub mod qis;

/// Fixed-coupon bonds.
pub mod bond;

/// Securities-lending borrow records.
pub mod borrow;

/// A smart contract: a pure function deriving a [`PendingTransaction`] from current
/// state, time and prices.
///
/// Contracts are polled by the lifecycle engine once per registered unit of their kind
/// per pass; returning an empty pending transaction means nothing to do. They receive a
/// read-only view and must not carry hidden state, so the engine can invoke them in any
/// order consistent with the symbol sort.
pub type SmartContract = fn(
    &dyn LedgerView,
    &UnitSymbol,
    DateTime<Utc>,
    &PriceMap,
) -> Result<PendingTransaction, LedgerError>;

/// The default kind -> contract registry covering every built-in instrument family.
pub fn default_contracts() -> IndexMap<UnitKind, SmartContract> {
    IndexMap::from([
        (UnitKind::BilateralOption, option::option_contract as SmartContract),
        (UnitKind::BilateralForward, forward::forward_contract as SmartContract),
        (UnitKind::Future, future::future_contract as SmartContract),
        (UnitKind::Stock, stock::stock_contract as SmartContract),
        (UnitKind::DeferredCash, deferred_cash::deferred_cash_contract as SmartContract),
        (UnitKind::DeltaHedgeStrategy, delta_hedge::delta_hedge_contract as SmartContract),
        (UnitKind::Qis, qis::qis_contract as SmartContract),
        (UnitKind::Bond, bond::bond_contract as SmartContract),
        (UnitKind::BorrowRecord, borrow::borrow_contract as SmartContract),
    ])
}
