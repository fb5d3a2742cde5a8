use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tally_instrument::{
    unit::{Unit, UnitSymbol, state::UnitState},
    wallet::WalletId,
};

/// Read-only projection of a [`Ledger`](super::Ledger), consumed by every pure function.
///
/// Smart contracts, event handlers and transfer rules take only a `&dyn LedgerView`;
/// they cannot mutate the ledger. All iteration the view exposes is in sorted order so
/// that pure functions built on it are deterministic.
pub trait LedgerView {
    /// Current logical time of the ledger.
    fn current_time(&self) -> DateTime<Utc>;

    /// Balance of a unit in a wallet (zero when the wallet holds none).
    fn get_balance(&self, wallet: &WalletId, unit: &UnitSymbol) -> Result<Decimal, LedgerError>;

    /// The registered unit descriptor for a symbol.
    fn get_unit(&self, symbol: &UnitSymbol) -> Result<&Unit, LedgerError>;

    /// Deep copy of a unit's internal state - safe to inspect without aliasing the
    /// ledger.
    fn get_unit_state(&self, symbol: &UnitSymbol) -> Result<UnitState, LedgerError>;

    /// All non-dust positions for a unit, keyed by wallet.
    fn get_positions(&self, unit: &UnitSymbol) -> BTreeMap<WalletId, Decimal>;

    /// All registered wallet identifiers.
    fn list_wallets(&self) -> BTreeSet<WalletId>;

    /// All registered unit symbols, sorted.
    fn list_units(&self) -> Vec<UnitSymbol>;

    /// All balances held by a wallet.
    fn get_wallet_balances(
        &self,
        wallet: &WalletId,
    ) -> Result<BTreeMap<UnitSymbol, Decimal>, LedgerError>;

    /// Total supply of a unit summed over wallets in sorted order, so accumulation is
    /// stable across runs.
    fn total_supply(&self, unit: &UnitSymbol) -> Result<Decimal, LedgerError>;

    /// Check if a wallet is registered.
    fn is_registered(&self, wallet: &WalletId) -> bool;
}
