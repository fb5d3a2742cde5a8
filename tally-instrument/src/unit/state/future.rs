use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of an exchange-traded future with daily mark-to-market.
///
/// Per-wallet `virtual_cash` accumulates `-qty * price * multiplier` for every trade: it
/// is the cash the wallet would hold had all trades settled immediately. Daily MTM pays
/// out the difference between `virtual_cash` and its target at the settle price, then
/// resets it. Invariants: positions across wallets sum to zero, and so does virtual cash.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FutureState {
    pub underlying: UnitSymbol,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiry: DateTime<Utc>,
    /// Contract multiplier - underlying units of notional per contract.
    pub multiplier: Decimal,
    pub currency: UnitSymbol,
    pub clearinghouse: WalletId,
    pub last_settle_price: Option<Decimal>,
    pub last_settle_date: Option<NaiveDate>,
    pub settled: bool,
    pub settlement_price: Option<Decimal>,
    pub wallets: BTreeMap<WalletId, FutureWalletState>,
}

/// Per-wallet tracked state of a [`FutureState`].
///
/// `position` is redundant with the ledger balance and exists for defense-in-depth
/// reconciliation before every trade and mark.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct FutureWalletState {
    pub position: Decimal,
    pub virtual_cash: Decimal,
}
