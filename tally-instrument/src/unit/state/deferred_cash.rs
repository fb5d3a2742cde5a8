use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// State of a deferred-cash unit - a future payment obligation held as a position.
///
/// The unit is held either by the payer (trade-settlement pattern) or by the payee
/// (dividend-entitlement pattern); settlement pays the cash and extinguishes the holding
/// back to the SYSTEM wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeferredCashState {
    pub amount: Decimal,
    pub currency: UnitSymbol,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub payment_date: DateTime<Utc>,
    pub payer_wallet: WalletId,
    pub payee_wallet: WalletId,
    pub settled: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub settlement_time: Option<DateTime<Utc>>,
    /// Optional reference to the originating trade, dividend or fee.
    pub reference: Option<SmolStr>,
}
