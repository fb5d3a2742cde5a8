use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// State of a bilateral forward contract.
///
/// Unlike an option, settlement at the delivery date is unconditional: the long wallet
/// pays the agreed forward price and the short wallet delivers the underlying.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardState {
    pub underlying: UnitSymbol,
    pub forward_price: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub delivery_date: DateTime<Utc>,
    /// Number of underlying units delivered per contract.
    pub quantity_per_contract: Decimal,
    pub currency: UnitSymbol,
    pub long_wallet: WalletId,
    pub short_wallet: WalletId,
    pub novation_from: Option<WalletId>,
    pub settled: bool,
}
