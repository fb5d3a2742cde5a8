use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// State of a fixed-coupon bond.
///
/// Coupons are paid per unit held on each scheduled date; at maturity the issuer repays
/// face value and the units are retired back to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BondState {
    pub issuer: WalletId,
    pub currency: UnitSymbol,
    pub face_value: Decimal,
    /// Annualised coupon rate, eg/ 0.05 for 5%.
    pub coupon_rate: Decimal,
    pub coupon_schedule: Vec<Coupon>,
    pub next_coupon_index: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub maturity: DateTime<Utc>,
    pub redeemed: bool,
}

/// A scheduled coupon payment of a [`BondState`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Coupon {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub payment_date: DateTime<Utc>,
    /// Cash amount paid per bond unit held.
    pub amount_per_unit: Decimal,
}
