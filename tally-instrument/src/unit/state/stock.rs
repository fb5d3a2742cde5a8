use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, ToSmolStr};
use std::collections::BTreeSet;

/// State of a dividend-paying stock.
///
/// Dividends settle in two phases: on the ex-date, entitlements are snapshotted into
/// freshly minted deferred-cash units (one per holder); the cash itself moves when those
/// units settle on the payment date.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StockState {
    /// Wallet that issues shares and pays dividends.
    pub issuer: WalletId,
    pub currency: UnitSymbol,
    pub shortable: bool,
    pub dividend_schedule: Vec<Dividend>,
    /// Keys of dividends whose entitlements have been created - see [`Dividend::key`].
    pub processed_dividends: BTreeSet<SmolStr>,
}

/// A scheduled dividend payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Dividend {
    /// When entitlements are computed.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ex_date: DateTime<Utc>,
    /// When cash is paid, via deferred-cash settlement.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub payment_date: DateTime<Utc>,
    pub amount_per_share: Decimal,
    pub currency: UnitSymbol,
}

impl Dividend {
    /// Unique processing key: the ISO date of the ex-date.
    pub fn key(&self) -> SmolStr {
        self.ex_date.date_naive().to_smolstr()
    }
}
