use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// State of a securities-lending borrow record.
///
/// The record unit is held by the borrower and tracks the liability: shares received
/// from the lender that must be returned, with a running fee settled through a
/// deferred-cash obligation at return time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BorrowState {
    pub stock: UnitSymbol,
    pub lender: WalletId,
    pub borrower: WalletId,
    pub quantity: Decimal,
    /// Annualised borrow fee in basis points.
    pub fee_rate_bps: Decimal,
    pub currency: UnitSymbol,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_date: DateTime<Utc>,
    /// Optional term end; open-ended borrows are returned on demand.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub term_end: Option<DateTime<Utc>>,
    pub returned: bool,
}
