use crate::{unit::UnitSymbol, wallet::WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// State of a bilateral option contract with physical settlement.
///
/// The long wallet holds the right; the short wallet carries the obligation. Holdings of
/// the option unit itself are restricted to this pair by the bilateral transfer rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OptionState {
    pub underlying: UnitSymbol,
    pub strike: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub maturity: DateTime<Utc>,
    pub kind: OptionKind,
    /// Number of underlying units delivered per contract.
    pub quantity_per_contract: Decimal,
    pub currency: UnitSymbol,
    pub long_wallet: WalletId,
    pub short_wallet: WalletId,
    pub novation_from: Option<WalletId>,
    pub settled: bool,
    pub settlement_price: Option<Decimal>,
    pub exercised: bool,
}

/// [`OptionState`] kind - Put or Call.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[serde(alias = "CALL", alias = "Call")]
    Call,
    #[serde(alias = "PUT", alias = "Put")]
    Put,
}

impl Display for OptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OptionKind::Call => "call",
                OptionKind::Put => "put",
            }
        )
    }
}

impl OptionState {
    /// Return true if the option is in the money at the provided underlying price.
    pub fn is_itm(&self, price: Decimal) -> bool {
        match self.kind {
            OptionKind::Call => price > self.strike,
            OptionKind::Put => price < self.strike,
        }
    }
}
