use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Kind of a [`Unit`](super::Unit) - determines which typed state the unit carries and
/// which smart contract the lifecycle engine polls for it.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    Cash,
    Stock,
    Bond,
    BilateralOption,
    BilateralForward,
    Future,
    DeferredCash,
    BorrowRecord,
    DeltaHedgeStrategy,
    StructuredNote,
    Qis,
}

impl Display for UnitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                UnitKind::Cash => "CASH",
                UnitKind::Stock => "STOCK",
                UnitKind::Bond => "BOND",
                UnitKind::BilateralOption => "BILATERAL_OPTION",
                UnitKind::BilateralForward => "BILATERAL_FORWARD",
                UnitKind::Future => "FUTURE",
                UnitKind::DeferredCash => "DEFERRED_CASH",
                UnitKind::BorrowRecord => "BORROW_RECORD",
                UnitKind::DeltaHedgeStrategy => "DELTA_HEDGE_STRATEGY",
                UnitKind::StructuredNote => "STRUCTURED_NOTE",
                UnitKind::Qis => "QIS",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_kind_serde_round_trip() {
        let json = serde_json::to_string(&UnitKind::BilateralOption).unwrap();
        assert_eq!(json, "\"BILATERAL_OPTION\"");
        assert_eq!(
            serde_json::from_str::<UnitKind>(&json).unwrap(),
            UnitKind::BilateralOption
        );
    }

    #[test]
    fn test_unit_kind_display_matches_serde() {
        assert_eq!(UnitKind::DeltaHedgeStrategy.to_string(), "DELTA_HEDGE_STRATEGY");
        assert_eq!(UnitKind::Qis.to_string(), "QIS");
    }
}
