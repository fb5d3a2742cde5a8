use crate::unit::{kind::UnitKind, state::UnitState, transfer::TransferRule};
use derive_more::Display;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;

/// Defines the [`UnitKind`] enum covering every instrument family the ledger understands.
pub mod kind;

/// Defines the [`TransferRule`] restrictions a unit may impose on moves.
pub mod transfer;

/// Typed per-kind unit state.
///
/// eg/ `OptionState`, `FutureState`, etc.
pub mod state;

/// Unique `SmolStr` identifier for a [`Unit`].
///
/// Case-preserving: instrument symbols such as `AAPL_CALL_150_DEC25` are case-significant.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct UnitSymbol(SmolStr);

impl UnitSymbol {
    /// Construct a new [`Self`] from the provided `Into<SmolStr>`.
    pub fn new<S>(symbol: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(symbol.into())
    }

    /// Return the unit `SmolStr` symbol of [`Self`].
    pub fn name(&self) -> &SmolStr {
        &self.0
    }
}

impl From<&str> for UnitSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SmolStr> for UnitSymbol {
    fn from(value: SmolStr) -> Self {
        Self::new(value)
    }
}

impl From<String> for UnitSymbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for UnitSymbol {
    fn borrow(&self) -> &str {
        self.0.borrow()
    }
}

impl AsRef<str> for UnitSymbol {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Comprehensive Unit descriptor, containing all the data required to validate moves,
/// round balances and drive the unit's lifecycle.
///
/// Balance bounds are inclusive per-wallet limits (`None` = unbounded); the SYSTEM wallet
/// is exempt. `decimal_places` of `None` leaves balances unrounded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Unit {
    pub symbol: UnitSymbol,
    pub name: SmolStr,
    pub kind: UnitKind,
    pub min_balance: Option<Decimal>,
    pub max_balance: Option<Decimal>,
    pub decimal_places: Option<u32>,
    pub transfer_rule: Option<TransferRule>,
    pub state: UnitState,
}

impl Unit {
    /// Construct a new stateless [`Self`] with the provided data.
    pub fn new<Symbol, Name>(
        symbol: Symbol,
        name: Name,
        kind: UnitKind,
        min_balance: Option<Decimal>,
        max_balance: Option<Decimal>,
        decimal_places: Option<u32>,
    ) -> Self
    where
        Symbol: Into<UnitSymbol>,
        Name: Into<SmolStr>,
    {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            kind,
            min_balance,
            max_balance,
            decimal_places,
            transfer_rule: None,
            state: UnitState::None,
        }
    }

    /// Construct a cash [`Self`] with the default 2 decimal places and a zero lower bound.
    pub fn cash<Symbol, Name>(symbol: Symbol, name: Name) -> Self
    where
        Symbol: Into<UnitSymbol>,
        Name: Into<SmolStr>,
    {
        Self::new(
            symbol,
            name,
            UnitKind::Cash,
            Some(Decimal::ZERO),
            None,
            Some(CASH_DECIMAL_PLACES),
        )
    }

    /// Attach the provided [`TransferRule`] to [`Self`].
    pub fn with_transfer_rule(self, rule: TransferRule) -> Self {
        Self {
            transfer_rule: Some(rule),
            ..self
        }
    }

    /// Attach the provided [`UnitState`] to [`Self`].
    pub fn with_state(self, state: UnitState) -> Self {
        Self { state, ..self }
    }

    /// Round the provided value to this unit's decimal places using banker's rounding.
    ///
    /// Applied at every balance write so stored balances are always in canonical form.
    pub fn round(&self, value: Decimal) -> Decimal {
        round_to(self.decimal_places, value)
    }

    /// Return true if the provided balance satisfies this unit's inclusive bounds.
    pub fn within_bounds(&self, balance: Decimal) -> bool {
        if let Some(min) = self.min_balance
            && balance < min
        {
            return false;
        }
        if let Some(max) = self.max_balance
            && balance > max
        {
            return false;
        }
        true
    }
}

/// Round a value to the provided decimal places (banker's rounding), or leave it
/// untouched when unrounded.
pub fn round_to(decimal_places: Option<u32>, value: Decimal) -> Decimal {
    match decimal_places {
        Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven),
        None => value,
    }
}

/// Default decimal places for cash units.
pub const CASH_DECIMAL_PLACES: u32 = 2;

/// Default decimal places for stock units.
pub const STOCK_DECIMAL_PLACES: u32 = 6;

/// Default decimal places for bilateral option and forward units.
pub const CONTRACT_DECIMAL_PLACES: u32 = 2;

/// Default decimal places for delta-hedge strategy units.
pub const STRATEGY_DECIMAL_PLACES: u32 = 4;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unit_round_bankers() {
        let usd = Unit::cash("USD", "US Dollar");

        struct TestCase {
            input: Decimal,
            expected: Decimal,
        }

        let cases = vec![
            // TC0: round half to even, down
            TestCase {
                input: dec!(2.125),
                expected: dec!(2.12),
            },
            // TC1: round half to even, up
            TestCase {
                input: dec!(2.135),
                expected: dec!(2.14),
            },
            // TC2: already canonical
            TestCase {
                input: dec!(2.10),
                expected: dec!(2.10),
            },
            // TC3: negative half
            TestCase {
                input: dec!(-2.125),
                expected: dec!(-2.12),
            },
        ];

        for (index, test) in cases.iter().enumerate() {
            assert_eq!(usd.round(test.input), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_unit_round_unrounded() {
        let unit = Unit::new("RAW", "Unrounded", UnitKind::Cash, None, None, None);
        assert_eq!(unit.round(dec!(1.23456789)), dec!(1.23456789));
    }

    #[test]
    fn test_unit_within_bounds() {
        let unit = Unit::new(
            "S",
            "Stock",
            UnitKind::Stock,
            Some(Decimal::ZERO),
            Some(dec!(100)),
            Some(STOCK_DECIMAL_PLACES),
        );
        assert!(unit.within_bounds(Decimal::ZERO));
        assert!(unit.within_bounds(dec!(100)));
        assert!(!unit.within_bounds(dec!(-0.000001)));
        assert!(!unit.within_bounds(dec!(100.000001)));
    }
}
