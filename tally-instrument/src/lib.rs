#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Tally-Instrument
//! Tally-Instrument contains the core Wallet, Unit and instrument-state data structures
//! consumed by the Tally ledger, as well as associated utilities.
//!
//! A [`Unit`](unit::Unit) is a fungible ledger asset class (cash, stock, option contract,
//! etc.) identified by a [`UnitSymbol`](unit::UnitSymbol) and carrying per-kind typed state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Defines the [`WalletId`](wallet::WalletId) identifier and the reserved SYSTEM wallet.
pub mod wallet;

/// [`Unit`](unit::Unit) related data structures.
///
/// eg/ `UnitKind`, `UnitState`, `TransferRule`, etc.
pub mod unit;

/// Quantities with magnitude at or below this threshold are treated as dust: they are
/// invalid as move quantities and are evicted from the inverted position index.
pub const QUANTITY_EPSILON: Decimal = dec!(0.000000000001);

/// Returns true if the provided quantity is at or below the dust threshold.
pub fn is_dust(quantity: Decimal) -> bool {
    quantity.abs() <= QUANTITY_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_dust() {
        assert!(is_dust(Decimal::ZERO));
        assert!(is_dust(dec!(0.000000000001)));
        assert!(is_dust(dec!(-0.000000000001)));
        assert!(!is_dust(dec!(0.00000000001)));
        assert!(!is_dust(dec!(1)));
    }
}
