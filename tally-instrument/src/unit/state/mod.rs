use crate::wallet::WalletId;
use serde::{Deserialize, Serialize};

pub mod bond;
pub mod borrow;
pub mod deferred_cash;
pub mod delta_hedge;
pub mod forward;
pub mod future;
pub mod option;
pub mod qis;
pub mod stock;

pub use bond::{BondState, Coupon};
pub use borrow::BorrowState;
pub use deferred_cash::DeferredCashState;
pub use delta_hedge::DeltaHedgeState;
pub use forward::ForwardState;
pub use future::{FutureState, FutureWalletState};
pub use option::{OptionKind, OptionState};
pub use qis::{QisState, QisStrategy};
pub use stock::{Dividend, StockState};

/// Mutable internal state of a [`Unit`](super::Unit) - a tagged variant per unit kind.
///
/// State only changes through an applied transaction's state deltas (full before/after
/// snapshots), so cloning a `UnitState` is always a deep copy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum UnitState {
    /// Stateless unit (cash).
    #[default]
    None,
    Option(OptionState),
    Forward(ForwardState),
    Future(FutureState),
    Stock(StockState),
    DeferredCash(DeferredCashState),
    DeltaHedge(DeltaHedgeState),
    Qis(QisState),
    Bond(BondState),
    Borrow(BorrowState),
}

impl UnitState {
    pub fn is_none(&self) -> bool {
        matches!(self, UnitState::None)
    }

    /// Return the counterparty pair of a bilateral unit, plus the outgoing party of an
    /// in-flight novation when one is recorded.
    ///
    /// Used by the validator to evaluate [`TransferRule::Bilateral`](super::transfer::TransferRule).
    pub fn bilateral_parties(&self) -> Option<(&WalletId, &WalletId, Option<&WalletId>)> {
        match self {
            UnitState::Option(state) => Some((
                &state.long_wallet,
                &state.short_wallet,
                state.novation_from.as_ref(),
            )),
            UnitState::Forward(state) => Some((
                &state.long_wallet,
                &state.short_wallet,
                state.novation_from.as_ref(),
            )),
            _ => None,
        }
    }
}
