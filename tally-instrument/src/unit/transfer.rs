use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Per-unit transfer restriction evaluated by the ledger validator before a move is
/// admitted.
///
/// Expressed as a closed set of named rules rather than a stored function so that a
/// [`Unit`](super::Unit) stays cloneable, serializable and auditable.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransferRule {
    /// Moves are restricted to the unit's counterparty pair (long and short wallet, plus
    /// the outgoing party of an in-flight novation when one is recorded in state).
    Bilateral,
}

impl Display for TransferRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TransferRule::Bilateral => "bilateral",
            }
        )
    }
}
