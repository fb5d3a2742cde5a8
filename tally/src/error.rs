use crate::{event::EventAction, transaction::TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tally_instrument::{
    unit::{UnitSymbol, kind::UnitKind},
    wallet::WalletId,
};
use thiserror::Error;

/// Every failure mode surfaced by the ledger core.
///
/// Validation failures short-circuit the executor to
/// [`ExecuteResult::Rejected`](crate::transaction::ExecuteResult) - a normal, recoverable
/// outcome carrying the variant that caused it. Time, log and replay errors are returned
/// as `Err` directly and indicate programming or data-integrity problems.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum LedgerError {
    #[error("unit not registered: {0}")]
    UnitNotRegistered(UnitSymbol),

    #[error("wallet not registered: {0}")]
    WalletNotRegistered(WalletId),

    #[error("unit already registered: {0}")]
    UnitAlreadyRegistered(UnitSymbol),

    #[error("wallet already registered: {0}")]
    WalletAlreadyRegistered(WalletId),

    #[error("future timestamp: transaction {timestamp} is ahead of ledger time {current}")]
    FutureTimestamp {
        timestamp: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("transfer rule violation: {0}")]
    TransferRuleViolation(String),

    #[error(
        "balance constraint violation: {wallet} {unit}: projected {projected} breaches \
         {bound} bound {limit}"
    )]
    BalanceConstraintViolation {
        wallet: WalletId,
        unit: UnitSymbol,
        projected: Decimal,
        bound: Bound,
        limit: Decimal,
    },

    #[error("insufficient funds: {wallet} {unit}: projected balance {projected}")]
    InsufficientFunds {
        wallet: WalletId,
        unit: UnitSymbol,
        projected: Decimal,
    },

    #[error("transaction log disabled: cannot reconstruct with no_log=true")]
    LogUnavailable,

    #[error("cannot move time backwards: {target} < {current}")]
    BackwardsTime {
        target: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("target time {target} is ahead of ledger time {current}")]
    TargetTimeInFuture {
        target: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("replay failed at transaction {0}: log corruption")]
    ReplayFailure(TransactionId),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("unit {unit} does not carry the state expected of kind {expected}")]
    StateMismatch { unit: UnitSymbol, expected: UnitKind },

    #[error("no handler registered for scheduled event action: {0}")]
    UnknownEventAction(EventAction),

    #[error("invalid contract operation: {0}")]
    InvalidContractOperation(String),
}

/// Which inclusive balance bound a
/// [`BalanceConstraintViolation`](LedgerError::BalanceConstraintViolation) breached.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min,
    Max,
}

impl Display for Bound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Bound::Min => "min",
                Bound::Max => "max",
            }
        )
    }
}
