use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    is_dust,
    unit::{Unit, UnitSymbol, state::UnitState},
    wallet::WalletId,
};

/// Unique identifier for a [`Transaction`] - 16 hex chars of a SHA-256 content hash, or
/// caller-provided.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct TransactionId(SmolStr);

impl TransactionId {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }

    pub fn name(&self) -> &SmolStr {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Caller-provided identifier tying a [`Move`] back to the order, trade or lifecycle
/// action that produced it.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct ContractId(SmolStr);

impl ContractId {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }

    pub fn name(&self) -> &SmolStr {
        &self.0
    }
}

impl From<&str> for ContractId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContractId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A signed transfer of some quantity of a unit from one wallet to another.
///
/// Immutable once constructed. Construction enforces distinct endpoints and a finite,
/// non-dust quantity.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Move {
    pub source: WalletId,
    pub dest: WalletId,
    pub unit: UnitSymbol,
    pub quantity: Decimal,
    pub contract_id: ContractId,
    pub metadata: Option<SmolStr>,
}

impl Move {
    /// Construct a new [`Self`] with the provided data.
    ///
    /// Errors if `source == dest` or the quantity is dust.
    pub fn new<Source, Dest, Symbol, Contract>(
        source: Source,
        dest: Dest,
        unit: Symbol,
        quantity: Decimal,
        contract_id: Contract,
    ) -> Result<Self, LedgerError>
    where
        Source: Into<WalletId>,
        Dest: Into<WalletId>,
        Symbol: Into<UnitSymbol>,
        Contract: Into<ContractId>,
    {
        let source = source.into();
        let dest = dest.into();

        if source == dest {
            return Err(LedgerError::InvalidMove(format!(
                "source and dest must be different, got {source}"
            )));
        }
        if is_dust(quantity) {
            return Err(LedgerError::InvalidMove(format!(
                "quantity magnitude must exceed the dust threshold, got {quantity}"
            )));
        }

        Ok(Self {
            source,
            dest,
            unit: unit.into(),
            quantity,
            contract_id: contract_id.into(),
            metadata: None,
        })
    }

    /// Attach a free-form metadata note to [`Self`].
    pub fn with_metadata<S>(self, metadata: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self {
            metadata: Some(metadata.into()),
            ..self
        }
    }
}

/// Full before/after snapshot of a unit's internal state within a [`Transaction`].
///
/// Snapshots are complete (not patches) so the log is self-contained: `clone_at` restores
/// `old_state` verbatim and `replay` applies `new_state` verbatim, with no external
/// context.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct StateDelta {
    pub unit: UnitSymbol,
    pub old_state: UnitState,
    pub new_state: UnitState,
}

/// An atomic bundle of moves and state deltas executed as one.
///
/// `tx_id` is the stable hash of `(ledger_name, timestamp, moves, state_deltas)`;
/// `intent_id` hashes content only (order-independent moves, no time, no ledger name) and
/// provides idempotency across retries. `execution_time` is stamped by the executor when
/// the transaction is applied.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub moves: Vec<Move>,
    pub state_deltas: Vec<StateDelta>,
    pub tx_id: TransactionId,
    pub intent_id: TransactionId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub execution_time: Option<DateTime<Utc>>,
    pub ledger_name: SmolStr,
}

impl Transaction {
    /// Construct a new [`Self`], generating a deterministic `tx_id` when none is
    /// provided.
    ///
    /// Errors if both `moves` and `state_deltas` are empty.
    pub fn new(
        moves: Vec<Move>,
        state_deltas: Vec<StateDelta>,
        tx_id: Option<TransactionId>,
        timestamp: DateTime<Utc>,
        ledger_name: SmolStr,
    ) -> Result<Self, LedgerError> {
        if moves.is_empty() && state_deltas.is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "a transaction requires at least one move or state delta".to_string(),
            ));
        }

        let tx_id = tx_id
            .unwrap_or_else(|| deterministic_tx_id(timestamp, &ledger_name, &moves, &state_deltas));
        let intent_id = intent_id(&moves, &state_deltas);

        Ok(Self {
            moves,
            state_deltas,
            tx_id,
            intent_id,
            timestamp,
            execution_time: None,
            ledger_name,
        })
    }

    /// Construct a state-only [`Self`] with the synthetic `state:` identifier.
    pub fn state_only(
        state_deltas: Vec<StateDelta>,
        timestamp: DateTime<Utc>,
        ledger_name: SmolStr,
    ) -> Result<Self, LedgerError> {
        let tx_id = state_only_tx_id(timestamp, &ledger_name, &state_deltas);
        Self::new(Vec::new(), state_deltas, Some(tx_id), timestamp, ledger_name)
    }
}

/// Result of submitting a [`Transaction`] to the executor.
///
/// Rejection is a normal, recoverable outcome and carries its reason; nothing was
/// mutated.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum ExecuteResult {
    Applied,
    AlreadyApplied,
    Rejected(LedgerError),
}

impl ExecuteResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, ExecuteResult::Applied)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ExecuteResult::Rejected(_))
    }
}

/// Pure-function contract output: a proposed set of moves, full-state updates and
/// freshly minted units, not yet applied.
///
/// `new_units` lets a contract mint descriptors (eg/ one deferred-cash entitlement per
/// dividend holder) that the executor registers atomically with the rest of the
/// transaction.
#[derive(Debug, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
pub struct PendingTransaction {
    pub moves: Vec<Move>,
    pub state_updates: BTreeMap<UnitSymbol, UnitState>,
    pub new_units: Vec<Unit>,
}

impl PendingTransaction {
    /// Construct a new [`Self`] with the provided moves and state updates.
    pub fn new(moves: Vec<Move>, state_updates: BTreeMap<UnitSymbol, UnitState>) -> Self {
        Self {
            moves,
            state_updates,
            new_units: Vec::new(),
        }
    }

    /// Construct an empty [`Self`] - executing it is a no-op that returns success.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach freshly minted unit descriptors to [`Self`].
    pub fn with_new_units(self, new_units: Vec<Unit>) -> Self {
        Self { new_units, ..self }
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.state_updates.is_empty() && self.new_units.is_empty()
    }
}

/// Normalize a decimal for hashing: no trailing zeros in the mantissa, positive zero.
fn canonical_decimal(value: Decimal) -> String {
    let normalized = value.normalize();
    if normalized.is_zero() {
        "0".to_string()
    } else {
        normalized.to_string()
    }
}

fn canonical_move(mv: &Move) -> String {
    format!(
        "{},{},{},{},{}",
        mv.source,
        mv.dest,
        mv.unit,
        canonical_decimal(mv.quantity),
        mv.contract_id
    )
}

fn canonical_delta(delta: &StateDelta) -> String {
    // Canonical JSON: struct fields serialize in declaration order, map keys in BTreeMap
    // order, so equal states always render identically.
    let new_state = serde_json::to_string(&delta.new_state)
        .expect("UnitState serialization to JSON is infallible");
    format!("{}={}", delta.unit, new_state)
}

fn hash_16_hex(content: &str) -> SmolStr {
    let digest = Sha256::digest(content.as_bytes());
    SmolStr::new(&hex::encode(digest)[..16])
}

/// Deterministic transaction identifier - 16 hex chars of a SHA-256 over the ledger
/// name, timestamp and canonicalized moves and state deltas (in input order).
pub fn deterministic_tx_id(
    timestamp: DateTime<Utc>,
    ledger_name: &SmolStr,
    moves: &[Move],
    state_deltas: &[StateDelta],
) -> TransactionId {
    let mut content = format!("{}:{}:", timestamp.to_rfc3339(), ledger_name);
    for mv in moves {
        content.push_str(&canonical_move(mv));
        content.push(';');
    }
    if !state_deltas.is_empty() {
        content.push_str("state:");
        for delta in state_deltas {
            content.push_str(&canonical_delta(delta));
            content.push(';');
        }
    }
    TransactionId::new(hash_16_hex(&content))
}

/// Content-only intent identifier - excludes time and ledger name, and sorts moves and
/// deltas so economically identical submissions hash identically regardless of ordering.
pub fn intent_id(moves: &[Move], state_deltas: &[StateDelta]) -> TransactionId {
    let moves = moves.iter().map(canonical_move).sorted().join(";");
    let deltas = state_deltas
        .iter()
        .map(canonical_delta)
        .sorted()
        .join(";");
    TransactionId::new(hash_16_hex(&format!("intent:{moves}:{deltas}")))
}

/// Synthetic identifier for a state-only transaction (no moves).
pub fn state_only_tx_id(
    timestamp: DateTime<Utc>,
    ledger_name: &SmolStr,
    state_deltas: &[StateDelta],
) -> TransactionId {
    let mut content = format!("{}:{}:state:", timestamp.to_rfc3339(), ledger_name);
    for delta in state_deltas {
        content.push_str(delta.unit.as_ref());
        content.push(';');
    }
    TransactionId::new(hash_16_hex(&content))
}
