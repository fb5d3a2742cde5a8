use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    transaction::{Move, Transaction, TransactionId},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};
use tally_instrument::{
    is_dust,
    unit::{Unit, UnitSymbol, state::UnitState},
    wallet::WalletId,
};
use tracing::debug;

/// Defines the read-only [`LedgerView`] consumed by every pure function.
pub mod view;

/// Pre-flight transaction validation.
mod validate;

/// Atomic transaction execution.
mod execute;

/// Historical state reconstruction: `clone_at` and `replay`.
mod time_travel;

/// Performance and observability configuration of a [`Ledger`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Promote per-transaction logs from `debug!` to `info!`.
    pub verbose: bool,
    /// Skip balance-constraint, transfer-rule and timestamp validation.
    ///
    /// Unit and wallet registration are still validated. Unsafe for untrusted input:
    /// invalid transactions corrupt state silently. Intended for replay and Monte-Carlo
    /// paths where correctness is established by other means.
    pub fast_mode: bool,
    /// Disable the transaction log. `clone_at` and `replay` become unavailable.
    pub no_log: bool,
}

/// Stateful double-entry accounting ledger.
///
/// The only module that mutates state: transactions execute atomically (all moves and
/// state deltas apply, or nothing does), execution is idempotent by transaction and
/// intent identifier, and every applied transaction is appended to the log (unless
/// `no_log`). Implements [`LedgerView`] for safe read-only access by pure functions.
///
/// Not thread-safe: each thread should own its own instance.
#[derive(Debug, Clone)]
pub struct Ledger {
    name: SmolStr,
    config: LedgerConfig,
    initial_time: DateTime<Utc>,
    current_time: DateTime<Utc>,
    units: BTreeMap<UnitSymbol, Unit>,
    wallets: BTreeSet<WalletId>,
    balances: BTreeMap<WalletId, BTreeMap<UnitSymbol, Decimal>>,
    positions_by_unit: BTreeMap<UnitSymbol, BTreeMap<WalletId, Decimal>>,
    seen_tx_ids: FnvHashSet<TransactionId>,
    seen_intent_ids: FnvHashSet<TransactionId>,
    transaction_log: Vec<Transaction>,
}

impl Ledger {
    /// Construct a new [`Self`] with the provided name, initial logical time and
    /// configuration. The SYSTEM wallet is registered automatically.
    pub fn new<Name>(name: Name, initial_time: DateTime<Utc>, config: LedgerConfig) -> Self
    where
        Name: Into<SmolStr>,
    {
        let mut ledger = Self {
            name: name.into(),
            config,
            initial_time,
            current_time: initial_time,
            units: BTreeMap::new(),
            wallets: BTreeSet::new(),
            balances: BTreeMap::new(),
            positions_by_unit: BTreeMap::new(),
            seen_tx_ids: FnvHashSet::default(),
            seen_intent_ids: FnvHashSet::default(),
            transaction_log: Vec::new(),
        };

        ledger.wallets.insert(WalletId::system());
        ledger.balances.insert(WalletId::system(), BTreeMap::new());

        ledger
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    /// Append-only log of applied transactions, in execution order.
    pub fn transaction_log(&self) -> &[Transaction] {
        &self.transaction_log
    }

    /// Register a new wallet. Fails if the identifier is taken.
    pub fn register_wallet(&mut self, wallet: WalletId) -> Result<(), LedgerError> {
        if self.wallets.contains(&wallet) {
            return Err(LedgerError::WalletAlreadyRegistered(wallet));
        }
        self.balances.insert(wallet.clone(), BTreeMap::new());
        self.wallets.insert(wallet);
        Ok(())
    }

    /// Register a new unit. Fails if the symbol is taken.
    pub fn register_unit(&mut self, unit: Unit) -> Result<(), LedgerError> {
        if self.units.contains_key(&unit.symbol) {
            return Err(LedgerError::UnitAlreadyRegistered(unit.symbol));
        }
        debug!(
            symbol = %unit.symbol,
            name = %unit.name,
            kind = %unit.kind,
            "registered unit"
        );
        self.units.insert(unit.symbol.clone(), unit);
        Ok(())
    }

    /// Set a wallet's balance for a unit directly, bypassing double-entry.
    ///
    /// There is no contra side: this is a seeding primitive for initial funding and
    /// explicit error correction only. Seeds do not appear in the transaction log, so
    /// they are preserved as-is by `clone_at` but NOT reconstructed by `replay`. For
    /// normal operation use transactions via `execute`.
    pub fn set_balance(
        &mut self,
        wallet: &WalletId,
        unit: &UnitSymbol,
        quantity: Decimal,
    ) -> Result<(), LedgerError> {
        if !self.wallets.contains(wallet) {
            return Err(LedgerError::WalletNotRegistered(wallet.clone()));
        }
        let rounded = self
            .units
            .get(unit)
            .ok_or_else(|| LedgerError::UnitNotRegistered(unit.clone()))?
            .round(quantity);

        self.write_balance(wallet, unit, rounded);
        Ok(())
    }

    /// Advance the ledger's logical clock. Time can only move forward.
    pub fn advance_time(&mut self, new_time: DateTime<Utc>) -> Result<(), LedgerError> {
        if new_time < self.current_time {
            return Err(LedgerError::BackwardsTime {
                target: new_time,
                current: self.current_time,
            });
        }
        self.current_time = new_time;
        Ok(())
    }

    /// Create a transaction timestamped at the current ledger time.
    ///
    /// When no `tx_id` is provided a deterministic identifier is generated from the
    /// timestamp, ledger name and move contents, so identical inputs produce identical
    /// transaction ids.
    pub fn create_transaction(
        &self,
        moves: Vec<Move>,
        tx_id: Option<TransactionId>,
    ) -> Result<Transaction, LedgerError> {
        Transaction::new(moves, Vec::new(), tx_id, self.current_time, self.name.clone())
    }

    /// Overwrite a unit's internal state. Called only from inside the executor.
    pub(crate) fn overwrite_unit_state(
        &mut self,
        symbol: &UnitSymbol,
        state: UnitState,
    ) -> Result<(), LedgerError> {
        let unit = self
            .units
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::UnitNotRegistered(symbol.clone()))?;
        unit.state = state;
        Ok(())
    }

    /// Remove a unit registered earlier in the same `execute_contract` call whose
    /// transaction was rejected.
    pub(crate) fn unregister_unit(&mut self, symbol: &UnitSymbol) {
        self.units.remove(symbol);
        self.positions_by_unit.remove(symbol);
    }

    /// Write a balance and keep the inverted position index consistent: non-dust
    /// balances are indexed, dust balances are evicted.
    pub(crate) fn write_balance(&mut self, wallet: &WalletId, unit: &UnitSymbol, value: Decimal) {
        self.balances
            .entry(wallet.clone())
            .or_default()
            .insert(unit.clone(), value);

        if is_dust(value) {
            if let Some(positions) = self.positions_by_unit.get_mut(unit) {
                positions.remove(wallet);
                if positions.is_empty() {
                    self.positions_by_unit.remove(unit);
                }
            }
        } else {
            self.positions_by_unit
                .entry(unit.clone())
                .or_default()
                .insert(wallet.clone(), value);
        }
    }

    pub(crate) fn balance_or_zero(&self, wallet: &WalletId, unit: &UnitSymbol) -> Decimal {
        self.balances
            .get(wallet)
            .and_then(|balances| balances.get(unit))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn decimal_places(&self, unit: &UnitSymbol) -> Option<u32> {
        self.units.get(unit).and_then(|unit| unit.decimal_places)
    }

    pub(crate) fn initial_time(&self) -> DateTime<Utc> {
        self.initial_time
    }

    pub(crate) fn units(&self) -> &BTreeMap<UnitSymbol, Unit> {
        &self.units
    }

    pub(crate) fn seen_tx(&self, tx: &Transaction) -> bool {
        self.seen_tx_ids.contains(&tx.tx_id) || self.seen_intent_ids.contains(&tx.intent_id)
    }

    pub(crate) fn mark_seen(&mut self, tx: &Transaction) {
        self.seen_tx_ids.insert(tx.tx_id.clone());
        self.seen_intent_ids.insert(tx.intent_id.clone());
    }

    pub(crate) fn append_to_log(&mut self, tx: Transaction) {
        self.transaction_log.push(tx);
    }

    pub(crate) fn rebuild_seen_from_log(&mut self) {
        self.seen_tx_ids = self
            .transaction_log
            .iter()
            .map(|tx| tx.tx_id.clone())
            .collect();
        self.seen_intent_ids = self
            .transaction_log
            .iter()
            .map(|tx| tx.intent_id.clone())
            .collect();
    }

    pub(crate) fn retain_log_and_time(
        &mut self,
        target_time: DateTime<Utc>,
    ) {
        self.transaction_log
            .retain(|tx| tx.execution_time.unwrap_or(tx.timestamp) <= target_time);
        self.current_time = target_time;
    }
}

impl LedgerView for Ledger {
    fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    fn get_balance(&self, wallet: &WalletId, unit: &UnitSymbol) -> Result<Decimal, LedgerError> {
        if !self.wallets.contains(wallet) {
            return Err(LedgerError::WalletNotRegistered(wallet.clone()));
        }
        if !self.units.contains_key(unit) {
            return Err(LedgerError::UnitNotRegistered(unit.clone()));
        }
        Ok(self.balance_or_zero(wallet, unit))
    }

    fn get_unit(&self, symbol: &UnitSymbol) -> Result<&Unit, LedgerError> {
        self.units
            .get(symbol)
            .ok_or_else(|| LedgerError::UnitNotRegistered(symbol.clone()))
    }

    fn get_unit_state(&self, symbol: &UnitSymbol) -> Result<UnitState, LedgerError> {
        self.get_unit(symbol).map(|unit| unit.state.clone())
    }

    fn get_positions(&self, unit: &UnitSymbol) -> BTreeMap<WalletId, Decimal> {
        self.positions_by_unit
            .get(unit)
            .cloned()
            .unwrap_or_default()
    }

    fn list_wallets(&self) -> BTreeSet<WalletId> {
        self.wallets.clone()
    }

    fn list_units(&self) -> Vec<UnitSymbol> {
        self.units.keys().cloned().collect()
    }

    fn get_wallet_balances(
        &self,
        wallet: &WalletId,
    ) -> Result<BTreeMap<UnitSymbol, Decimal>, LedgerError> {
        if !self.wallets.contains(wallet) {
            return Err(LedgerError::WalletNotRegistered(wallet.clone()));
        }
        Ok(self.balances.get(wallet).cloned().unwrap_or_default())
    }

    fn total_supply(&self, unit: &UnitSymbol) -> Result<Decimal, LedgerError> {
        if !self.units.contains_key(unit) {
            return Err(LedgerError::UnitNotRegistered(unit.clone()));
        }
        // BTreeMap iteration is already wallet-sorted, keeping accumulation order stable
        // across runs.
        Ok(self
            .balances
            .values()
            .filter_map(|balances| balances.get(unit))
            .copied()
            .sum())
    }

    fn is_registered(&self, wallet: &WalletId) -> bool {
        self.wallets.contains(wallet)
    }
}
