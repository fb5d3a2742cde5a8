use crate::{
    error::LedgerError,
    ledger::{Ledger, LedgerConfig, view::LedgerView},
    transaction::ExecuteResult,
};
use chrono::{DateTime, Utc};
use tally_instrument::unit::{Unit, round_to, state::UnitState};
use tracing::debug;

impl Ledger {
    /// Reconstruct this ledger as it existed at `target_time` by unwinding the log.
    ///
    /// Starts from a full clone, walks the log in reverse execution order reversing each
    /// transaction executed after `target_time` (balances restored with unit rounding,
    /// unit state restored from the delta's old snapshot), then truncates the log and
    /// rebuilds the seen-sets from it. The result is a fully functional ledger at
    /// `target_time` that may execute new transactions as a divergent timeline.
    ///
    /// Balances seeded via `set_balance` are not logged and therefore survive as part of
    /// current state; callers needing pure-log reconstruction should use [`Self::replay`].
    pub fn clone_at(&self, target_time: DateTime<Utc>) -> Result<Ledger, LedgerError> {
        if self.config().no_log {
            return Err(LedgerError::LogUnavailable);
        }
        if target_time > self.current_time() {
            return Err(LedgerError::TargetTimeInFuture {
                target: target_time,
                current: self.current_time(),
            });
        }

        let mut cloned = self.clone();

        for tx in self.transaction_log().iter().rev() {
            let effective_time = tx.execution_time.unwrap_or(tx.timestamp);
            if effective_time <= target_time {
                break;
            }

            debug!(tx_id = %tx.tx_id, %effective_time, "unwinding transaction");

            for mv in &tx.moves {
                if !cloned.units().contains_key(&mv.unit) {
                    return Err(LedgerError::UnitNotRegistered(mv.unit.clone()));
                }
                let dp = cloned.decimal_places(&mv.unit);

                let new_source = round_to(
                    dp,
                    cloned.balance_or_zero(&mv.source, &mv.unit) + mv.quantity,
                );
                cloned.write_balance(&mv.source, &mv.unit, new_source);

                let new_dest = round_to(
                    dp,
                    cloned.balance_or_zero(&mv.dest, &mv.unit) - mv.quantity,
                );
                cloned.write_balance(&mv.dest, &mv.unit, new_dest);
            }

            for delta in &tx.state_deltas {
                // Units minted after target_time stay registered in the clone; their
                // state simply rolls back with everything else
                let _ = cloned.overwrite_unit_state(&delta.unit, delta.old_state.clone());
            }
        }

        cloned.retain_log_and_time(target_time);
        cloned.rebuild_seen_from_log();

        Ok(cloned)
    }

    /// Reconstruct a fresh ledger by re-executing the log from `from_tx` forward.
    ///
    /// Unit descriptors are re-registered with empty state (state is rebuilt from the
    /// deltas carried by the log) and wallets re-registered, then every logged
    /// transaction is executed in order, advancing time as needed. Replay runs in fast
    /// mode by default: the log was validated when it was written.
    ///
    /// Balances seeded via `set_balance` are NOT reconstructed - they never entered the
    /// log. A rejection during replay indicates log corruption and fails hard.
    pub fn replay(
        &self,
        from_tx: usize,
        fast_mode: bool,
        no_log: bool,
    ) -> Result<Ledger, LedgerError> {
        if self.config().no_log {
            return Err(LedgerError::LogUnavailable);
        }

        let mut replayed = Ledger::new(
            self.name().clone(),
            self.initial_time(),
            LedgerConfig {
                verbose: self.config().verbose,
                fast_mode,
                no_log,
            },
        );

        for unit in self.units().values() {
            replayed.register_unit(Unit {
                state: UnitState::None,
                ..unit.clone()
            })?;
        }
        for wallet in self.list_wallets() {
            if !wallet.is_system() {
                replayed.register_wallet(wallet)?;
            }
        }

        for tx in self.transaction_log().get(from_tx..).unwrap_or_default() {
            if tx.timestamp > replayed.current_time() {
                replayed.advance_time(tx.timestamp)?;
            }
            if let ExecuteResult::Rejected(error) = replayed.execute(tx) {
                debug!(tx_id = %tx.tx_id, %error, "replay rejection");
                return Err(LedgerError::ReplayFailure(tx.tx_id.clone()));
            }
        }

        Ok(replayed)
    }
}
