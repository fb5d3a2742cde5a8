use crate::{
    error::LedgerError,
    ledger::{Ledger, validate, view::LedgerView},
    transaction::{ExecuteResult, Move, PendingTransaction, StateDelta, Transaction},
};
use tally_instrument::unit::{UnitSymbol, round_to};
use tracing::{debug, info, warn};

impl Ledger {
    /// Execute a transaction atomically.
    ///
    /// All moves and state deltas apply together or not at all. Execution is idempotent:
    /// a transaction whose `tx_id` or `intent_id` has been seen is a no-op returning
    /// [`ExecuteResult::AlreadyApplied`].
    ///
    /// Unit and wallet registration are always validated; balance constraints, transfer
    /// rules and timestamps are skipped in fast mode.
    pub fn execute(&mut self, tx: &Transaction) -> ExecuteResult {
        if self.seen_tx(tx) {
            self.log_result(tx, "ALREADY_APPLIED");
            return ExecuteResult::AlreadyApplied;
        }

        if let Err(error) = validate::check_registration(self, tx) {
            warn!(tx_id = %tx.tx_id, %error, "transaction rejected");
            return ExecuteResult::Rejected(error);
        }

        if !self.config().fast_mode
            && let Err(error) = validate::validate(self, tx)
        {
            warn!(tx_id = %tx.tx_id, %error, "transaction rejected");
            return ExecuteResult::Rejected(error);
        }

        self.apply_moves(&tx.moves);

        for delta in &tx.state_deltas {
            // Registration of every delta unit was checked above; a missing unit here
            // would indicate interior mutation of the registry mid-execute.
            if self
                .overwrite_unit_state(&delta.unit, delta.new_state.clone())
                .is_err()
            {
                warn!(unit = %delta.unit, "state delta targets a unit that vanished mid-execute");
            }
        }

        if !self.config().no_log {
            let mut logged = tx.clone();
            logged.execution_time = Some(self.current_time());
            self.append_to_log(logged);
        }
        self.mark_seen(tx);

        self.log_result(tx, "APPLIED");
        ExecuteResult::Applied
    }

    /// Execute a [`PendingTransaction`] produced by a pure contract function.
    ///
    /// Freshly minted units are registered first (and rolled back if the transaction is
    /// rejected), state updates are captured as full before/after deltas against current
    /// state, and the resulting transaction is submitted to [`Self::execute`]. State
    /// deltas therefore apply if and only if the moves (when any) applied.
    ///
    /// Executing an empty pending transaction is a no-op that returns success.
    pub fn execute_contract(
        &mut self,
        pending: &PendingTransaction,
    ) -> Result<ExecuteResult, LedgerError> {
        if pending.is_empty() {
            return Ok(ExecuteResult::Applied);
        }

        let mut minted: Vec<UnitSymbol> = Vec::with_capacity(pending.new_units.len());
        for unit in &pending.new_units {
            if let Err(error) = self.register_unit(unit.clone()) {
                self.roll_back_minted(&minted);
                return Err(error);
            }
            minted.push(unit.symbol.clone());
        }

        let mut state_deltas = Vec::with_capacity(pending.state_updates.len());
        for (symbol, new_state) in &pending.state_updates {
            let old_state = match self.get_unit_state(symbol) {
                Ok(state) => state,
                Err(error) => {
                    self.roll_back_minted(&minted);
                    return Err(error);
                }
            };
            state_deltas.push(StateDelta::new(symbol.clone(), old_state, new_state.clone()));
        }

        let tx = if pending.moves.is_empty() {
            Transaction::state_only(state_deltas, self.current_time(), self.name().clone())
        } else {
            Transaction::new(
                pending.moves.clone(),
                state_deltas,
                None,
                self.current_time(),
                self.name().clone(),
            )
        };
        let tx = match tx {
            Ok(tx) => tx,
            Err(error) => {
                self.roll_back_minted(&minted);
                return Err(error);
            }
        };

        let result = self.execute(&tx);
        if !result.is_applied() {
            self.roll_back_minted(&minted);
        }

        Ok(result)
    }

    fn roll_back_minted(&mut self, minted: &[UnitSymbol]) {
        for symbol in minted {
            self.unregister_unit(symbol);
        }
    }

    /// Apply all moves to wallet balances, rounding every write to the unit's decimal
    /// places and keeping the inverted position index consistent.
    fn apply_moves(&mut self, moves: &[Move]) {
        for mv in moves {
            let dp = self.decimal_places(&mv.unit);

            let new_source = round_to(dp, self.balance_or_zero(&mv.source, &mv.unit) - mv.quantity);
            self.write_balance(&mv.source, &mv.unit, new_source);

            let new_dest = round_to(dp, self.balance_or_zero(&mv.dest, &mv.unit) + mv.quantity);
            self.write_balance(&mv.dest, &mv.unit, new_dest);
        }
    }

    fn log_result(&self, tx: &Transaction, result: &str) {
        if self.config().verbose {
            info!(
                tx_id = %tx.tx_id,
                moves = tx.moves.len(),
                state_deltas = tx.state_deltas.len(),
                timestamp = %tx.timestamp,
                result,
                "transaction"
            );
        } else {
            debug!(tx_id = %tx.tx_id, moves = tx.moves.len(), result, "transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerConfig;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tally_instrument::{
        unit::{Unit, kind::UnitKind, state::UnitState},
        wallet::WalletId,
    };

    fn funded_ledger() -> Ledger {
        let mut ledger = Ledger::new("test", DateTime::<Utc>::default(), LedgerConfig::default());
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet(WalletId::new("alice")).unwrap();
        ledger.register_wallet(WalletId::new("bob")).unwrap();
        ledger
            .set_balance(&"alice".into(), &"USD".into(), dec!(1000))
            .unwrap();
        ledger
    }

    fn transfer(ledger: &Ledger, quantity: rust_decimal::Decimal, contract_id: &str) -> Transaction {
        ledger
            .create_transaction(
                vec![Move::new("alice", "bob", "USD", quantity, contract_id).unwrap()],
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_execute_basic_transfer() {
        let mut ledger = funded_ledger();
        let tx = transfer(&ledger, dec!(100.00), "payment_001");

        assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
        assert_eq!(
            ledger.get_balance(&"alice".into(), &"USD".into()).unwrap(),
            dec!(900.00)
        );
        assert_eq!(
            ledger.get_balance(&"bob".into(), &"USD".into()).unwrap(),
            dec!(100.00)
        );
        assert_eq!(ledger.transaction_log().len(), 1);
        assert_eq!(
            ledger.transaction_log()[0].execution_time,
            Some(ledger.current_time())
        );
    }

    #[test]
    fn test_execute_idempotent_by_tx_id() {
        let mut ledger = funded_ledger();
        let tx = transfer(&ledger, dec!(100.00), "payment_001");

        assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
        assert_eq!(ledger.execute(&tx), ExecuteResult::AlreadyApplied);
        assert_eq!(
            ledger.get_balance(&"alice".into(), &"USD".into()).unwrap(),
            dec!(900.00)
        );
        assert_eq!(ledger.transaction_log().len(), 1);
    }

    #[test]
    fn test_execute_distinct_contract_ids_both_apply() {
        let mut ledger = funded_ledger();
        let tx_1 = transfer(&ledger, dec!(100.00), "order-001");
        let tx_2 = transfer(&ledger, dec!(100.00), "order-002");

        assert_eq!(ledger.execute(&tx_1), ExecuteResult::Applied);
        assert_eq!(ledger.execute(&tx_2), ExecuteResult::Applied);
        assert_eq!(
            ledger.get_balance(&"alice".into(), &"USD".into()).unwrap(),
            dec!(800.00)
        );
        assert_eq!(ledger.transaction_log().len(), 2);
    }

    #[test]
    fn test_execute_idempotent_by_intent_across_retries() {
        let mut ledger = funded_ledger();
        let tx = transfer(&ledger, dec!(100.00), "payment_001");
        assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);

        // Retry built at a later logical time: different tx_id, same intent
        ledger
            .advance_time(DateTime::<Utc>::default() + chrono::TimeDelta::days(1))
            .unwrap();
        let retry = transfer(&ledger, dec!(100.00), "payment_001");
        assert_ne!(tx.tx_id, retry.tx_id);
        assert_eq!(ledger.execute(&retry), ExecuteResult::AlreadyApplied);
        assert_eq!(
            ledger.get_balance(&"alice".into(), &"USD".into()).unwrap(),
            dec!(900.00)
        );
    }

    #[test]
    fn test_execute_atomic_multi_move_rollback() {
        let mut ledger = funded_ledger();
        ledger
            .register_unit(Unit::new(
                "ACME",
                "Acme Corp",
                UnitKind::Stock,
                Some(rust_decimal::Decimal::ZERO),
                None,
                Some(6),
            ))
            .unwrap();

        // Second move violates the stock's min balance: alice holds no ACME
        let tx = ledger
            .create_transaction(
                vec![
                    Move::new("alice", "bob", "USD", dec!(1000), "trade_cash").unwrap(),
                    Move::new("alice", "bob", "ACME", dec!(10), "trade_stock").unwrap(),
                ],
                None,
            )
            .unwrap();

        assert!(ledger.execute(&tx).is_rejected());
        assert_eq!(
            ledger.get_balance(&"alice".into(), &"USD".into()).unwrap(),
            dec!(1000.00)
        );
        assert_eq!(
            ledger.get_balance(&"bob".into(), &"USD".into()).unwrap(),
            rust_decimal::Decimal::ZERO
        );
        assert!(ledger.transaction_log().is_empty());
    }

    #[test]
    fn test_execute_rejects_unregistered_even_in_fast_mode() {
        let mut ledger = Ledger::new(
            "fast",
            DateTime::<Utc>::default(),
            LedgerConfig {
                fast_mode: true,
                ..LedgerConfig::default()
            },
        );
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet(WalletId::new("alice")).unwrap();

        let tx = ledger
            .create_transaction(
                vec![Move::new("alice", "ghost", "USD", dec!(1), "pay").unwrap()],
                None,
            )
            .unwrap();
        assert_eq!(
            ledger.execute(&tx),
            ExecuteResult::Rejected(LedgerError::WalletNotRegistered(WalletId::new("ghost")))
        );
    }

    #[test]
    fn test_execute_fast_mode_skips_balance_checks() {
        let mut ledger = Ledger::new(
            "fast",
            DateTime::<Utc>::default(),
            LedgerConfig {
                fast_mode: true,
                ..LedgerConfig::default()
            },
        );
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet(WalletId::new("alice")).unwrap();
        ledger.register_wallet(WalletId::new("bob")).unwrap();

        // No funds seeded: full validation would reject with InsufficientFunds
        let tx = ledger
            .create_transaction(
                vec![Move::new("alice", "bob", "USD", dec!(100), "pay").unwrap()],
                None,
            )
            .unwrap();
        assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
        assert_eq!(
            ledger.get_balance(&"alice".into(), &"USD".into()).unwrap(),
            dec!(-100.00)
        );
    }

    #[test]
    fn test_execute_contract_empty_is_noop_success() {
        let mut ledger = funded_ledger();
        assert_eq!(
            ledger.execute_contract(&PendingTransaction::empty()).unwrap(),
            ExecuteResult::Applied
        );
        assert!(ledger.transaction_log().is_empty());
    }

    #[test]
    fn test_execute_contract_rolls_back_minted_units_on_rejection() {
        let mut ledger = funded_ledger();

        // Move is invalid (bob has no funds for a 1500 USD payment after bounds), so
        // the freshly minted unit must be unregistered again
        let pending = PendingTransaction::new(
            vec![Move::new("bob", "alice", "USD", dec!(1500), "overdraft").unwrap()],
            BTreeMap::new(),
        )
        .with_new_units(vec![Unit::cash("EUR", "Euro")]);

        let result = ledger.execute_contract(&pending).unwrap();
        assert!(result.is_rejected());
        assert!(ledger.get_unit(&"EUR".into()).is_err());
    }

    #[test]
    fn test_execute_contract_state_only_is_logged() {
        let mut ledger = funded_ledger();
        ledger
            .register_unit(
                Unit::new(
                    "DC_1",
                    "Deferred Cash",
                    UnitKind::DeferredCash,
                    Some(dec!(-1)),
                    Some(dec!(1)),
                    Some(0),
                )
                .with_state(UnitState::DeferredCash(
                    tally_instrument::unit::state::DeferredCashState {
                        amount: dec!(100),
                        currency: "USD".into(),
                        payment_date: DateTime::<Utc>::default(),
                        payer_wallet: "alice".into(),
                        payee_wallet: "bob".into(),
                        settled: false,
                        settlement_time: None,
                        reference: None,
                    },
                )),
            )
            .unwrap();

        let mut new_state = match ledger.get_unit_state(&"DC_1".into()).unwrap() {
            UnitState::DeferredCash(state) => state,
            _ => unreachable!(),
        };
        new_state.settled = true;

        let mut state_updates = BTreeMap::new();
        state_updates.insert("DC_1".into(), UnitState::DeferredCash(new_state));
        let pending = PendingTransaction::new(Vec::new(), state_updates);

        assert_eq!(
            ledger.execute_contract(&pending).unwrap(),
            ExecuteResult::Applied
        );
        assert_eq!(ledger.transaction_log().len(), 1);
        assert!(ledger.transaction_log()[0].moves.is_empty());
        assert_eq!(ledger.transaction_log()[0].state_deltas.len(), 1);

        match ledger.get_unit_state(&"DC_1".into()).unwrap() {
            UnitState::DeferredCash(state) => assert!(state.settled),
            _ => unreachable!(),
        }
    }
}
