use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally::{
    ExecuteResult, LedgerError, Move,
    ledger::{Ledger, LedgerConfig, view::LedgerView},
};
use tally_instrument::{
    unit::{Unit, UnitSymbol, kind::UnitKind},
    wallet::WalletId,
};

fn usd() -> UnitSymbol {
    UnitSymbol::new("USD")
}

fn funded_ledger() -> Ledger {
    let mut ledger = Ledger::new("main", DateTime::<Utc>::default(), LedgerConfig::default());
    ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
    ledger.register_wallet(WalletId::new("alice")).unwrap();
    ledger.register_wallet(WalletId::new("bob")).unwrap();
    ledger.set_balance(&"alice".into(), &usd(), dec!(1000.00)).unwrap();
    ledger
}

fn transfer(ledger: &Ledger, quantity: Decimal, contract_id: &str) -> tally::Transaction {
    ledger
        .create_transaction(
            vec![Move::new("alice", "bob", "USD", quantity, contract_id).unwrap()],
            None,
        )
        .unwrap()
}

#[test]
fn basic_transfer() {
    let mut ledger = funded_ledger();

    let tx = transfer(&ledger, dec!(100.00), "payment_001");
    assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);

    assert_eq!(ledger.get_balance(&"alice".into(), &usd()).unwrap(), dec!(900.00));
    assert_eq!(ledger.get_balance(&"bob".into(), &usd()).unwrap(), dec!(100.00));
    assert_eq!(ledger.transaction_log().len(), 1);
}

#[test]
fn duplicate_execution_is_detected() {
    let mut ledger = funded_ledger();

    let tx = transfer(&ledger, dec!(100.00), "payment_001");
    assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
    assert_eq!(ledger.execute(&tx), ExecuteResult::AlreadyApplied);

    assert_eq!(ledger.get_balance(&"alice".into(), &usd()).unwrap(), dec!(900.00));
    assert_eq!(ledger.transaction_log().len(), 1);
}

#[test]
fn economically_identical_but_distinct_transactions_both_apply() {
    let mut ledger = funded_ledger();

    let tx_1 = transfer(&ledger, dec!(100.00), "order-001");
    let tx_2 = transfer(&ledger, dec!(100.00), "order-002");
    assert_eq!(ledger.execute(&tx_1), ExecuteResult::Applied);
    assert_eq!(ledger.execute(&tx_2), ExecuteResult::Applied);

    assert_eq!(ledger.get_balance(&"alice".into(), &usd()).unwrap(), dec!(800.00));
    assert_eq!(ledger.get_balance(&"bob".into(), &usd()).unwrap(), dec!(200.00));
    assert_eq!(ledger.transaction_log().len(), 2);
}

#[test]
fn atomic_multi_move_rollback() {
    let mut ledger = funded_ledger();
    ledger
        .register_unit(Unit::new(
            "ACME",
            "Acme Corp",
            UnitKind::Stock,
            Some(Decimal::ZERO),
            None,
            Some(6),
        ))
        .unwrap();

    let tx = ledger
        .create_transaction(
            vec![
                Move::new("alice", "bob", "USD", dec!(1000), "trade_cash").unwrap(),
                Move::new("alice", "bob", "ACME", dec!(10), "trade_stock").unwrap(),
            ],
            None,
        )
        .unwrap();

    let result = ledger.execute(&tx);
    assert!(matches!(
        result,
        ExecuteResult::Rejected(LedgerError::BalanceConstraintViolation { .. })
    ));

    // No partial state is observable
    assert_eq!(ledger.get_balance(&"alice".into(), &usd()).unwrap(), dec!(1000.00));
    assert_eq!(ledger.get_balance(&"bob".into(), &usd()).unwrap(), Decimal::ZERO);
    assert_eq!(
        ledger.get_balance(&"bob".into(), &"ACME".into()).unwrap(),
        Decimal::ZERO
    );
    assert!(ledger.transaction_log().is_empty());
}

#[test]
fn conservation_per_transaction_and_over_sequences() {
    let mut ledger = funded_ledger();
    ledger.register_wallet(WalletId::new("carol")).unwrap();

    let supply_before = ledger.total_supply(&usd()).unwrap();

    let transfers = [
        ("alice", "bob", dec!(123.45)),
        ("bob", "carol", dec!(23.45)),
        ("carol", "alice", dec!(11.11)),
        ("alice", "carol", dec!(7.77)),
    ];
    for (index, (source, dest, quantity)) in transfers.iter().enumerate() {
        let tx = ledger
            .create_transaction(
                vec![Move::new(*source, *dest, "USD", *quantity, format!("tx_{index}")).unwrap()],
                None,
            )
            .unwrap();
        assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
        assert_eq!(ledger.total_supply(&usd()).unwrap(), supply_before);
    }
}

#[test]
fn insufficient_funds_is_the_cash_rejection() {
    let mut ledger = funded_ledger();
    let tx = transfer(&ledger, dec!(5000), "too_big");
    assert!(matches!(
        ledger.execute(&tx),
        ExecuteResult::Rejected(LedgerError::InsufficientFunds { .. })
    ));
}

#[test]
fn future_timestamp_is_rejected() {
    let mut ledger = funded_ledger();
    ledger.advance_time(DateTime::<Utc>::default() + TimeDelta::days(5)).unwrap();
    let tx = transfer(&ledger, dec!(10), "late");

    // A fresh ledger still at time zero sees the day-5 transaction as forward-dated
    let mut early = funded_ledger();
    let expected = ExecuteResult::Rejected(LedgerError::FutureTimestamp {
        timestamp: tx.timestamp,
        current: early.current_time(),
    });
    assert_eq!(early.execute(&tx), expected);
}

#[test]
fn system_wallet_is_exempt_from_bounds() {
    let mut ledger = funded_ledger();

    // SYSTEM holds no USD, yet can issue it: every other wallet would be rejected
    let tx = ledger
        .create_transaction(
            vec![Move::new(WalletId::system(), WalletId::new("bob"), "USD", dec!(500), "issuance").unwrap()],
            None,
        )
        .unwrap();
    assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
    assert_eq!(
        ledger.get_balance(&WalletId::system(), &usd()).unwrap(),
        dec!(-500.00)
    );
}

#[test]
fn intra_transaction_intermediate_negatives_are_admissible() {
    let mut ledger = funded_ledger();
    ledger.register_wallet(WalletId::new("carol")).unwrap();
    ledger.set_balance(&"carol".into(), &usd(), dec!(50)).unwrap();

    // Bob pays out before he is paid; net per-(wallet, unit) is what matters
    let tx = ledger
        .create_transaction(
            vec![
                Move::new("bob", "carol", "USD", dec!(30), "leg_1").unwrap(),
                Move::new("alice", "bob", "USD", dec!(40), "leg_2").unwrap(),
            ],
            None,
        )
        .unwrap();
    assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);
    assert_eq!(ledger.get_balance(&"bob".into(), &usd()).unwrap(), dec!(10.00));
}

#[test]
fn position_index_tracks_non_dust_holders() {
    let mut ledger = funded_ledger();

    let tx = transfer(&ledger, dec!(1000.00), "all_in");
    assert_eq!(ledger.execute(&tx), ExecuteResult::Applied);

    let positions = ledger.get_positions(&usd());
    assert_eq!(positions.len(), 1);
    assert_eq!(positions.get(&WalletId::from("bob")), Some(&dec!(1000.00)));
    assert!(!positions.contains_key(&WalletId::from("alice")));
}
