use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rust_decimal_macros::dec;
use smol_str::SmolStr;
use tally::{
    Move,
    contract::stock::create_stock_unit,
    engine::LifecycleEngine,
    ledger::{Ledger, LedgerConfig, view::LedgerView},
    pricing::PriceMap,
    transaction::{Transaction, deterministic_tx_id, intent_id},
};
use tally_instrument::{
    unit::{Unit, state::Dividend},
    wallet::WalletId,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn build_ledger(name: &str) -> Ledger {
    let mut ledger = Ledger::new(name, start(), LedgerConfig::default());
    ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
    ledger.register_wallet(WalletId::new("alice")).unwrap();
    ledger.register_wallet(WalletId::new("bob")).unwrap();
    ledger.set_balance(&"alice".into(), &"USD".into(), dec!(10000)).unwrap();
    ledger
}

fn run_sequence(ledger: &mut Ledger) {
    for offset in 0..20i64 {
        ledger.advance_time(start() + TimeDelta::hours(offset)).unwrap();
        let quantity = dec!(1.37) * rust_decimal::Decimal::from(offset + 1);
        let tx = ledger
            .create_transaction(
                vec![Move::new("alice", "bob", "USD", quantity, format!("seq_{offset}")).unwrap()],
                None,
            )
            .unwrap();
        assert!(ledger.execute(&tx).is_applied());
    }
}

fn fingerprint(ledger: &Ledger) -> String {
    let balances: Vec<String> = ledger
        .list_wallets()
        .iter()
        .map(|wallet| {
            let balances = ledger.get_wallet_balances(wallet).unwrap_or_default();
            format!("{wallet}:{balances:?}")
        })
        .collect();
    let log: Vec<String> = ledger
        .transaction_log()
        .iter()
        .map(|tx| format!("{}@{:?}", tx.tx_id, tx.execution_time))
        .collect();
    let states: Vec<String> = ledger
        .list_units()
        .iter()
        .map(|unit| format!("{unit}={:?}", ledger.get_unit_state(unit).unwrap()))
        .collect();
    format!("{balances:?}|{log:?}|{states:?}")
}

/// P4: identically configured ledgers fed the same sequence end bytewise equal.
#[test]
fn identical_sequences_produce_identical_ledgers() {
    let mut ledger_1 = build_ledger("det");
    let mut ledger_2 = build_ledger("det");

    run_sequence(&mut ledger_1);
    run_sequence(&mut ledger_2);

    assert_eq!(fingerprint(&ledger_1), fingerprint(&ledger_2));
}

/// P5: transaction ids are reproducible functions of (name, time, content).
#[test]
fn transaction_ids_reproducible_across_ledgers() {
    let ledger_1 = build_ledger("det");
    let ledger_2 = build_ledger("det");
    let ledger_other = build_ledger("other");

    let moves = vec![Move::new("alice", "bob", "USD", dec!(12.34), "pay").unwrap()];
    let tx_1 = ledger_1.create_transaction(moves.clone(), None).unwrap();
    let tx_2 = ledger_2.create_transaction(moves.clone(), None).unwrap();
    let tx_other = ledger_other.create_transaction(moves, None).unwrap();

    assert_eq!(tx_1.tx_id, tx_2.tx_id);
    // The ledger name is part of the identifier
    assert_ne!(tx_1.tx_id, tx_other.tx_id);
    // But not of the intent
    assert_eq!(tx_1.intent_id, tx_other.intent_id);
}

/// Canonicalization: decimal representation and move order do not leak into ids.
#[test]
fn canonical_hashing_invariants() {
    let time = start();
    let name = SmolStr::new("det");

    let move_a = Move::new("alice", "bob", "USD", dec!(10), "a").unwrap();
    let move_b = Move::new("alice", "bob", "USD", dec!(10.000), "a").unwrap();
    assert_eq!(
        deterministic_tx_id(time, &name, &[move_a.clone()], &[]),
        deterministic_tx_id(time, &name, &[move_b], &[])
    );

    let move_c = Move::new("bob", "alice", "USD", dec!(5), "c").unwrap();
    assert_eq!(
        intent_id(&[move_a.clone(), move_c.clone()], &[]),
        intent_id(&[move_c, move_a], &[])
    );
}

/// P10: two engines over identical inputs execute identical transaction lists.
#[test]
fn engine_steps_are_deterministic() {
    let build_engine = || {
        let mut ledger = Ledger::new("engine_det", start(), LedgerConfig::default());
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet("treasury".into()).unwrap();
        for wallet in ["alice", "bob", "carol", "dave"] {
            ledger.register_wallet(wallet.into()).unwrap();
        }
        ledger.set_balance(&"treasury".into(), &"USD".into(), dec!(1000000)).unwrap();

        // Several dividend stocks with interleaved ex-dates exercise the symbol-sorted
        // polling and the entitlement cascade
        for (symbol, ex_offset) in [("AAPL", 1), ("MSFT", 1), ("NVDA", 2)] {
            let stock = create_stock_unit(
                symbol,
                symbol,
                "treasury".into(),
                "USD".into(),
                vec![Dividend {
                    ex_date: start() + TimeDelta::days(ex_offset),
                    payment_date: start() + TimeDelta::days(ex_offset + 2),
                    amount_per_share: dec!(0.50),
                    currency: "USD".into(),
                }],
                false,
            )
            .unwrap();
            ledger.register_unit(stock).unwrap();
            ledger.set_balance(&"treasury".into(), &symbol.into(), dec!(100000)).unwrap();
            ledger.set_balance(&"alice".into(), &symbol.into(), dec!(120)).unwrap();
            ledger.set_balance(&"bob".into(), &symbol.into(), dec!(80)).unwrap();
            ledger.set_balance(&"carol".into(), &symbol.into(), dec!(10)).unwrap();
        }

        LifecycleEngine::with_default_contracts(ledger)
    };

    let run = |mut engine: LifecycleEngine| -> Vec<Transaction> {
        let mut executed = Vec::new();
        for offset in 0..6 {
            executed.extend(
                engine
                    .step(start() + TimeDelta::days(offset), &PriceMap::new())
                    .unwrap(),
            );
        }
        executed
    };

    let executed_1 = run(build_engine());
    let executed_2 = run(build_engine());

    assert!(!executed_1.is_empty());
    assert_eq!(
        executed_1.iter().map(|tx| &tx.tx_id).collect::<Vec<_>>(),
        executed_2.iter().map(|tx| &tx.tx_id).collect::<Vec<_>>()
    );
    assert_eq!(executed_1, executed_2);
}

/// Replay of a deterministic run reproduces the fingerprint exactly when all funding
/// went through SYSTEM transactions.
#[test]
fn replay_round_trip_fingerprint() {
    let build = || {
        let mut ledger = Ledger::new("round_trip", start(), LedgerConfig::default());
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet(WalletId::new("alice")).unwrap();
        ledger.register_wallet(WalletId::new("bob")).unwrap();
        let fund = ledger
            .create_transaction(
                vec![
                    Move::new(WalletId::system(), WalletId::new("alice"), "USD", dec!(5000), "fund")
                        .unwrap(),
                ],
                None,
            )
            .unwrap();
        assert!(ledger.execute(&fund).is_applied());
        ledger
    };

    let mut ledger = build();
    run_sequence(&mut ledger);

    let replayed = ledger.replay(0, true, false).unwrap();
    assert_eq!(fingerprint(&ledger), fingerprint(&replayed));
}
