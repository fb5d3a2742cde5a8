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

//! # Tally
//! Tally is an in-process, deterministic double-entry financial ledger. It records
//! positions in arbitrary units (cash, stocks, bilateral derivatives, futures,
//! deferred-cash obligations, ...) across wallets, and advances those positions through
//! time by executing transactions and the lifecycle events produced by pluggable smart
//! contracts.
//!
//! At a glance:
//! * **[`Ledger`](ledger::Ledger)** - atomic, idempotent transaction executor with an
//!   append-only log and time-travel reconstruction (`clone_at`, `replay`).
//! * **[`LifecycleEngine`](engine::LifecycleEngine)** - time-driven driver that drains a
//!   priority-ordered event queue and polls per-kind smart contracts to a fixed point.
//! * **[`contract`]** - pure-function contracts for the representative instrument
//!   families (options, futures, dividend-paying stocks, deferred cash, forwards,
//!   delta-hedge strategies, QIS swaps, bonds, borrow records).
//!
//! Determinism is part of the contract: sorted iteration everywhere, content-addressed
//! identifiers, and pure contracts mean two runs with identical inputs produce identical
//! transaction logs.
//!
//! ## Example
//! ```rust
//! use rust_decimal_macros::dec;
//! use tally::ledger::{Ledger, LedgerConfig, view::LedgerView};
//! use tally::transaction::Move;
//! use tally_instrument::unit::Unit;
//!
//! let mut ledger = Ledger::new("example", Default::default(), LedgerConfig::default());
//! ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
//! ledger.register_wallet("alice".into()).unwrap();
//! ledger.register_wallet("bob".into()).unwrap();
//! ledger.set_balance(&"alice".into(), &"USD".into(), dec!(1000)).unwrap();
//!
//! let tx = ledger
//!     .create_transaction(
//!         vec![Move::new("alice", "bob", "USD", dec!(100), "payment_001").unwrap()],
//!         None,
//!     )
//!     .unwrap();
//! assert!(ledger.execute(&tx).is_applied());
//! assert_eq!(ledger.get_balance(&"bob".into(), &"USD".into()).unwrap(), dec!(100.00));
//! ```

/// Error taxonomy surfaced by every fallible ledger operation.
pub mod error;

/// Immutable transaction value types and content-addressed identifiers.
///
/// eg/ `Move`, `Transaction`, `StateDelta`, `PendingTransaction`.
pub mod transaction;

/// The stateful [`Ledger`](ledger::Ledger) aggregate: registries, balances, validator,
/// executor and time-travel.
pub mod ledger;

/// Scheduled [`Event`](event::Event)s, the deterministic
/// [`EventScheduler`](event::scheduler::EventScheduler) and default action handlers.
pub mod event;

/// The [`LifecycleEngine`](engine::LifecycleEngine) combining scheduled events and smart
/// contract polling.
pub mod engine;

/// Pure-function smart contracts for the representative instrument families.
pub mod contract;

/// Pricing source adapters and the Black-Scholes helpers used by the delta hedge.
pub mod pricing;

/// Utilities to initialise `tracing` logging.
pub mod logging;

pub use error::LedgerError;
pub use transaction::{ExecuteResult, Move, PendingTransaction, StateDelta, Transaction};
