use crate::{
    contract::{SmartContract, default_contracts},
    error::LedgerError,
    event::{
        Event, EventAction, EventId,
        handlers::{EventHandler, default_handlers},
        scheduler::EventScheduler,
    },
    ledger::{Ledger, view::LedgerView},
    pricing::PriceMap,
    transaction::{ExecuteResult, Transaction},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tally_instrument::unit::kind::UnitKind;
use tracing::{debug, warn};

/// Safety ceiling for cascading passes within one step.
pub const MAX_PASSES: usize = 10;

/// Lifecycle engine combining scheduled events and smart-contract polling.
///
/// Each [`Self::step`] advances ledger time, then repeats two phases until a fixed
/// point: drain due scheduled events through their handlers, and poll every unit whose
/// kind has a registered contract in symbol-sorted order. Cascades (an event enabling
/// another) resolve within the same step up to `max_passes`; anything left simply rolls
/// to the next step.
///
/// The transaction log is the audit trail - there is no separate event status tracking.
#[derive(Debug)]
pub struct LifecycleEngine {
    ledger: Ledger,
    scheduler: EventScheduler,
    contracts: IndexMap<UnitKind, SmartContract>,
    handlers: IndexMap<EventAction, EventHandler>,
    pub max_passes: usize,
}

impl LifecycleEngine {
    /// Construct a new [`Self`] owning the provided ledger, with the default handler
    /// registry and no polled contracts.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            scheduler: EventScheduler::new(),
            contracts: IndexMap::new(),
            handlers: default_handlers(),
            max_passes: MAX_PASSES,
        }
    }

    /// Construct a new [`Self`] with every built-in instrument contract registered.
    pub fn with_default_contracts(ledger: Ledger) -> Self {
        Self {
            contracts: default_contracts(),
            ..Self::new(ledger)
        }
    }

    /// Register a smart contract polled for every unit of the provided kind.
    pub fn register(&mut self, kind: UnitKind, contract: SmartContract) {
        self.contracts.insert(kind, contract);
    }

    /// Register a handler for a scheduled event action.
    pub fn register_handler(&mut self, action: EventAction, handler: EventHandler) {
        self.handlers.insert(action, handler);
    }

    /// Schedule an event for future execution.
    pub fn schedule(&mut self, event: Event) -> EventId {
        self.scheduler.schedule(event)
    }

    /// Schedule multiple events.
    pub fn schedule_many(&mut self, events: Vec<Event>) -> Vec<EventId> {
        self.scheduler.schedule_many(events)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Consume [`Self`], returning the owned ledger.
    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    pub fn pending_event_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    pub fn peek_next_event(&self) -> Option<&Event> {
        self.scheduler.peek_next()
    }

    /// Advance time and execute all due lifecycle activity, returning the executed
    /// transactions in order.
    pub fn step(
        &mut self,
        timestamp: DateTime<Utc>,
        prices: &PriceMap,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.ledger.advance_time(timestamp)?;
        let mut executed = Vec::new();

        for pass in 0..self.max_passes {
            let fired_scheduled = self.process_scheduled_events(timestamp, prices, &mut executed)?;
            let fired_polled = self.process_smart_contracts(timestamp, prices, &mut executed)?;

            if fired_scheduled + fired_polled == 0 {
                break;
            }
            debug!(
                pass,
                fired_scheduled, fired_polled, "lifecycle pass executed transactions"
            );
        }

        Ok(executed)
    }

    /// Run the engine through a sequence of timestamps with a price lookup per instant.
    pub fn run<FnPrices>(
        &mut self,
        timestamps: &[DateTime<Utc>],
        get_prices: FnPrices,
    ) -> Result<Vec<Transaction>, LedgerError>
    where
        FnPrices: Fn(DateTime<Utc>) -> PriceMap,
    {
        let mut executed = Vec::new();
        for timestamp in timestamps {
            executed.extend(self.step(*timestamp, &get_prices(*timestamp))?);
        }
        Ok(executed)
    }

    fn process_scheduled_events(
        &mut self,
        timestamp: DateTime<Utc>,
        prices: &PriceMap,
        executed: &mut Vec<Transaction>,
    ) -> Result<usize, LedgerError> {
        let mut fired = 0;

        for event in self.scheduler.drain(timestamp) {
            let Some(handler) = self.handlers.get(&event.action).copied() else {
                return Err(LedgerError::UnknownEventAction(event.action));
            };

            let pending = handler(&self.ledger, &event, prices)?;
            if pending.is_empty() {
                continue;
            }

            debug!(event_id = %event.event_id(), action = %event.action, "executing scheduled event");
            match self.ledger.execute_contract(&pending)? {
                ExecuteResult::Applied => {
                    if let Some(tx) = self.ledger.transaction_log().last() {
                        executed.push(tx.clone());
                    }
                    fired += 1;
                }
                ExecuteResult::AlreadyApplied => {}
                ExecuteResult::Rejected(error) => {
                    warn!(event_id = %event.event_id(), %error, "scheduled event rejected");
                    return Err(error);
                }
            }
        }

        Ok(fired)
    }

    fn process_smart_contracts(
        &mut self,
        timestamp: DateTime<Utc>,
        prices: &PriceMap,
        executed: &mut Vec<Transaction>,
    ) -> Result<usize, LedgerError> {
        let mut fired = 0;

        // Symbol-sorted polling keeps two runs with identical inputs byte-identical
        for symbol in self.ledger.list_units() {
            let kind = self.ledger.get_unit(&symbol)?.kind;
            let Some(contract) = self.contracts.get(&kind).copied() else {
                continue;
            };

            let pending = contract(&self.ledger, &symbol, timestamp, prices)?;
            if pending.is_empty() {
                continue;
            }

            match self.ledger.execute_contract(&pending)? {
                ExecuteResult::Applied => {
                    if let Some(tx) = self.ledger.transaction_log().last() {
                        executed.push(tx.clone());
                    }
                    fired += 1;
                }
                ExecuteResult::AlreadyApplied => {}
                ExecuteResult::Rejected(error) => {
                    warn!(unit = %symbol, %error, "lifecycle contract rejected");
                    return Err(error);
                }
            }
        }

        Ok(fired)
    }
}
