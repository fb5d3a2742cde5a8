use crate::event::{Event, EventId};
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Deterministic priority queue of future [`Event`]s.
///
/// Min-heap keyed by `(trigger_time, priority, event_id)`: the `event_id` tiebreak makes
/// pops after equal keys deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct EventScheduler {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event for future execution, returning its id.
    pub fn schedule(&mut self, event: Event) -> EventId {
        let event_id = event.event_id().clone();
        self.heap.push(Reverse(ScheduledEvent(event)));
        event_id
    }

    /// Schedule multiple events.
    pub fn schedule_many(&mut self, events: Vec<Event>) -> Vec<EventId> {
        events.into_iter().map(|event| self.schedule(event)).collect()
    }

    /// The next event to fire, without removing it.
    pub fn peek_next(&self) -> Option<&Event> {
        self.heap.peek().map(|Reverse(scheduled)| &scheduled.0)
    }

    /// Count of scheduled events not yet drained.
    pub fn pending_count(&self) -> usize {
        self.heap.len()
    }

    /// Pop every event with `trigger_time <= as_of` in heap order.
    pub fn drain(&mut self, as_of: DateTime<Utc>) -> Vec<Event> {
        let mut due = Vec::new();
        while self
            .peek_next()
            .is_some_and(|event| event.trigger_time <= as_of)
        {
            if let Some(Reverse(scheduled)) = self.heap.pop() {
                due.push(scheduled.0);
            }
        }
        due
    }
}

/// Heap entry ordered by `(trigger_time, priority, event_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledEvent(Event);

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.trigger_time, self.0.priority, self.0.event_id())
            .cmp(&(other.0.trigger_time, other.0.priority, other.0.event_id()))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
