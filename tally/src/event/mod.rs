use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::fmt::{self, Formatter};
use tally_instrument::unit::UnitSymbol;

/// Defines the deterministic [`EventScheduler`](scheduler::EventScheduler).
pub mod scheduler;

/// Default action -> handler registry.
pub mod handlers;

/// Unique identifier of an [`Event`] - 16 hex chars of a SHA-256 over the event content,
/// so distinct content always produces distinct ids.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct EventId(SmolStr);

impl EventId {
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

/// Lifecycle change an [`Event`] requests; handlers are registered per action.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAction {
    Exercise,
    Expiry,
    Assignment,
    Settlement,
    Delivery,
    Coupon,
    Redemption,
    Dividend,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                EventAction::Exercise => "EXERCISE",
                EventAction::Expiry => "EXPIRY",
                EventAction::Assignment => "ASSIGNMENT",
                EventAction::Settlement => "SETTLEMENT",
                EventAction::Delivery => "DELIVERY",
                EventAction::Coupon => "COUPON",
                EventAction::Redemption => "REDEMPTION",
                EventAction::Dividend => "DIVIDEND",
            }
        )
    }
}

/// Numeric parameters carried by an [`Event`], eg/ a settlement price.
pub type EventParams = BTreeMap<SmolStr, Decimal>;

/// Key of the settlement price parameter used by the option and forward handlers.
pub const PARAM_SETTLEMENT_PRICE: &str = "settlement_price";

/// An immutable scheduled future lifecycle change.
///
/// Events fire in `(trigger_time, priority, event_id)` order; lower priority numbers
/// fire earlier within the same instant.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Event {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub trigger_time: DateTime<Utc>,
    pub priority: u8,
    pub symbol: UnitSymbol,
    pub action: EventAction,
    pub params: EventParams,
    event_id: EventId,
}

impl Event {
    /// Construct a new [`Self`], deriving the content-addressed `event_id`.
    pub fn new(
        trigger_time: DateTime<Utc>,
        priority: u8,
        symbol: UnitSymbol,
        action: EventAction,
        params: EventParams,
    ) -> Self {
        let event_id = Self::derive_id(trigger_time, &symbol, action, &params);
        Self {
            trigger_time,
            priority,
            symbol,
            action,
            params,
            event_id,
        }
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Settlement price parameter, when present.
    pub fn settlement_price(&self) -> Option<Decimal> {
        self.params.get(PARAM_SETTLEMENT_PRICE).copied()
    }

    fn derive_id(
        trigger_time: DateTime<Utc>,
        symbol: &UnitSymbol,
        action: EventAction,
        params: &EventParams,
    ) -> EventId {
        let mut content = format!("{}:{}:{}:", trigger_time.to_rfc3339(), symbol, action);
        for (key, value) in params {
            content.push_str(&format!("{key}={}", value.normalize()));
            content.push(';');
        }
        let digest = Sha256::digest(content.as_bytes());
        EventId::new(&hex::encode(digest)[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(price: Decimal) -> EventParams {
        EventParams::from([(SmolStr::new(PARAM_SETTLEMENT_PRICE), price)])
    }

    #[test]
    fn test_event_id_content_addressed() {
        let time = DateTime::<Utc>::default();

        let event_1 = Event::new(time, 0, "OPT".into(), EventAction::Expiry, params(dec!(100)));
        let event_2 = Event::new(time, 0, "OPT".into(), EventAction::Expiry, params(dec!(100)));
        let event_3 = Event::new(time, 0, "OPT".into(), EventAction::Expiry, params(dec!(101)));
        let event_4 = Event::new(time, 0, "OPT".into(), EventAction::Exercise, params(dec!(100)));

        assert_eq!(event_1.event_id(), event_2.event_id());
        assert_ne!(event_1.event_id(), event_3.event_id());
        assert_ne!(event_1.event_id(), event_4.event_id());
    }

    #[test]
    fn test_event_id_normalizes_params() {
        let time = DateTime::<Utc>::default();
        let event_1 = Event::new(time, 0, "OPT".into(), EventAction::Expiry, params(dec!(100)));
        let event_2 =
            Event::new(time, 0, "OPT".into(), EventAction::Expiry, params(dec!(100.00)));
        assert_eq!(event_1.event_id(), event_2.event_id());
    }
}
