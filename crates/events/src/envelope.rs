//! The domain event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::BookingEvent;
use crate::error::{BusError, Result};

/// Unique identifier for a published event.
///
/// Consumers use it to de-duplicate redeliveries under at-least-once
/// delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event together with its delivery metadata.
///
/// Immutable once published. `aggregate_id` is the partition key:
/// ordering is guaranteed only among envelopes sharing it. `version`
/// increases monotonically per aggregate and lets consumers detect
/// stale replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub aggregate_id: String,
    pub version: u64,
    pub occurred_at: DateTime<Utc>,
    pub event: BookingEvent,
}

impl EventEnvelope {
    /// Wraps an event for publication.
    pub fn new(aggregate_id: impl Into<String>, version: u64, event: BookingEvent) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id: aggregate_id.into(),
            version,
            occurred_at: Utc::now(),
            event,
        }
    }

    /// Returns the event type name of the wrapped event.
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Serializes the envelope for the wire.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes an envelope from its wire form.
    ///
    /// Any envelope that does not match the fixed schema (missing
    /// fields, unknown event type, empty partition key) is rejected as
    /// a validation failure.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let envelope: EventEnvelope = serde_json::from_value(value)
            .map_err(|e| BusError::Validation(format!("malformed event envelope: {e}")))?;
        if envelope.aggregate_id.is_empty() {
            return Err(BusError::Validation(
                "event envelope has empty aggregate id".to_string(),
            ));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{TicketConfirmedData, topics};
    use common::{TicketId, UserId};

    fn envelope() -> EventEnvelope {
        let ticket_id = TicketId::new();
        EventEnvelope::new(
            ticket_id.to_string(),
            1,
            BookingEvent::TicketConfirmed(TicketConfirmedData {
                ticket_id,
                user_id: UserId::new(),
            }),
        )
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        assert_ne!(envelope().event_id, envelope().event_id);
    }

    #[test]
    fn test_wire_roundtrip() {
        let original = envelope();
        let value = original.to_json().unwrap();
        let decoded = EventEnvelope::from_json(value).unwrap();

        assert_eq!(decoded.event_id, original.event_id);
        assert_eq!(decoded.aggregate_id, original.aggregate_id);
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.event_type(), "TicketConfirmed");
        assert_eq!(decoded.event.topic(), topics::TICKET_CONFIRMED);
    }

    #[test]
    fn test_malformed_payload_is_a_validation_failure() {
        let result = EventEnvelope::from_json(serde_json::json!({"bogus": true}));
        assert!(matches!(result, Err(BusError::Validation(_))));
    }

    #[test]
    fn test_empty_aggregate_id_is_rejected() {
        let mut value = envelope().to_json().unwrap();
        value["aggregate_id"] = serde_json::json!("");
        let result = EventEnvelope::from_json(value);
        assert!(matches!(result, Err(BusError::Validation(_))));
    }
}
