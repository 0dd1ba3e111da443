//! In-memory event bus implementation for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bus::{EventBus, EventHandler};
use crate::envelope::{EventEnvelope, EventId};
use crate::error::{BusError, Result};

#[derive(Default)]
struct TopicState {
    /// Append-only log of wire-form events, in publish order.
    log: Vec<(String, serde_json::Value)>,
    /// One handler per consumer group.
    subscribers: HashMap<String, Arc<dyn EventHandler>>,
}

/// In-memory [`EventBus`] over a per-topic log.
///
/// Deliveries happen inline in publish order, which preserves ordering
/// within each partition key. The [`InMemoryEventBus::redeliver`] hook
/// replays a stored event to all groups so tests can exercise
/// at-least-once semantics.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    topics: Arc<RwLock<HashMap<String, TopicState>>>,
}

impl InMemoryEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all events published to a topic, in publish order.
    ///
    /// Skips entries that no longer decode (raw-injected garbage).
    pub async fn published(&self, topic: &str) -> Vec<EventEnvelope> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|state| {
                state
                    .log
                    .iter()
                    .filter_map(|(_, value)| EventEnvelope::from_json(value.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the events published to a topic for one partition key.
    pub async fn partition(&self, topic: &str, key: &str) -> Vec<EventEnvelope> {
        self.published(topic)
            .await
            .into_iter()
            .filter(|e| e.aggregate_id == key)
            .collect()
    }

    /// Delivers a stored event to all consumer groups again.
    ///
    /// Test hook for at-least-once delivery: consumers must tolerate
    /// seeing the same event id twice.
    pub async fn redeliver(&self, topic: &str, event_id: EventId) -> Result<()> {
        let value = {
            let topics = self.topics.read().await;
            let state = topics
                .get(topic)
                .ok_or_else(|| BusError::Validation(format!("unknown topic '{topic}'")))?;
            state
                .log
                .iter()
                .map(|(_, v)| v)
                .find(|v| {
                    EventEnvelope::from_json((*v).clone())
                        .map(|e| e.event_id == event_id)
                        .unwrap_or(false)
                })
                .cloned()
                .ok_or_else(|| BusError::Validation(format!("no stored event {event_id}")))?
        };
        self.dispatch(topic, value).await;
        Ok(())
    }

    /// Appends a raw wire-form value and attempts delivery.
    ///
    /// Lets tests inject malformed payloads; these are rejected at
    /// decode time and never reach handlers.
    pub async fn publish_raw(
        &self,
        topic: &str,
        partition_key: impl Into<String>,
        value: serde_json::Value,
    ) {
        {
            let mut topics = self.topics.write().await;
            let state = topics.entry(topic.to_string()).or_default();
            state.log.push((partition_key.into(), value.clone()));
        }
        self.dispatch(topic, value).await;
    }

    async fn dispatch(&self, topic: &str, value: serde_json::Value) {
        // Collect handlers first so nested publishes from inside a
        // handler do not deadlock on the topic table.
        let handlers: Vec<(String, Arc<dyn EventHandler>)> = {
            let topics = self.topics.read().await;
            topics
                .get(topic)
                .map(|state| {
                    state
                        .subscribers
                        .iter()
                        .map(|(group, handler)| (group.clone(), handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let envelope = match EventEnvelope::from_json(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                metrics::counter!("events_rejected_total").increment(1);
                tracing::error!(topic, error = %e, "dropping event that failed validation");
                return;
            }
        };

        for (group, handler) in handlers {
            if let Err(e) = handler.handle(envelope.clone()).await {
                tracing::error!(
                    topic,
                    group,
                    event_id = %envelope.event_id,
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, envelope: EventEnvelope) -> Result<()> {
        if envelope.aggregate_id.is_empty() {
            return Err(BusError::Validation(
                "cannot publish event with empty aggregate id".to_string(),
            ));
        }

        let value = envelope.to_json()?;
        {
            let mut topics = self.topics.write().await;
            let state = topics.entry(topic.to_string()).or_default();
            state.log.push((envelope.aggregate_id.clone(), value.clone()));
        }

        metrics::counter!("events_published_total").increment(1);
        tracing::debug!(topic, event_type = envelope.event_type(), "event published");

        self.dispatch(topic, value).await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, consumer_group: &str, handler: Arc<dyn EventHandler>) {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();
        state
            .subscribers
            .insert(consumer_group.to_string(), handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingEvent, TicketConfirmedData, topics};
    use common::{TicketId, UserId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<EventEnvelope>>,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<EventEnvelope> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, envelope: EventEnvelope) -> Result<()> {
            self.seen.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    fn confirmed(ticket_id: TicketId, version: u64) -> EventEnvelope {
        EventEnvelope::new(
            ticket_id.to_string(),
            version,
            BookingEvent::TicketConfirmed(TicketConfirmedData {
                ticket_id,
                user_id: UserId::new(),
            }),
        )
    }

    #[tokio::test]
    async fn test_delivers_to_subscribed_group() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(RecordingHandler::default());
        bus.subscribe(topics::TICKET_CONFIRMED, "ticket-group", handler.clone())
            .await;

        let envelope = confirmed(TicketId::new(), 1);
        bus.publish(topics::TICKET_CONFIRMED, envelope.clone())
            .await
            .unwrap();

        let seen = handler.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_id, envelope.event_id);
    }

    #[tokio::test]
    async fn test_ordering_preserved_within_partition_key() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(RecordingHandler::default());
        bus.subscribe(topics::TICKET_CONFIRMED, "g", handler.clone())
            .await;

        let ticket_a = TicketId::new();
        let ticket_b = TicketId::new();
        for version in 1..=3 {
            bus.publish(topics::TICKET_CONFIRMED, confirmed(ticket_a, version))
                .await
                .unwrap();
            bus.publish(topics::TICKET_CONFIRMED, confirmed(ticket_b, version))
                .await
                .unwrap();
        }

        let for_a: Vec<u64> = handler
            .seen()
            .into_iter()
            .filter(|e| e.aggregate_id == ticket_a.to_string())
            .map(|e| e.version)
            .collect();
        assert_eq!(for_a, vec![1, 2, 3]);

        let partition = bus
            .partition(topics::TICKET_CONFIRMED, &ticket_b.to_string())
            .await;
        assert_eq!(partition.len(), 3);
    }

    #[tokio::test]
    async fn test_redeliver_duplicates_an_event() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(RecordingHandler::default());
        bus.subscribe(topics::TICKET_CONFIRMED, "g", handler.clone())
            .await;

        let envelope = confirmed(TicketId::new(), 1);
        let event_id = envelope.event_id;
        bus.publish(topics::TICKET_CONFIRMED, envelope).await.unwrap();
        bus.redeliver(topics::TICKET_CONFIRMED, event_id)
            .await
            .unwrap();

        let seen = handler.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event_id, seen[1].event_id);
    }

    #[tokio::test]
    async fn test_malformed_raw_event_never_reaches_handlers() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(RecordingHandler::default());
        bus.subscribe(topics::TICKET_CREATED, "g", handler.clone())
            .await;

        bus.publish_raw(
            topics::TICKET_CREATED,
            "ticket-1",
            serde_json::json!({"type": "Garbage"}),
        )
        .await;

        assert!(handler.seen().is_empty());
    }

    #[tokio::test]
    async fn test_resubscribing_replaces_group_handler() {
        let bus = InMemoryEventBus::new();
        let first = Arc::new(RecordingHandler::default());
        let second = Arc::new(RecordingHandler::default());

        bus.subscribe(topics::TICKET_CONFIRMED, "g", first.clone())
            .await;
        bus.subscribe(topics::TICKET_CONFIRMED, "g", second.clone())
            .await;

        bus.publish(topics::TICKET_CONFIRMED, confirmed(TicketId::new(), 1))
            .await
            .unwrap();

        assert!(first.seen().is_empty());
        assert_eq!(second.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_partition_key() {
        let bus = InMemoryEventBus::new();
        let mut envelope = confirmed(TicketId::new(), 1);
        envelope.aggregate_id = String::new();

        let result = bus.publish(topics::TICKET_CONFIRMED, envelope).await;
        assert!(matches!(result, Err(BusError::Validation(_))));
    }
}
