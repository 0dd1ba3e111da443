//! Event bus traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::EventEnvelope;
use crate::error::Result;

/// A consumer callback for deliveries on a subscribed topic.
///
/// Delivery is at-least-once: the same `event_id` may be handed to a
/// handler more than once, and handlers must tolerate that without
/// duplicating effects.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope) -> Result<()>;
}

/// At-least-once publish/subscribe over a partitioned log.
///
/// Ordering is guaranteed only among events sharing a partition key
/// (the envelope's aggregate id), never across keys. Each consumer
/// group receives every published event once per delivery attempt.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an envelope to a topic.
    async fn publish(&self, topic: &str, envelope: EventEnvelope) -> Result<()>;

    /// Registers a handler for a topic under a consumer group.
    ///
    /// One handler per (topic, group); subscribing again under the
    /// same group replaces the previous handler.
    async fn subscribe(&self, topic: &str, consumer_group: &str, handler: Arc<dyn EventHandler>);
}
