//! Notification port and in-memory implementation.
//!
//! Delivery mechanics are a black box: the step only observes
//! success or failure.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{TicketId, UserId};
use thiserror::Error;

/// Technical faults from the notification channel.
#[derive(Debug, Error)]
pub enum NotifierFault {
    /// The notification could not be delivered.
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Port for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tells the user their booking is pending confirmation.
    async fn booking_pending(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> Result<(), NotifierFault>;
}

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<(TicketId, UserId)>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<NotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail deliveries.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of notifications delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn booking_pending(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> Result<(), NotifierFault> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(NotifierFault::DeliveryFailed("smtp timeout".to_string()));
        }

        state.sent.push((ticket_id, user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_notifications() {
        let notifier = InMemoryNotifier::new();

        notifier
            .booking_pending(TicketId::new(), UserId::new())
            .await
            .unwrap();
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_switch() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);

        let result = notifier
            .booking_pending(TicketId::new(), UserId::new())
            .await;
        assert!(matches!(result, Err(NotifierFault::DeliveryFailed(_))));
        assert_eq!(notifier.sent_count(), 0);
    }
}
