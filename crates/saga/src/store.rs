//! Durable storage for saga instances.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{SagaId, TicketId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::instance::SagaInstance;
use crate::state::SagaStatus;

/// Storage port for saga instances and their steps.
///
/// The store's per-record write is the only serialization the
/// coordinator relies on; sagas for different tickets never share
/// state through it.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists the saga (steps included), replacing any prior record
    /// with the same saga ID.
    async fn save(&self, saga: &SagaInstance) -> Result<()>;

    /// Loads a saga by its ID.
    async fn find(&self, saga_id: SagaId) -> Result<Option<SagaInstance>>;

    /// Loads the saga correlated with a ticket, if one exists.
    async fn find_by_ticket(&self, ticket_id: TicketId) -> Result<Option<SagaInstance>>;

    /// Returns sagas stuck in a non-terminal, non-waiting state.
    ///
    /// A saga counts as stalled when it has sat in `Started` or
    /// `Compensating` for longer than `grace` — the crash-recovery
    /// pass re-resolves these.
    async fn find_stalled(&self, grace: Duration) -> Result<Vec<SagaInstance>>;
}

#[derive(Default)]
struct StoreState {
    sagas: HashMap<SagaId, SagaInstance>,
    by_ticket: HashMap<TicketId, SagaId>,
}

/// In-memory saga store for testing and single-node deployments.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemorySagaStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.state.read().await.sagas.len()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn save(&self, saga: &SagaInstance) -> Result<()> {
        let mut state = self.state.write().await;
        state.by_ticket.insert(saga.ticket_id, saga.saga_id);
        state.sagas.insert(saga.saga_id, saga.clone());
        Ok(())
    }

    async fn find(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let state = self.state.read().await;
        Ok(state.sagas.get(&saga_id).cloned())
    }

    async fn find_by_ticket(&self, ticket_id: TicketId) -> Result<Option<SagaInstance>> {
        let state = self.state.read().await;
        Ok(state
            .by_ticket
            .get(&ticket_id)
            .and_then(|id| state.sagas.get(id))
            .cloned())
    }

    async fn find_stalled(&self, grace: Duration) -> Result<Vec<SagaInstance>> {
        let cutoff = Utc::now() - grace;
        let state = self.state.read().await;
        Ok(state
            .sagas
            .values()
            .filter(|saga| {
                matches!(
                    saga.status,
                    SagaStatus::Started | SagaStatus::Compensating
                ) && saga.started_at < cutoff
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EventKey, Money, TicketId, UserId};
    use events::TicketCreatedData;

    fn saga() -> SagaInstance {
        SagaInstance::new(
            &TicketCreatedData {
                ticket_id: TicketId::new(),
                user_id: UserId::new(),
                event_key: EventKey::new("concert"),
                quantity: 1,
                price_per_ticket: Money::from_cents(1000),
                total_amount: Money::from_cents(1000),
            },
            1,
        )
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = InMemorySagaStore::new();
        let saga = saga();

        store.save(&saga).await.unwrap();

        let by_id = store.find(saga.saga_id).await.unwrap().unwrap();
        assert_eq!(by_id.saga_id, saga.saga_id);

        let by_ticket = store.find_by_ticket(saga.ticket_id).await.unwrap().unwrap();
        assert_eq!(by_ticket.saga_id, saga.saga_id);

        assert_eq!(store.saga_count().await, 1);
    }

    #[tokio::test]
    async fn test_save_replaces_prior_record() {
        let store = InMemorySagaStore::new();
        let mut saga = saga();

        store.save(&saga).await.unwrap();
        saga.transition(SagaStatus::InProgress).unwrap();
        store.save(&saga).await.unwrap();

        let loaded = store.find(saga.saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SagaStatus::InProgress);
        assert_eq!(store.saga_count().await, 1);
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = InMemorySagaStore::new();
        assert!(store.find(SagaId::new()).await.unwrap().is_none());
        assert!(
            store
                .find_by_ticket(TicketId::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_find_stalled_filters_by_status_and_age() {
        let store = InMemorySagaStore::new();

        let mut old_started = saga();
        old_started.started_at = Utc::now() - Duration::minutes(10);
        store.save(&old_started).await.unwrap();

        let mut old_completed = saga();
        old_completed.started_at = Utc::now() - Duration::minutes(10);
        old_completed.transition(SagaStatus::InProgress).unwrap();
        old_completed.transition(SagaStatus::Completed).unwrap();
        store.save(&old_completed).await.unwrap();

        let fresh = saga();
        store.save(&fresh).await.unwrap();

        let stalled = store.find_stalled(Duration::minutes(5)).await.unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].saga_id, old_started.saga_id);
    }
}
