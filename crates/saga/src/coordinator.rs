//! The booking saga coordinator.
//!
//! Drives each booking through the fixed step sequence (reserve seats,
//! initiate payment, notify the user), reacts to downstream payment
//! confirmations, and rolls completed steps back in reverse order when
//! a step fails. Business rejections travel as plain values; only
//! technical faults are retried.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use events::{
    BookingEvent, BusError, EventBus, EventEnvelope, EventHandler, EventId, PaymentCompletedData,
    PaymentFailedData, PaymentInitiatedData, PaymentRefundedData, TicketCancelledData,
    TicketConfirmedData, TicketCreatedData, topics,
};
use inventory::{InventoryLedger, LedgerError};
use lock::LockManager;
use tokio::sync::Mutex;

use crate::compensation::CompensationHandler;
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::instance::SagaInstance;
use crate::services::notification::{Notifier, NotifierFault};
use crate::services::payment::{GatewayFault, PaymentGateway, PaymentOutcome};
use crate::state::SagaStatus;
use crate::step::{StepKind, StepStatus};
use crate::store::SagaStore;

/// Consumer group under which the coordinator subscribes to the bus.
pub const CONSUMER_GROUP: &str = "saga-orchestrator-group";

/// How many processed event ids the coordinator remembers for
/// redelivery suppression.
const SEEN_EVENTS_CAPACITY: usize = 10_000;

/// Fixed-capacity set of recently processed event ids.
///
/// Evicts oldest-first once full, so memory stays bounded no matter how
/// long the coordinator runs. Redeliveries arrive close to the original
/// in practice; an id evicted before its redelivery falls through to
/// the per-ticket idempotency checks, which catch it anyway.
struct RecentEventIds {
    ids: HashSet<EventId>,
    order: VecDeque<EventId>,
    capacity: usize,
}

impl RecentEventIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, event_id: &EventId) -> bool {
        self.ids.contains(event_id)
    }

    fn insert(&mut self, event_id: EventId) {
        if !self.ids.insert(event_id) {
            return;
        }
        self.order.push_back(event_id);
        if self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
    }
}

/// Orchestrates ticket booking sagas.
///
/// One coordinator instance serves all sagas; per-ticket state lives in
/// the [`SagaStore`] and seat state in the [`InventoryLedger`]. The
/// coordinator is the only writer of saga instances, so each handler
/// invocation loads, mutates and saves without further locking.
pub struct SagaCoordinator<S, B, L, P, N>
where
    S: SagaStore,
    B: EventBus,
    L: LockManager + Clone,
    P: PaymentGateway + Clone,
    N: Notifier,
{
    store: S,
    bus: B,
    ledger: InventoryLedger<L>,
    gateway: P,
    notifier: N,
    compensation: CompensationHandler<L, P>,
    config: SagaConfig,
    /// Event ids already processed, to absorb at-least-once redelivery.
    seen_events: Mutex<RecentEventIds>,
}

impl<S, B, L, P, N> SagaCoordinator<S, B, L, P, N>
where
    S: SagaStore,
    B: EventBus,
    L: LockManager + Clone,
    P: PaymentGateway + Clone,
    N: Notifier,
{
    /// Creates a coordinator over the given collaborators.
    pub fn new(
        store: S,
        bus: B,
        ledger: InventoryLedger<L>,
        gateway: P,
        notifier: N,
        config: SagaConfig,
    ) -> Self {
        let compensation = CompensationHandler::new(ledger.clone(), gateway.clone());
        Self {
            store,
            bus,
            ledger,
            gateway,
            notifier,
            compensation,
            config,
            seen_events: Mutex::new(RecentEventIds::new(SEEN_EVENTS_CAPACITY)),
        }
    }

    /// Subscribes the coordinator to the topics it reacts to.
    pub async fn subscribe(self: Arc<Self>)
    where
        S: 'static,
        B: 'static,
        L: 'static,
        P: 'static,
        N: 'static,
    {
        let handler: Arc<dyn EventHandler> = self.clone();
        for topic in [
            topics::TICKET_CREATED,
            topics::PAYMENT_COMPLETED,
            topics::PAYMENT_FAILED,
        ] {
            self.bus
                .subscribe(topic, CONSUMER_GROUP, handler.clone())
                .await;
        }
    }

    /// Returns the saga correlated with a ticket, if one exists.
    pub async fn saga_for_ticket(&self, ticket_id: common::TicketId) -> Result<Option<SagaInstance>> {
        self.store.find_by_ticket(ticket_id).await
    }

    /// Starts a new saga for an accepted booking request.
    ///
    /// Idempotent per ticket: a second `TicketCreated` for a ticket
    /// that already has a saga is ignored. Runs the step sequence and
    /// leaves the saga `InProgress` awaiting payment confirmation, or
    /// fully compensated if a transactional step failed.
    #[tracing::instrument(skip(self, booking), fields(ticket_id = %booking.ticket_id))]
    pub async fn on_booking_initiated(
        &self,
        booking: &TicketCreatedData,
        version: u64,
    ) -> Result<()> {
        validate_booking(booking)?;

        if let Some(existing) = self.store.find_by_ticket(booking.ticket_id).await? {
            tracing::info!(saga_id = %existing.saga_id, "saga exists for ticket, ignoring duplicate");
            return Ok(());
        }

        let mut saga = SagaInstance::new(booking, version);
        metrics::counter!("sagas_started_total").increment(1);
        tracing::info!(saga_id = %saga.saga_id, quantity = saga.quantity, "booking saga started");
        self.store.save(&saga).await?;

        saga.step_started(StepKind::InventoryReservation);
        self.store.save(&saga).await?;
        match self.reserve_with_retry(&saga).await {
            Ok(true) => {
                saga.step_completed(StepKind::InventoryReservation);
                self.store.save(&saga).await?;
            }
            Ok(false) => {
                saga.step_failed(StepKind::InventoryReservation, "insufficient seats");
                return self.fail_and_compensate(&mut saga, "insufficient seats").await;
            }
            Err(e) => {
                let reason = e.to_string();
                saga.step_failed(StepKind::InventoryReservation, reason.as_str());
                return self.fail_and_compensate(&mut saga, &reason).await;
            }
        }

        saga.step_started(StepKind::PaymentInitiation);
        self.store.save(&saga).await?;
        match self.initiate_payment_with_retry(&saga).await {
            Ok(PaymentOutcome::Approved { payment_id, .. }) => {
                saga.payment_id = Some(payment_id);
                saga.step_completed(StepKind::PaymentInitiation);
                self.store.save(&saga).await?;

                let initiated = BookingEvent::PaymentInitiated(PaymentInitiatedData {
                    ticket_id: saga.ticket_id,
                    user_id: saga.user_id,
                    amount: saga.total_amount,
                });
                self.publish_for_ticket(&mut saga, initiated).await?;
                self.store.save(&saga).await?;
            }
            Ok(PaymentOutcome::Declined { reason }) => {
                saga.step_failed(StepKind::PaymentInitiation, reason.as_str());
                return self.fail_and_compensate(&mut saga, &reason).await;
            }
            Err(fault) => {
                let reason = fault.to_string();
                saga.step_failed(StepKind::PaymentInitiation, reason.as_str());
                return self.fail_and_compensate(&mut saga, &reason).await;
            }
        }

        // Notification is best-effort: a failed delivery is recorded on
        // the step but never aborts the booking.
        saga.step_started(StepKind::NotificationSending);
        match self.notify_with_retry(&saga).await {
            Ok(()) => saga.step_completed(StepKind::NotificationSending),
            Err(fault) => {
                tracing::warn!(saga_id = %saga.saga_id, error = %fault, "notification failed, continuing");
                saga.step_failed(StepKind::NotificationSending, fault.to_string());
            }
        }

        saga.transition(SagaStatus::InProgress)?;
        self.store.save(&saga).await?;
        tracing::info!(saga_id = %saga.saga_id, "saga awaiting payment confirmation");
        Ok(())
    }

    /// Completes the saga once the payment service confirms the charge.
    #[tracing::instrument(skip(self, payment), fields(ticket_id = %payment.ticket_id))]
    pub async fn on_payment_completed(
        &self,
        payment: &PaymentCompletedData,
        version: u64,
    ) -> Result<()> {
        let Some(mut saga) = self.store.find_by_ticket(payment.ticket_id).await? else {
            return Err(SagaError::Validation(format!(
                "payment completed for unknown ticket {}",
                payment.ticket_id
            )));
        };

        if saga.status.is_terminal() {
            tracing::debug!(saga_id = %saga.saga_id, "saga already settled, ignoring confirmation");
            return Ok(());
        }
        if version < saga.last_seen_version {
            tracing::debug!(
                saga_id = %saga.saga_id,
                version,
                last_seen = saga.last_seen_version,
                "stale payment confirmation, ignoring"
            );
            return Ok(());
        }
        if saga.status != SagaStatus::InProgress {
            tracing::warn!(saga_id = %saga.saga_id, status = %saga.status, "confirmation arrived in unexpected status, ignoring");
            return Ok(());
        }

        saga.last_seen_version = version;
        saga.transition(SagaStatus::Completed)?;
        self.store.save(&saga).await?;
        metrics::counter!("sagas_completed_total").increment(1);

        let confirmed = BookingEvent::TicketConfirmed(TicketConfirmedData {
            ticket_id: saga.ticket_id,
            user_id: saga.user_id,
        });
        self.publish_for_ticket(&mut saga, confirmed).await?;
        self.store.save(&saga).await?;
        tracing::info!(saga_id = %saga.saga_id, "booking confirmed");
        Ok(())
    }

    /// Compensates the saga when the payment service reports a failed
    /// charge after initiation.
    #[tracing::instrument(skip(self, payment), fields(ticket_id = %payment.ticket_id))]
    pub async fn on_payment_failed(
        &self,
        payment: &PaymentFailedData,
        version: u64,
    ) -> Result<()> {
        let Some(mut saga) = self.store.find_by_ticket(payment.ticket_id).await? else {
            return Err(SagaError::Validation(format!(
                "payment failure for unknown ticket {}",
                payment.ticket_id
            )));
        };

        if saga.status.is_terminal() {
            tracing::debug!(saga_id = %saga.saga_id, "saga already settled, ignoring failure report");
            return Ok(());
        }
        if version < saga.last_seen_version {
            tracing::debug!(saga_id = %saga.saga_id, version, "stale payment failure, ignoring");
            return Ok(());
        }

        saga.last_seen_version = version.max(saga.last_seen_version);
        let reason = format!("payment failed: {}", payment.failure_reason);
        match saga.status {
            SagaStatus::Compensating => self.settle_compensation(&mut saga, &reason).await,
            _ => self.fail_and_compensate(&mut saga, &reason).await,
        }
    }

    /// Resolves sagas stuck mid-execution after a crash.
    ///
    /// A saga still `Started` after `grace` had its process die between
    /// steps; its completed steps are rolled back. A saga stuck
    /// `Compensating` re-runs its reverse actions, which are idempotent.
    /// Returns the number of sagas resolved.
    pub async fn recover_stalled(&self, grace: chrono::Duration) -> Result<usize> {
        let stalled = self.store.find_stalled(grace).await?;
        let mut resolved = 0;

        for mut saga in stalled {
            tracing::warn!(saga_id = %saga.saga_id, status = %saga.status, "recovering stalled saga");
            let reason = saga
                .compensation_reason
                .clone()
                .unwrap_or_else(|| "stalled saga recovery".to_string());

            let outcome = match saga.status {
                SagaStatus::Started => self.fail_and_compensate(&mut saga, &reason).await,
                SagaStatus::Compensating => self.settle_compensation(&mut saga, &reason).await,
                _ => Ok(()),
            };

            match outcome {
                Ok(()) => {
                    metrics::counter!("sagas_recovered_total").increment(1);
                    resolved += 1;
                }
                Err(e) => {
                    tracing::error!(saga_id = %saga.saga_id, error = %e, "stalled saga could not be recovered");
                }
            }
        }
        Ok(resolved)
    }

    /// Moves the saga into compensation and rolls completed steps back.
    async fn fail_and_compensate(&self, saga: &mut SagaInstance, reason: &str) -> Result<()> {
        metrics::counter!("sagas_compensating_total").increment(1);
        tracing::warn!(saga_id = %saga.saga_id, reason, "booking failed, compensating");

        saga.compensation_reason = Some(reason.to_string());
        saga.transition(SagaStatus::Compensating)?;
        self.store.save(saga).await?;

        self.settle_compensation(saga, reason).await
    }

    /// Runs the reverse actions for a saga already `Compensating` and
    /// settles it in `Compensated` or, if a reverse action failed,
    /// terminal `Failed`.
    async fn settle_compensation(&self, saga: &mut SagaInstance, reason: &str) -> Result<()> {
        match self.compensation.compensate(saga).await {
            Ok(()) => {
                let refunded_payment = saga
                    .step(StepKind::PaymentInitiation)
                    .filter(|s| s.status == StepStatus::Compensated)
                    .and(saga.payment_id.clone());
                if let Some(payment_id) = refunded_payment {
                    let refunded = BookingEvent::PaymentRefunded(PaymentRefundedData {
                        payment_id,
                        ticket_id: saga.ticket_id,
                    });
                    self.publish_for_ticket(saga, refunded).await?;
                }

                let cancelled = BookingEvent::TicketCancelled(TicketCancelledData {
                    ticket_id: saga.ticket_id,
                    user_id: saga.user_id,
                    reason: reason.to_string(),
                });
                self.publish_for_ticket(saga, cancelled).await?;

                saga.transition(SagaStatus::Compensated)?;
                self.store.save(saga).await?;
                tracing::info!(saga_id = %saga.saga_id, "saga compensated");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("sagas_failed_total").increment(1);
                tracing::error!(saga_id = %saga.saga_id, error = %e, "compensation failed, manual intervention required");
                saga.transition(SagaStatus::Failed)?;
                self.store.save(saga).await?;
                Err(e)
            }
        }
    }

    async fn reserve_with_retry(
        &self,
        saga: &SagaInstance,
    ) -> std::result::Result<bool, LedgerError> {
        let mut attempt = 0;
        loop {
            match self.ledger.reserve(&saga.event_key, saga.quantity).await {
                Err(e @ (LedgerError::Contended { .. } | LedgerError::StaleGrant(_)))
                    if attempt < self.config.technical_retries =>
                {
                    attempt += 1;
                    tracing::warn!(saga_id = %saga.saga_id, error = %e, attempt, "retrying seat reservation");
                }
                other => return other,
            }
        }
    }

    async fn initiate_payment_with_retry(
        &self,
        saga: &SagaInstance,
    ) -> std::result::Result<PaymentOutcome, GatewayFault> {
        let mut attempt = 0;
        loop {
            match self
                .gateway
                .initiate(saga.ticket_id, saga.user_id, saga.total_amount)
                .await
            {
                Err(fault) if attempt < self.config.technical_retries => {
                    attempt += 1;
                    tracing::warn!(saga_id = %saga.saga_id, error = %fault, attempt, "retrying payment initiation");
                }
                other => return other,
            }
        }
    }

    async fn notify_with_retry(
        &self,
        saga: &SagaInstance,
    ) -> std::result::Result<(), NotifierFault> {
        let mut attempt = 0;
        loop {
            match self
                .notifier
                .booking_pending(saga.ticket_id, saga.user_id)
                .await
            {
                Err(fault) if attempt < self.config.technical_retries => {
                    attempt += 1;
                    tracing::warn!(saga_id = %saga.saga_id, error = %fault, attempt, "retrying notification");
                }
                other => return other,
            }
        }
    }

    /// Publishes an event partitioned by the saga's ticket, advancing
    /// the per-ticket version.
    async fn publish_for_ticket(&self, saga: &mut SagaInstance, event: BookingEvent) -> Result<()> {
        saga.last_seen_version += 1;
        let topic = event.topic();
        let envelope = EventEnvelope::new(saga.ticket_id.to_string(), saga.last_seen_version, event);
        self.bus.publish(topic, envelope).await?;
        Ok(())
    }

    async fn already_seen(&self, event_id: EventId) -> bool {
        self.seen_events.lock().await.contains(&event_id)
    }

    // Only fully handled deliveries are marked; a technical failure
    // leaves the id unmarked so the redelivery is processed again.

    async fn mark_seen(&self, event_id: EventId) {
        self.seen_events.lock().await.insert(event_id);
    }
}

fn validate_booking(booking: &TicketCreatedData) -> Result<()> {
    if booking.ticket_id.is_nil() {
        return Err(SagaError::Validation("ticket id is nil".to_string()));
    }
    if booking.event_key.as_str().is_empty() {
        return Err(SagaError::Validation("event key is empty".to_string()));
    }
    if booking.quantity == 0 {
        return Err(SagaError::Validation(
            "quantity must be positive".to_string(),
        ));
    }
    if booking.total_amount.as_cents() <= 0 {
        return Err(SagaError::Validation(
            "total amount must be positive".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl<S, B, L, P, N> EventHandler for SagaCoordinator<S, B, L, P, N>
where
    S: SagaStore + 'static,
    B: EventBus + 'static,
    L: LockManager + Clone + 'static,
    P: PaymentGateway + Clone + 'static,
    N: Notifier + 'static,
{
    async fn handle(&self, envelope: EventEnvelope) -> events::error::Result<()> {
        if self.already_seen(envelope.event_id).await {
            tracing::debug!(event_id = %envelope.event_id, "duplicate delivery, ignoring");
            return Ok(());
        }

        let outcome = match &envelope.event {
            BookingEvent::TicketCreated(data) => {
                self.on_booking_initiated(data, envelope.version).await
            }
            BookingEvent::PaymentCompleted(data) => {
                self.on_payment_completed(data, envelope.version).await
            }
            BookingEvent::PaymentFailed(data) => {
                self.on_payment_failed(data, envelope.version).await
            }
            _ => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.mark_seen(envelope.event_id).await;
                Ok(())
            }
            Err(SagaError::Validation(reason)) => {
                // Invalid events are dropped with a diagnostic, never
                // retried.
                metrics::counter!("saga_events_rejected_total").increment(1);
                tracing::warn!(event_id = %envelope.event_id, reason, "dropping invalid event");
                self.mark_seen(envelope.event_id).await;
                Ok(())
            }
            Err(e) => Err(BusError::Handler(e.to_string())),
        }
    }
}
