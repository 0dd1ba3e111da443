//! The saga instance record.

use chrono::{DateTime, Utc};
use common::{EventKey, Money, SagaId, TicketId, UserId};
use events::TicketCreatedData;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::state::SagaStatus;
use crate::step::{SagaStep, StepKind, StepStatus};

/// Durable record of one booking saga.
///
/// Owned exclusively by the coordinator: no other component mutates a
/// saga instance. Carries the booking context needed to execute and
/// compensate steps (event key, quantity, amount, payment id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    pub saga_id: SagaId,
    /// Correlation key; unique per saga.
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub event_key: EventKey,
    pub quantity: u32,
    pub total_amount: Money,
    /// Payment ID recorded after a successful payment initiation,
    /// needed for the refund on compensation.
    pub payment_id: Option<String>,
    pub status: SagaStatus,
    pub steps: Vec<SagaStep>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub compensation_reason: Option<String>,
    /// Highest envelope version seen for this ticket, used to detect
    /// stale replays of confirmation events.
    pub last_seen_version: u64,
}

impl SagaInstance {
    /// Creates a new saga for a booking-initiation event.
    pub fn new(booking: &TicketCreatedData, event_version: u64) -> Self {
        Self {
            saga_id: SagaId::new(),
            ticket_id: booking.ticket_id,
            user_id: booking.user_id,
            event_key: booking.event_key.clone(),
            quantity: booking.quantity,
            total_amount: booking.total_amount,
            payment_id: None,
            status: SagaStatus::Started,
            steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            compensation_reason: None,
            last_seen_version: event_version,
        }
    }

    /// Moves the saga to `next`, enforcing the transition table.
    pub fn transition(&mut self, next: SagaStatus) -> Result<(), SagaError> {
        if !self.status.can_transition_to(next) {
            return Err(SagaError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(saga_id = %self.saga_id, from = %self.status, to = %next, "saga transition");
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Appends a step record entering execution.
    pub fn step_started(&mut self, kind: StepKind) {
        debug_assert!(self.step(kind).is_none(), "step {kind} recorded twice");
        self.steps.push(SagaStep::begin(kind));
    }

    /// Marks the given step completed.
    pub fn step_completed(&mut self, kind: StepKind) {
        if let Some(step) = self.step_mut(kind) {
            step.complete();
        }
    }

    /// Marks the given step failed.
    pub fn step_failed(&mut self, kind: StepKind, error: impl Into<String>) {
        if let Some(step) = self.step_mut(kind) {
            step.fail(error);
        }
    }

    /// Marks the given step's reverse action as executed.
    pub fn step_compensated(&mut self, kind: StepKind) {
        if let Some(step) = self.step_mut(kind) {
            step.compensate();
        }
    }

    /// Returns the step record of the given kind, if it was started.
    pub fn step(&self, kind: StepKind) -> Option<&SagaStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    fn step_mut(&mut self, kind: StepKind) -> Option<&mut SagaStep> {
        self.steps.iter_mut().find(|s| s.kind == kind)
    }

    /// Returns the completed steps in execution order.
    ///
    /// Reversed, this is the compensation order.
    pub fn completed_steps(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.kind)
            .collect()
    }
}
