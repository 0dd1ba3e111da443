//! Saga steps and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of steps in a ticket booking saga.
///
/// Each kind names both the forward action and its compensating
/// action, so the step table is exhaustively checkable — there is no
/// string-keyed dispatch anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Reserve seats in the inventory ledger. Compensated by releasing
    /// the same quantity.
    InventoryReservation,

    /// Initiate payment with the payment gateway. Compensated by a
    /// refund if the payment was recorded.
    PaymentInitiation,

    /// Notify the user that the booking is pending. Best-effort; has
    /// no compensating action.
    NotificationSending,
}

impl StepKind {
    /// Forward execution order; reversed, this is the compensation order.
    pub const SEQUENCE: [StepKind; 3] = [
        StepKind::InventoryReservation,
        StepKind::PaymentInitiation,
        StepKind::NotificationSending,
    ];

    /// Returns the wire name of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::InventoryReservation => "inventory-reservation",
            StepKind::PaymentInitiation => "payment-initiation",
            StepKind::NotificationSending => "notification-sending",
        }
    }

    /// Returns true if a failure of this step aborts the booking.
    ///
    /// Notification is a side effect, not part of the transaction: its
    /// failure is recorded but never triggers compensation.
    pub fn is_transactional(&self) -> bool {
        !matches!(self, StepKind::NotificationSending)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a single saga step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// Step has not started yet.
    Pending,

    /// Step is executing.
    InProgress,

    /// Step finished successfully.
    Completed,

    /// Step failed (business rejection or exhausted retries).
    Failed,

    /// The step's reverse action ran during compensation.
    Compensated,
}

impl StepStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::InProgress => "InProgress",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
            StepStatus::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step record inside a saga instance.
///
/// Steps are appended in execution order; a saga never contains two
/// records of the same kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStep {
    pub kind: StepKind,
    pub status: StepStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SagaStep {
    /// Creates a step record entering execution.
    pub fn begin(kind: StepKind) -> Self {
        Self {
            kind,
            status: StepStatus::InProgress,
            executed_at: Some(Utc::now()),
            error: None,
        }
    }

    /// Marks the step completed.
    pub fn complete(&mut self) {
        self.status = StepStatus::Completed;
    }

    /// Marks the step failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
    }

    /// Marks the step's reverse action as executed.
    pub fn compensate(&mut self) {
        self.status = StepStatus::Compensated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_order() {
        assert_eq!(
            StepKind::SEQUENCE,
            [
                StepKind::InventoryReservation,
                StepKind::PaymentInitiation,
                StepKind::NotificationSending,
            ]
        );
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            StepKind::InventoryReservation.as_str(),
            "inventory-reservation"
        );
        assert_eq!(StepKind::PaymentInitiation.as_str(), "payment-initiation");
        assert_eq!(StepKind::NotificationSending.as_str(), "notification-sending");
    }

    #[test]
    fn test_notification_is_not_transactional() {
        assert!(StepKind::InventoryReservation.is_transactional());
        assert!(StepKind::PaymentInitiation.is_transactional());
        assert!(!StepKind::NotificationSending.is_transactional());
    }

    #[test]
    fn test_step_lifecycle() {
        let mut step = SagaStep::begin(StepKind::PaymentInitiation);
        assert_eq!(step.status, StepStatus::InProgress);
        assert!(step.executed_at.is_some());
        assert!(step.error.is_none());

        step.fail("card declined");
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("card declined"));
    }

    #[test]
    fn test_step_complete_then_compensate() {
        let mut step = SagaStep::begin(StepKind::InventoryReservation);
        step.complete();
        assert_eq!(step.status, StepStatus::Completed);

        step.compensate();
        assert_eq!(step.status, StepStatus::Compensated);
    }
}
