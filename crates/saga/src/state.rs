//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The status of a saga in its lifecycle.
///
/// Status transitions:
/// ```text
/// Started ──┬──► InProgress ──┬──► Completed
///           │                 └──► Compensating
///           └──► Compensating ──┬──► Compensated
///                               └──► Failed
/// ```
/// Transitions are monotonic: no edge outside this table is ever
/// taken, and terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// Saga created; forward steps are executing.
    #[default]
    Started,

    /// All transactional steps succeeded; waiting for downstream
    /// payment confirmation.
    InProgress,

    /// A step failed and compensating actions are running.
    Compensating,

    /// Compensation finished cleanly after a failure (terminal).
    Compensated,

    /// The booking completed successfully (terminal).
    Completed,

    /// Compensation itself failed; needs operator attention (terminal).
    Failed,
}

impl SagaStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        matches!(
            (self, next),
            (SagaStatus::Started, SagaStatus::InProgress)
                | (SagaStatus::Started, SagaStatus::Compensating)
                | (SagaStatus::InProgress, SagaStatus::Completed)
                | (SagaStatus::InProgress, SagaStatus::Compensating)
                | (SagaStatus::Compensating, SagaStatus::Compensated)
                | (SagaStatus::Compensating, SagaStatus::Failed)
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Compensated | SagaStatus::Completed | SagaStatus::Failed
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "Started",
            SagaStatus::InProgress => "InProgress",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Completed => "Completed",
            SagaStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
