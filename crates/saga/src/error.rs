//! Saga error types.

use common::SagaId;
use events::BusError;
use inventory::LedgerError;
use thiserror::Error;

use crate::services::payment::GatewayFault;
use crate::state::SagaStatus;

/// Errors that can occur during saga operations.
///
/// Business outcomes (insufficient seats, declined payment) are NOT
/// errors; they travel as plain values and end in compensation. These
/// variants cover validation failures, technical faults and the one
/// unrecoverable case, failed compensation.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The triggering event was malformed or incomplete. Dropped with
    /// a diagnostic; never retried; never creates a saga instance.
    #[error("invalid triggering event: {0}")]
    Validation(String),

    /// An illegal saga status transition was attempted.
    #[error("invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaStatus, to: SagaStatus },

    /// A compensating action failed; the saga is terminal Failed and
    /// needs manual intervention.
    #[error("compensation failed for saga {saga_id}: {reason}")]
    CompensationFailed { saga_id: SagaId, reason: String },

    /// Inventory ledger error.
    #[error("inventory ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Event bus error.
    #[error("event bus error: {0}")]
    Bus(#[from] BusError),

    /// Payment gateway fault.
    #[error("payment gateway fault: {0}")]
    Gateway(#[from] GatewayFault),

    /// Saga store error.
    #[error("saga store error: {0}")]
    Store(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
