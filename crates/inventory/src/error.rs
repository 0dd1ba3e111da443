use common::EventKey;
use lock::LockError;
use thiserror::Error;

/// Errors that can occur in the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No record exists for the requested event key.
    #[error("no inventory record for event '{0}'")]
    UnknownEvent(EventKey),

    /// A record already exists for the event key.
    #[error("inventory record already exists for event '{0}'")]
    DuplicateEvent(EventKey),

    /// Quantity must be strictly positive.
    #[error("quantity must be positive")]
    InvalidQuantity,

    /// Total seats must be strictly positive.
    #[error("total seats must be positive")]
    InvalidCapacity,

    /// The per-key lock could not be acquired within the wait timeout.
    ///
    /// The outcome of the operation is unknown; callers must deny the
    /// business operation rather than assume success.
    #[error("inventory for event '{key}' is contended: {source}")]
    Contended {
        key: EventKey,
        #[source]
        source: LockError,
    },

    /// The write was attempted under an expired lease or a fencing
    /// token older than the last committed write.
    #[error("stale lock grant rejected for event '{0}'")]
    StaleGrant(EventKey),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
