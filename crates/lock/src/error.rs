use thiserror::Error;

/// Errors that can occur when acquiring a lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The wait timeout elapsed before the lock became free.
    ///
    /// Callers must treat this as "could not determine outcome" and
    /// deny the guarded operation rather than assume success.
    #[error("timed out after {waited_ms}ms waiting for lock on '{key}'")]
    WaitTimeout { key: String, waited_ms: u128 },
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
