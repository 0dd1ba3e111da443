use thiserror::Error;

/// Errors that can occur when publishing or consuming events.
#[derive(Debug, Error)]
pub enum BusError {
    /// The event failed schema validation and was rejected.
    #[error("event failed validation: {0}")]
    Validation(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A consumer handler failed to process a delivery.
    #[error("handler error: {0}")]
    Handler(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
