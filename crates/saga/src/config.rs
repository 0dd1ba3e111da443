//! Saga coordinator configuration.

use std::time::Duration;

/// Tunables for saga execution.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// How long the inventory ledger waits for its per-key lock.
    pub lock_wait: Duration,

    /// Lease granted on each lock acquisition; a crashed holder frees
    /// the lock after this long.
    pub lock_lease: Duration,

    /// How many times a step executor retries a technical fault before
    /// the step counts as failed.
    pub technical_retries: u32,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(10),
            lock_lease: Duration::from_secs(5),
            technical_retries: 2,
        }
    }
}
