//! Lock manager trait and grant types.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A monotonically increasing value issued with each lock grant.
///
/// Tokens increase per key: every successful acquisition on a key
/// yields a token strictly greater than any previously issued for that
/// key. A resource guarded by the lock records the token of its last
/// committed write and rejects writes under an older token, which
/// defends against a holder whose lease expired mid-critical-section.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FencingToken(u64);

impl FencingToken {
    /// Creates a token from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FencingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of a successful lock acquisition.
///
/// The grant is only valid until its lease deadline; callers must check
/// [`LockGrant::is_expired`] before committing state mutated inside the
/// critical section.
#[derive(Debug, Clone)]
pub struct LockGrant {
    key: String,
    token: FencingToken,
    expires_at: Instant,
}

impl LockGrant {
    pub(crate) fn new(key: String, token: FencingToken, expires_at: Instant) -> Self {
        Self {
            key,
            token,
            expires_at,
        }
    }

    /// Returns the key this grant covers.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the fencing token issued with this grant.
    pub fn token(&self) -> FencingToken {
        self.token
    }

    /// Returns true if the lease deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Trait for per-key mutual exclusion across process boundaries.
///
/// Implementations must guarantee that at most one unexpired grant
/// exists per key at any time, and that fencing tokens increase
/// monotonically per key.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Attempts to acquire the lock for `key`.
    ///
    /// Waits up to `wait_timeout` for the lock to become free; the
    /// grant is held for at most `lease_timeout`, after which the lock
    /// is automatically considered free again.
    async fn try_acquire(
        &self,
        key: &str,
        wait_timeout: Duration,
        lease_timeout: Duration,
    ) -> Result<LockGrant>;

    /// Releases a grant.
    ///
    /// Idempotent: releasing a grant that already expired or was
    /// already released is a no-op.
    async fn release(&self, grant: &LockGrant);
}
