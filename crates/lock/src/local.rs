//! In-process lock manager implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{LockError, Result};
use crate::manager::{FencingToken, LockGrant, LockManager};

#[derive(Default)]
struct KeyState {
    /// Current holder's token and lease deadline, if any.
    holder: Option<(FencingToken, Instant)>,
    /// Last token issued for this key. Never reset, so tokens stay
    /// monotonic across holders.
    last_token: u64,
    notify: Arc<Notify>,
}

/// In-process [`LockManager`] backed by a per-key table.
///
/// Suitable for single-node deployments and tests. Waiters are woken
/// on release; an unreleased lock becomes free when its lease deadline
/// passes.
#[derive(Clone, Default)]
pub struct LocalLockManager {
    keys: Arc<Mutex<HashMap<String, KeyState>>>,
}

impl LocalLockManager {
    /// Creates a new lock manager with no held locks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is currently held by an unexpired grant.
    pub fn is_held(&self, key: &str) -> bool {
        let keys = self.keys.lock().unwrap();
        keys.get(key)
            .and_then(|s| s.holder)
            .is_some_and(|(_, lease_end)| Instant::now() < lease_end)
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn try_acquire(
        &self,
        key: &str,
        wait_timeout: Duration,
        lease_timeout: Duration,
    ) -> Result<LockGrant> {
        let started = Instant::now();
        let deadline = started + wait_timeout;

        loop {
            let (notify, holder_lease_end) = {
                let mut keys = self.keys.lock().unwrap();
                let state = keys.entry(key.to_string()).or_default();
                let now = Instant::now();

                let free = match state.holder {
                    None => true,
                    Some((_, lease_end)) => now >= lease_end,
                };

                if free {
                    state.last_token += 1;
                    let token = FencingToken::new(state.last_token);
                    let expires_at = now + lease_timeout;
                    state.holder = Some((token, expires_at));
                    return Ok(LockGrant::new(key.to_string(), token, expires_at));
                }

                let (_, lease_end) = state.holder.unwrap();
                (state.notify.clone(), lease_end)
            };

            let now = Instant::now();
            if now >= deadline {
                metrics::counter!("lock_wait_timeouts_total").increment(1);
                tracing::warn!(key, waited_ms = started.elapsed().as_millis(), "lock wait timed out");
                return Err(LockError::WaitTimeout {
                    key: key.to_string(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }

            // Wake on release, or when the current lease runs out,
            // whichever comes first (capped by our own wait deadline).
            let wake_at = deadline.min(holder_lease_end);
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(wake_at)) => {}
            }
        }
    }

    async fn release(&self, grant: &LockGrant) {
        let mut keys = self.keys.lock().unwrap();
        if let Some(state) = keys.get_mut(grant.key())
            && let Some((token, _)) = state.holder
            && token == grant.token()
        {
            state.holder = None;
            state.notify.notify_waiters();
        }
        // Anything else means the grant already expired or was released;
        // release is idempotent so there is nothing to do.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(200);
    const LEASE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locks = LocalLockManager::new();

        let grant = locks.try_acquire("seat:alpha", WAIT, LEASE).await.unwrap();
        assert!(locks.is_held("seat:alpha"));
        assert!(!grant.is_expired());

        locks.release(&grant).await;
        assert!(!locks.is_held("seat:alpha"));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let locks = LocalLockManager::new();

        let grant = locks.try_acquire("seat:alpha", WAIT, LEASE).await.unwrap();
        locks.release(&grant).await;
        locks.release(&grant).await;
        assert!(!locks.is_held("seat:alpha"));
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_contend() {
        let locks = LocalLockManager::new();

        let g1 = locks.try_acquire("seat:alpha", WAIT, LEASE).await.unwrap();
        let g2 = locks.try_acquire("seat:beta", WAIT, LEASE).await.unwrap();

        assert!(locks.is_held("seat:alpha"));
        assert!(locks.is_held("seat:beta"));

        locks.release(&g1).await;
        locks.release(&g2).await;
    }

    #[tokio::test]
    async fn test_wait_timeout_when_contended() {
        let locks = LocalLockManager::new();

        let _held = locks.try_acquire("seat:alpha", WAIT, LEASE).await.unwrap();

        let result = locks
            .try_acquire("seat:alpha", Duration::from_millis(50), LEASE)
            .await;
        assert!(matches!(result, Err(LockError::WaitTimeout { .. })));
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let locks = LocalLockManager::new();

        let held = locks.try_acquire("seat:alpha", WAIT, LEASE).await.unwrap();

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            locks2
                .try_acquire("seat:alpha", Duration::from_secs(2), LEASE)
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        locks.release(&held).await;

        let grant = waiter.await.unwrap().unwrap();
        assert!(grant.token() > held.token());
    }

    #[tokio::test]
    async fn test_lease_expiry_frees_the_lock() {
        let locks = LocalLockManager::new();

        let stale = locks
            .try_acquire("seat:alpha", WAIT, Duration::from_millis(30))
            .await
            .unwrap();

        // Never released; the lease runs out and a second caller gets in.
        let fresh = locks
            .try_acquire("seat:alpha", Duration::from_millis(500), LEASE)
            .await
            .unwrap();

        assert!(stale.is_expired());
        assert!(fresh.token() > stale.token());

        // Releasing the expired grant must not free the new holder's lock.
        locks.release(&stale).await;
        assert!(locks.is_held("seat:alpha"));
    }

    #[tokio::test]
    async fn test_fencing_tokens_increase_per_key() {
        let locks = LocalLockManager::new();
        let mut last = FencingToken::default();

        for _ in 0..5 {
            let grant = locks.try_acquire("seat:alpha", WAIT, LEASE).await.unwrap();
            assert!(grant.token() > last);
            last = grant.token();
            locks.release(&grant).await;
        }
    }
}
