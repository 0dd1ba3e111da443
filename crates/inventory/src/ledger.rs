//! The seat reservation ledger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::EventKey;
use lock::{FencingToken, LockGrant, LockManager};
use tokio::sync::RwLock;

use crate::error::{LedgerError, Result};

/// Lock key prefix, mirroring the keyspace used by the lock manager.
const LOCK_KEY_PREFIX: &str = "inventory:lock:";

#[derive(Debug, Clone)]
struct SeatRecord {
    total_seats: u32,
    available_seats: u32,
    /// Token of the last committed write, used to fence out holders
    /// whose lease expired mid-operation.
    last_write: FencingToken,
}

/// Seat bookkeeping for bookable events, guarded by a [`LockManager`].
///
/// Both `reserve` and `release` read and commit under the same lock
/// grant, so `0 <= available_seats <= total_seats` holds at every
/// observable instant even with concurrent callers.
#[derive(Clone)]
pub struct InventoryLedger<L: LockManager + Clone> {
    locks: L,
    records: Arc<RwLock<HashMap<EventKey, SeatRecord>>>,
    wait_timeout: Duration,
    lease_timeout: Duration,
}

impl<L: LockManager + Clone> InventoryLedger<L> {
    /// Creates a ledger using the given lock manager and lock timeouts.
    pub fn new(locks: L, wait_timeout: Duration, lease_timeout: Duration) -> Self {
        Self {
            locks,
            records: Arc::new(RwLock::new(HashMap::new())),
            wait_timeout,
            lease_timeout,
        }
    }

    /// Registers a new event with the given seat capacity.
    ///
    /// All seats start available. Fails if the key is already
    /// registered or the capacity is zero.
    pub async fn create_record(&self, key: EventKey, total_seats: u32) -> Result<()> {
        if total_seats == 0 {
            return Err(LedgerError::InvalidCapacity);
        }

        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(LedgerError::DuplicateEvent(key));
        }

        tracing::info!(event_key = %key, total_seats, "inventory record created");
        records.insert(
            key,
            SeatRecord {
                total_seats,
                available_seats: total_seats,
                last_write: FencingToken::default(),
            },
        );
        Ok(())
    }

    /// Reserves `quantity` seats for the event.
    ///
    /// Returns `Ok(true)` and decrements availability if enough seats
    /// remain, `Ok(false)` without mutation otherwise. Errs only on
    /// caller mistakes (zero quantity, unknown key) or technical
    /// failure to take the lock.
    pub async fn reserve(&self, key: &EventKey, quantity: u32) -> Result<bool> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }

        let grant = self.acquire(key).await?;
        let outcome = self
            .commit(key, &grant, |record| {
                if record.available_seats >= quantity {
                    record.available_seats -= quantity;
                    true
                } else {
                    false
                }
            })
            .await;
        self.locks.release(&grant).await;

        match &outcome {
            Ok(true) => {
                metrics::counter!("inventory_reservations_total").increment(1);
                tracing::info!(event_key = %key, quantity, "seats reserved");
            }
            Ok(false) => {
                tracing::info!(event_key = %key, quantity, "reservation rejected, insufficient seats");
            }
            Err(_) => {}
        }
        outcome
    }

    /// Releases `quantity` previously reserved seats.
    ///
    /// Returns `Ok(false)` without mutation if the release would push
    /// availability above capacity, which guards against duplicate or
    /// malformed compensation calls.
    pub async fn release(&self, key: &EventKey, quantity: u32) -> Result<bool> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }

        let grant = self.acquire(key).await?;
        let outcome = self
            .commit(key, &grant, |record| {
                // checked_add keeps an absurd quantity from wrapping
                // past u32::MAX and slipping under the capacity check.
                match record.available_seats.checked_add(quantity) {
                    Some(new_available) if new_available <= record.total_seats => {
                        record.available_seats = new_available;
                        true
                    }
                    _ => false,
                }
            })
            .await;
        self.locks.release(&grant).await;

        match &outcome {
            Ok(true) => {
                metrics::counter!("inventory_releases_total").increment(1);
                tracing::info!(event_key = %key, quantity, "seats released");
            }
            Ok(false) => {
                tracing::warn!(event_key = %key, quantity, "release rejected, would exceed capacity");
            }
            Err(_) => {}
        }
        outcome
    }

    /// Returns the currently available seats for the event.
    ///
    /// A read-only observation; callers that intend to mutate must go
    /// through `reserve`/`release` instead of reading then writing.
    pub async fn available_seats(&self, key: &EventKey) -> Result<u32> {
        let records = self.records.read().await;
        records
            .get(key)
            .map(|r| r.available_seats)
            .ok_or_else(|| LedgerError::UnknownEvent(key.clone()))
    }

    /// Returns the fixed seat capacity for the event.
    pub async fn total_seats(&self, key: &EventKey) -> Result<u32> {
        let records = self.records.read().await;
        records
            .get(key)
            .map(|r| r.total_seats)
            .ok_or_else(|| LedgerError::UnknownEvent(key.clone()))
    }

    async fn acquire(&self, key: &EventKey) -> Result<LockGrant> {
        let lock_key = format!("{LOCK_KEY_PREFIX}{key}");
        self.locks
            .try_acquire(&lock_key, self.wait_timeout, self.lease_timeout)
            .await
            .map_err(|source| {
                metrics::counter!("inventory_lock_contention_total").increment(1);
                LedgerError::Contended {
                    key: key.clone(),
                    source,
                }
            })
    }

    /// Applies `mutate` to the record and commits it under `grant`.
    ///
    /// Rejects the write if the grant's lease already expired or its
    /// token is older than the last committed write for the key.
    async fn commit<F>(&self, key: &EventKey, grant: &LockGrant, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut SeatRecord) -> bool,
    {
        if grant.is_expired() {
            return Err(LedgerError::StaleGrant(key.clone()));
        }

        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| LedgerError::UnknownEvent(key.clone()))?;

        if grant.token() < record.last_write {
            tracing::warn!(event_key = %key, token = %grant.token(), "fenced out stale write");
            return Err(LedgerError::StaleGrant(key.clone()));
        }

        let applied = mutate(record);
        if applied {
            record.last_write = grant.token();
        }
        Ok(applied)
    }
}
