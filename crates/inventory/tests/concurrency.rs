//! Concurrency tests for the inventory ledger.
//!
//! These exercise the no-oversell guarantee: with many tasks reserving
//! at once, the seats handed out never exceed what was available, and
//! the capacity invariant holds after every call.

use std::time::Duration;

use common::EventKey;
use inventory::InventoryLedger;
use lock::LocalLockManager;

const WAIT: Duration = Duration::from_secs(5);
const LEASE: Duration = Duration::from_secs(5);

fn ledger() -> InventoryLedger<LocalLockManager> {
    InventoryLedger::new(LocalLockManager::new(), WAIT, LEASE)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reserves_never_oversell() {
    let ledger = ledger();
    let key = EventKey::new("stadium-final");
    ledger.create_record(key.clone(), 10).await.unwrap();

    // 8 tasks each want 2 seats: 16 requested, only 10 available.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        let key = key.clone();
        handles.push(tokio::spawn(
            async move { ledger.reserve(&key, 2).await.unwrap() },
        ));
    }

    let mut granted = 0u32;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 2;
        }
    }

    // Exactly 5 of the 8 requests fit.
    assert_eq!(granted, 10);
    assert_eq!(ledger.available_seats(&key).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_capacity_invariant_under_mixed_reserve_release() {
    let ledger = ledger();
    let key = EventKey::new("arena-show");
    ledger.create_record(key.clone(), 50).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let quantity = (i % 5) + 1;
            if ledger.reserve(&key, quantity).await.unwrap() {
                // Give some of it back, some tasks keep their seats.
                if i % 2 == 0 {
                    assert!(ledger.release(&key, quantity).await.unwrap());
                }
            }
            let available = ledger.available_seats(&key).await.unwrap();
            assert!(available <= 50);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let available = ledger.available_seats(&key).await.unwrap();
    assert!(available <= 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_seat_contention_is_first_come_first_served() {
    let ledger = ledger();
    let key = EventKey::new("last-seat");
    ledger.create_record(key.clone(), 1).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        let key = key.clone();
        handles.push(tokio::spawn(
            async move { ledger.reserve(&key, 1).await.unwrap() },
        ));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(ledger.available_seats(&key).await.unwrap(), 0);
}
