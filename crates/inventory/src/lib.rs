//! Per-event seat bookkeeping for the ticket booking system.
//!
//! The ledger is the single owner of `available_seats` for every event
//! key. All mutation is a read-modify-write performed under a lock
//! manager grant scoped to the key, which is what keeps seat counts
//! within `0..=total_seats` under concurrent multi-process callers.

pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::InventoryLedger;
