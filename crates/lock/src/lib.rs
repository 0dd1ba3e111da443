//! Per-key mutual exclusion across process boundaries.
//!
//! A lock is granted for at most a lease duration, after which it is
//! considered free even if the holder never released it. Every grant
//! carries a fencing token that increases monotonically per key, so a
//! protected resource can reject writes made under a lease that has
//! since expired.
//!
//! [`LocalLockManager`] is the in-process implementation used for
//! single-node deployments and tests; the [`LockManager`] trait is the
//! seam for a networked lease-based implementation.

pub mod error;
pub mod local;
pub mod manager;

pub use error::LockError;
pub use local::LocalLockManager;
pub use manager::{FencingToken, LockGrant, LockManager};
