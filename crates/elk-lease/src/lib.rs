//! elk-lease
//!
//! Lock Table + Lease Manager for record edit locks.
//!
//! Architectural decisions:
//! - At most one lease per `(record_type, record_id)`; first acquirer wins,
//!   everyone else is told who holds it. No queueing.
//! - Every operation on one key runs under that key's own mutex, so
//!   acquire / renew / release / expire on a key are totally ordered while
//!   unrelated keys never contend.
//! - Liveness is heartbeat-driven: a lease is active while
//!   `now - last_heartbeat < ttl`. Nothing here runs a timer; the daemon's
//!   sweeper calls [`LeaseManager::sweep`].
//! - Time comes from an injected [`Clock`]; no wall-clock reads elsewhere.
//! - State is soft: nothing is persisted, a restart starts empty.

mod clock;
mod error;
mod lease;
mod manager;
mod slot;
mod table;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LeaseError;
pub use lease::{Acquired, Lease, LeaseKey};
pub use manager::LeaseManager;
pub use table::LockTable;
