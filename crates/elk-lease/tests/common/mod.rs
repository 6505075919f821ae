#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use elk_lease::{LeaseManager, ManualClock};
use elk_schemas::User;

pub const TTL: Duration = Duration::from_secs(15);
pub const HEARTBEAT: Duration = Duration::from_secs(5);

pub fn user(id: i64) -> User {
    User {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        fullname: format!("User Number {id}"),
        role: "staff".to_string(),
    }
}

/// Manager on a manual clock starting at the epoch.
pub fn manual_manager() -> (Arc<LeaseManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let mgr = Arc::new(LeaseManager::new(TTL, clock.clone()));
    (mgr, clock)
}
