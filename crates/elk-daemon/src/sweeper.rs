//! Expiry Sweeper: periodic reclamation of leases whose holder stopped
//! heartbeating.
//!
//! The sweeper takes the same per-key path as client operations (see
//! [`elk_lease::LeaseManager::sweep`]), so a renew racing a sweep either lands
//! first and keeps the lease or lands second and gets `Stale`.

use std::sync::Arc;
use std::time::Duration;

use elk_lease::Lease;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::coordinator::Coordinator;

/// Run one sweep and publish snapshots for affected topics.
pub async fn sweep_once(coordinator: &Coordinator) -> Vec<Lease> {
    let reclaimed = coordinator.sweep().await;
    if !reclaimed.is_empty() {
        info!(reclaimed = reclaimed.len(), "sweep reclaimed expired leases");
    }
    reclaimed
}

/// Spawn a background task that sweeps every `interval`.
///
/// A slow sweep delays the next tick rather than bunching ticks up.
pub fn spawn_expiry_sweeper(coordinator: Arc<Coordinator>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&coordinator).await;
        }
    })
}
