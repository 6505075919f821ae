//! Lease Manager: serializes acquire / renew / release / expire per key.
//!
//! Every operation follows the same path: look up the key's slot, lock it,
//! read the clock, apply one [`Slot`](crate::slot::Slot) transition, unlock.
//! Reading the clock inside the slot lock is what makes the sweeper's
//! re-check race-free against an in-flight renew.

use std::sync::Arc;
use std::time::Duration;

use elk_schemas::{LeaseToken, LockSnapshot, RecordType, User};
use tracing::{debug, info};

use crate::clock::to_delta;
use crate::{Acquired, Clock, Lease, LeaseError, LeaseKey, LockTable, SystemClock};

pub struct LeaseManager {
    table: LockTable,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LeaseManager {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: LockTable::new(),
            clock,
            ttl,
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_delta(&self) -> chrono::Duration {
        to_delta(self.ttl)
    }

    /// Acquire the edit lease on `key` for `holder`.
    ///
    /// Re-acquiring an active lease you already hold refreshes it and returns
    /// the existing token. Anyone else gets [`LeaseError::AlreadyLocked`].
    pub async fn acquire(&self, key: LeaseKey, holder: &User) -> Result<Acquired, LeaseError> {
        let slot = self.table.slot(key);
        let mut slot = slot.lock().await;
        let now = self.clock.now();
        let outcome = slot.acquire(key, holder, now, self.ttl_delta());
        match &outcome {
            Ok(Acquired::Granted(_)) => {
                info!(%key, holder_id = holder.id, "lease granted");
            }
            Ok(Acquired::Reentered(_)) => {
                debug!(%key, holder_id = holder.id, "lease re-entered by holder");
            }
            Err(LeaseError::AlreadyLocked { holder: current }) => {
                debug!(%key, holder_id = holder.id, current_holder_id = current.id, "lease denied");
            }
            Err(LeaseError::Stale) => {}
        }
        outcome
    }

    /// Record a heartbeat for the lease identified by `token`.
    pub async fn renew(&self, key: LeaseKey, token: LeaseToken) -> Result<(), LeaseError> {
        let Some(slot) = self.table.existing(key) else {
            debug!(%key, "renew against unknown key");
            return Err(LeaseError::Stale);
        };
        let mut slot = slot.lock().await;
        let now = self.clock.now();
        let outcome = slot.renew(token, now);
        if outcome.is_err() {
            debug!(%key, "renew with stale token");
        }
        outcome
    }

    /// Release `key` if `holder` owns it. Returns whether a lease was removed.
    pub async fn release(&self, key: LeaseKey, holder: &User) -> bool {
        let Some(slot) = self.table.existing(key) else {
            return false;
        };
        let mut slot = slot.lock().await;
        let released = slot.release(holder).is_some();
        if released {
            info!(%key, holder_id = holder.id, "lease released");
        }
        released
    }

    /// Reclaim `key` if its lease has been silent for longer than the TTL.
    pub async fn expire(&self, key: LeaseKey) -> Option<Lease> {
        let slot = self.table.existing(key)?;
        let mut slot = slot.lock().await;
        let now = self.clock.now();
        let reclaimed = slot.expire(now, self.ttl_delta());
        if let Some(lease) = &reclaimed {
            info!(
                %key,
                holder_id = lease.holder.id,
                silent_ms = lease.silence(now).num_milliseconds(),
                "lease expired"
            );
        }
        reclaimed
    }

    /// One sweep pass: try to expire every key, then compact empty slots.
    ///
    /// Each key is re-checked under its own lock, so a renew that lands
    /// between listing and expiring keeps its lease.
    pub async fn sweep(&self) -> Vec<Lease> {
        let mut reclaimed = Vec::new();
        for (key, _) in self.table.slots(None) {
            if let Some(lease) = self.expire(key).await {
                reclaimed.push(lease);
            }
        }
        self.table.compact();
        reclaimed
    }

    /// Current lease for `key`, if any (active or awaiting sweep).
    pub async fn lease(&self, key: LeaseKey) -> Option<Lease> {
        let slot = self.table.existing(key)?;
        let slot = slot.lock().await;
        slot.lease().cloned()
    }

    /// Every lease of one record type, keyed by record id.
    ///
    /// Each key is read under its own lock, so no key can ever show two
    /// holders.
    pub async fn snapshot(&self, record_type: RecordType) -> LockSnapshot {
        let mut out = LockSnapshot::new();
        for (key, slot) in self.table.slots(Some(record_type)) {
            let slot = slot.lock().await;
            if let Some(lease) = slot.lease() {
                out.insert(key.record_id, lease.holder.clone());
            }
        }
        out
    }

    /// Number of leases of one record type, active or awaiting sweep.
    pub async fn lease_count(&self, record_type: RecordType) -> usize {
        let mut count = 0;
        for (_, slot) in self.table.slots(Some(record_type)) {
            if !slot.lock().await.is_empty() {
                count += 1;
            }
        }
        count
    }

    pub fn table(&self) -> &LockTable {
        &self.table
    }
}
