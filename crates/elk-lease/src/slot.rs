//! Per-key lease transitions.
//!
//! Pure and synchronous: callers pass `now` and `ttl`, and serialize access
//! through the key's mutex in [`crate::LockTable`]. Each transition either
//! leaves the slot untouched or replaces it wholesale, so an observer never
//! sees a half-formed lease.

use chrono::{DateTime, Utc};
use elk_schemas::{LeaseToken, User};

use crate::{Acquired, Lease, LeaseError, LeaseKey};

#[derive(Debug, Default)]
pub(crate) struct Slot {
    lease: Option<Lease>,
}

impl Slot {
    pub(crate) fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lease.is_none()
    }

    pub(crate) fn acquire(
        &mut self,
        key: LeaseKey,
        holder: &User,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<Acquired, LeaseError> {
        if let Some(current) = self.lease.as_mut() {
            if current.is_active(now, ttl) {
                if current.is_held_by(holder) {
                    current.last_heartbeat = now;
                    return Ok(Acquired::Reentered(current.lease_token));
                }
                return Err(LeaseError::AlreadyLocked {
                    holder: current.holder.clone(),
                });
            }
        }
        // Empty, or an inactive lease the sweeper has not reached yet.
        let lease = Lease::new(key, holder.clone(), now);
        let token = lease.lease_token;
        self.lease = Some(lease);
        Ok(Acquired::Granted(token))
    }

    pub(crate) fn renew(&mut self, token: LeaseToken, now: DateTime<Utc>) -> Result<(), LeaseError> {
        match self.lease.as_mut() {
            Some(current) if current.lease_token == token => {
                current.last_heartbeat = now;
                Ok(())
            }
            _ => Err(LeaseError::Stale),
        }
    }

    /// Remove the lease if `holder` owns it.
    pub(crate) fn release(&mut self, holder: &User) -> Option<Lease> {
        if self.lease.as_ref().is_some_and(|l| l.is_held_by(holder)) {
            return self.lease.take();
        }
        None
    }

    /// Remove the lease if it has been silent for longer than `ttl`.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> Option<Lease> {
        if self.lease.as_ref().is_some_and(|l| l.is_expired(now, ttl)) {
            return self.lease.take();
        }
        None
    }
}
