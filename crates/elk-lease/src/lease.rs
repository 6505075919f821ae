use std::fmt;

use chrono::{DateTime, Utc};
use elk_schemas::{LeaseToken, RecordId, RecordType, User};

// ---------------------------------------------------------------------------
// LeaseKey
// ---------------------------------------------------------------------------

/// Identity of a lockable record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseKey {
    pub record_type: RecordType,
    pub record_id: RecordId,
}

impl LeaseKey {
    pub fn new(record_type: RecordType, record_id: RecordId) -> Self {
        Self {
            record_type,
            record_id,
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.record_type, self.record_id)
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// Time-bounded exclusive edit claim on one record.
///
/// Values handed out by the manager are copies; the only mutable instance
/// lives inside the lock table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    pub key: LeaseKey,
    /// Fixed for the lease's lifetime.
    pub holder: User,
    pub lease_token: LeaseToken,
    pub acquired_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl Lease {
    pub(crate) fn new(key: LeaseKey, holder: User, now: DateTime<Utc>) -> Self {
        Self {
            key,
            holder,
            lease_token: LeaseToken::generate(),
            acquired_at: now,
            last_heartbeat: now,
        }
    }

    /// Time since the last heartbeat.
    pub fn silence(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_heartbeat
    }

    /// Active iff `now - last_heartbeat < ttl`.
    pub fn is_active(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.silence(now) < ttl
    }

    /// Reclaimable iff `now - last_heartbeat > ttl`.
    ///
    /// A lease at exactly `ttl` of silence is neither active nor reclaimable:
    /// any acquirer may replace it, but the sweeper leaves it for the next tick.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.silence(now) > ttl
    }

    pub fn is_held_by(&self, user: &User) -> bool {
        self.holder.id == user.id
    }
}

// ---------------------------------------------------------------------------
// Acquired
// ---------------------------------------------------------------------------

/// Successful acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// A new lease was created; the topic's snapshot changed.
    Granted(LeaseToken),
    /// The caller already held an active lease; it was refreshed and its
    /// existing token returned. The snapshot did not change.
    Reentered(LeaseToken),
}

impl Acquired {
    pub fn token(&self) -> LeaseToken {
        match self {
            Acquired::Granted(t) | Acquired::Reentered(t) => *t,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Acquired::Granted(_))
    }
}
