//! elk-schemas
//!
//! Value types shared by the lock coordinator, its client SDK, and the CLI.
//! Nothing here does IO or holds state; the wire unions in [`wire`] are the
//! only shape in which lock traffic crosses a process boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod wire;

pub use wire::{ClientMessage, Envelope, ServerMessage, WireError};

/// Business record identifier as issued by the record store.
pub type RecordId = i64;

// ---------------------------------------------------------------------------
// RecordType
// ---------------------------------------------------------------------------

/// Kinds of records that can be edit-locked. Each kind doubles as a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Estimate,
    Invoice,
}

impl RecordType {
    pub const ALL: [RecordType; 2] = [RecordType::Estimate, RecordType::Invoice];

    /// Singular name used in edit events (`start_edit_estimate`).
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Estimate => "estimate",
            RecordType::Invoice => "invoice",
        }
    }

    /// Topic name used for subscriptions and broadcasts (`locked_estimates`).
    pub fn topic(&self) -> &'static str {
        match self {
            RecordType::Estimate => "estimates",
            RecordType::Invoice => "invoices",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rt| rt.as_str() == s)
    }

    pub fn from_topic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rt| rt.topic() == s)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// External identity as issued by the auth service. Consumed, never owned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub role: String,
}

// ---------------------------------------------------------------------------
// LeaseToken
// ---------------------------------------------------------------------------

/// Opaque proof of lease ownership, handed out by a successful acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// LockSnapshot
// ---------------------------------------------------------------------------

/// Full lock state of one topic: `record_id -> holder`.
///
/// Ordered so that two snapshots of the same table serialize identically.
pub type LockSnapshot = BTreeMap<RecordId, User>;
