//! Lock List View: a record list's reconciled picture of who is editing what.
//!
//! Every `locked_<type>s` snapshot replaces the map wholesale. An
//! `expired_<type>s_closed` notice means the record set itself changed and
//! the list should be fetched again; the view only raises a flag for that.

use elk_schemas::{LockSnapshot, RecordId, RecordType, ServerMessage, User};

#[derive(Debug, Clone)]
pub struct LockListView {
    record_type: RecordType,
    holders: LockSnapshot,
    needs_refetch: bool,
}

impl LockListView {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            holders: LockSnapshot::new(),
            needs_refetch: false,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Apply a server message. Returns `false` for other topics.
    pub fn apply(&mut self, msg: &ServerMessage) -> bool {
        if msg.record_type() != self.record_type {
            return false;
        }
        match msg {
            ServerMessage::Locked { holders, .. } => self.holders = holders.clone(),
            ServerMessage::ExpiredClosed { .. } => self.needs_refetch = true,
        }
        true
    }

    pub fn locked_by(&self, record_id: RecordId) -> Option<&User> {
        self.holders.get(&record_id)
    }

    /// True when someone other than `me` holds the record.
    pub fn is_read_only(&self, record_id: RecordId, me: &User) -> bool {
        self.locked_by(record_id).is_some_and(|h| h.id != me.id)
    }

    pub fn holders(&self) -> &LockSnapshot {
        &self.holders
    }

    pub fn needs_refetch(&self) -> bool {
        self.needs_refetch
    }

    /// Read and clear the refetch flag.
    pub fn take_refetch(&mut self) -> bool {
        std::mem::take(&mut self.needs_refetch)
    }
}
