//! In-memory authoritative map `(record_type, record_id) -> Lease`.
//!
//! Two levels of locking:
//! - the outer `std::sync::Mutex` guards only the key -> slot index and is
//!   never held across an `.await`;
//! - each slot has its own `tokio::sync::Mutex`, held for the duration of one
//!   lease transition.
//!
//! Slots are created on first acquire and removed by [`LockTable::compact`]
//! only when empty and unreferenced, so at most one slot ever exists per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use elk_schemas::RecordType;
use tokio::sync::Mutex as SlotMutex;

use crate::slot::Slot;
use crate::LeaseKey;

pub(crate) type SlotRef = Arc<SlotMutex<Slot>>;

#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<LeaseKey, SlotRef>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self) -> MutexGuard<'_, HashMap<LeaseKey, SlotRef>> {
        // The index holds no invariant a panicking holder could break halfway.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Slot for `key`, created empty if absent.
    pub(crate) fn slot(&self, key: LeaseKey) -> SlotRef {
        Arc::clone(self.index().entry(key).or_default())
    }

    /// Slot for `key` only if one exists.
    pub(crate) fn existing(&self, key: LeaseKey) -> Option<SlotRef> {
        self.index().get(&key).cloned()
    }

    /// All slots, optionally restricted to one record type, in key order.
    pub(crate) fn slots(&self, record_type: Option<RecordType>) -> Vec<(LeaseKey, SlotRef)> {
        let mut out: Vec<(LeaseKey, SlotRef)> = self
            .index()
            .iter()
            .filter(|(k, _)| record_type.map_or(true, |rt| k.record_type == rt))
            .map(|(k, s)| (*k, Arc::clone(s)))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }

    /// Drop empty slots nobody else references. Returns how many were dropped.
    ///
    /// With the index locked no new reference can be cloned out, and a strong
    /// count of one means no in-flight operation holds the slot, so its
    /// `try_lock` cannot fail.
    pub fn compact(&self) -> usize {
        let mut index = self.index();
        let before = index.len();
        index.retain(|_, slot| {
            let reclaimable = Arc::strong_count(slot) == 1
                && slot.try_lock().map(|s| s.is_empty()).unwrap_or(false);
            !reclaimable
        });
        before - index.len()
    }

    /// Number of slots currently indexed (including empty ones).
    pub fn slot_count(&self) -> usize {
        self.index().len()
    }
}
