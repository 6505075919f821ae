//! Coordinator: the lease manager wired to the presence channel.
//!
//! Every successful mutation of the lock table is followed by a snapshot
//! publish for the affected topic. Denials, re-entries and renewals do not
//! change any topic's holder set and publish nothing; a connection that may
//! have missed a snapshot gets one of its own through [`Coordinator::resync`].

use std::collections::BTreeSet;
use std::sync::Arc;

use elk_config::CoordinatorConfig;
use elk_lease::{Acquired, Clock, Lease, LeaseError, LeaseKey, LeaseManager, SystemClock};
use elk_schemas::{LeaseToken, LockSnapshot, RecordType, ServerMessage, User};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::presence::{PresenceChannel, SubscriberId};

pub struct Coordinator {
    leases: LeaseManager,
    presence: PresenceChannel,
}

impl Coordinator {
    pub fn new(leases: LeaseManager, presence: PresenceChannel) -> Self {
        Self { leases, presence }
    }

    pub fn from_config(cfg: &CoordinatorConfig) -> Self {
        Self::from_config_with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(cfg: &CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            LeaseManager::new(cfg.lease_ttl(), clock),
            PresenceChannel::new(cfg.presence.subscriber_buffer),
        )
    }

    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    pub async fn acquire(&self, key: LeaseKey, holder: &User) -> Result<Acquired, LeaseError> {
        let outcome = self.leases.acquire(key, holder).await;
        if matches!(outcome, Ok(Acquired::Granted(_))) {
            self.publish(key.record_type).await;
        }
        outcome
    }

    pub async fn renew(&self, key: LeaseKey, token: LeaseToken) -> Result<(), LeaseError> {
        self.leases.renew(key, token).await
    }

    pub async fn release(&self, key: LeaseKey, holder: &User) -> bool {
        let released = self.leases.release(key, holder).await;
        if released {
            self.publish(key.record_type).await;
        }
        released
    }

    /// One expiry sweep. Publishes once per topic that lost a lease.
    pub async fn sweep(&self) -> Vec<Lease> {
        let reclaimed = self.leases.sweep().await;
        let touched: BTreeSet<RecordType> = reclaimed.iter().map(|l| l.key.record_type).collect();
        for rt in touched {
            self.publish(rt).await;
        }
        reclaimed
    }

    pub async fn snapshot(&self, record_type: RecordType) -> LockSnapshot {
        self.leases.snapshot(record_type).await
    }

    /// Push the current snapshot of `record_type` to its subscribers.
    pub async fn publish(&self, record_type: RecordType) -> usize {
        self.presence
            .publish(record_type, || self.leases.snapshot(record_type))
            .await
    }

    pub async fn subscribe(
        &self,
        record_type: RecordType,
        id: SubscriberId,
        tx: mpsc::Sender<ServerMessage>,
    ) {
        self.presence
            .subscribe(record_type, id, tx, || self.leases.snapshot(record_type))
            .await
    }

    /// Send the current snapshot of `record_type` to one connection's queue.
    pub async fn resync(
        &self,
        record_type: RecordType,
        id: SubscriberId,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> bool {
        self.presence
            .resync(record_type, id, tx, || self.leases.snapshot(record_type))
            .await
    }

    /// Relay the external record-expiry job's notice to a topic.
    pub async fn expired_closed(&self, record_type: RecordType, payload: Value) -> usize {
        self.presence
            .broadcast(ServerMessage::ExpiredClosed {
                record_type,
                payload,
            })
            .await
    }

    /// Open a client connection. Messages pushed to it arrive on the
    /// returned receiver.
    pub fn open_connection(self: &Arc<Self>) -> (Connection, mpsc::Receiver<ServerMessage>) {
        let id = self.presence.next_subscriber_id();
        let (tx, rx) = self.presence.channel();
        (Connection::new(id, Arc::clone(self), tx), rx)
    }
}
