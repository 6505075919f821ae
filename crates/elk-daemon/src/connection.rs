//! Server side of one client connection.
//!
//! The connection remembers the lease token it obtained per record, so a
//! heartbeat only has to name the record. Closing a connection unsubscribes
//! it from every topic and deliberately leaves its leases alone: a browser
//! reload closes the socket and reconnects within a heartbeat or two, and
//! releasing on close would hand the record to someone else in between.
//! Leases of connections that never come back are reclaimed by the sweeper.
//!
//! A re-entered `start_edit`, a denial and a stale heartbeat change nothing on
//! the server, so no publish follows them. Each of those means the client's
//! view may be behind (a snapshot dropped on a full queue, or one that raced
//! the request), so the connection is sent the current snapshot of the topic
//! directly when it listens on that topic.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use elk_lease::{Acquired, LeaseError, LeaseKey};
use elk_schemas::{ClientMessage, LeaseToken, RecordType, ServerMessage, User};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::coordinator::Coordinator;
use crate::presence::SubscriberId;

/// What a dispatched message did. Nothing is sent back to the client; the
/// outcome is observable through the next snapshot. Tests and logs use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Acquired(Acquired),
    Denied { holder: User },
    Renewed,
    Stale,
    Released,
    NotHolder,
    Subscribed,
}

pub struct Connection {
    id: SubscriberId,
    coordinator: Arc<Coordinator>,
    outbound: mpsc::Sender<ServerMessage>,
    tokens: HashMap<LeaseKey, LeaseToken>,
    topics: BTreeSet<RecordType>,
}

impl Connection {
    pub(crate) fn new(
        id: SubscriberId,
        coordinator: Arc<Coordinator>,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        info!(connection_id = id, "connection opened");
        Self {
            id,
            coordinator,
            outbound,
            tokens: HashMap::new(),
            topics: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn token_for(&self, key: LeaseKey) -> Option<LeaseToken> {
        self.tokens.get(&key).copied()
    }

    pub async fn handle(&mut self, msg: ClientMessage) -> Outcome {
        match msg {
            ClientMessage::StartEdit {
                record_type,
                record_id,
                user,
            } => {
                let key = LeaseKey::new(record_type, record_id);
                let outcome = match self.coordinator.acquire(key, &user).await {
                    Ok(acquired) => {
                        self.tokens.insert(key, acquired.token());
                        Outcome::Acquired(acquired)
                    }
                    Err(LeaseError::AlreadyLocked { holder }) => {
                        self.tokens.remove(&key);
                        Outcome::Denied { holder }
                    }
                    Err(LeaseError::Stale) => Outcome::Stale,
                };
                if !matches!(outcome, Outcome::Acquired(Acquired::Granted(_))) {
                    self.resync(record_type).await;
                }
                outcome
            }
            ClientMessage::Heartbeat {
                record_type,
                record_id,
            } => {
                let key = LeaseKey::new(record_type, record_id);
                let Some(token) = self.tokens.get(&key).copied() else {
                    debug!(connection_id = self.id, %key, "heartbeat without a lease on this connection");
                    self.resync(record_type).await;
                    return Outcome::Stale;
                };
                match self.coordinator.renew(key, token).await {
                    Ok(()) => Outcome::Renewed,
                    Err(_) => {
                        self.tokens.remove(&key);
                        self.resync(record_type).await;
                        Outcome::Stale
                    }
                }
            }
            ClientMessage::StopEdit {
                record_type,
                record_id,
                user,
            } => {
                let key = LeaseKey::new(record_type, record_id);
                self.tokens.remove(&key);
                if self.coordinator.release(key, &user).await {
                    Outcome::Released
                } else {
                    Outcome::NotHolder
                }
            }
            ClientMessage::StartListening { record_type } => {
                self.coordinator
                    .subscribe(record_type, self.id, self.outbound.clone())
                    .await;
                self.topics.insert(record_type);
                Outcome::Subscribed
            }
        }
    }

    async fn resync(&self, record_type: RecordType) {
        if self.topics.contains(&record_type) {
            self.coordinator
                .resync(record_type, self.id, &self.outbound)
                .await;
        }
    }

    /// Transport went away: stop deliveries. Leases are left to expire.
    pub fn close(self) {
        self.coordinator.presence().unsubscribe_all(self.id);
        info!(
            connection_id = self.id,
            held_leases = self.tokens.len(),
            topics = self.topics.len(),
            "connection closed"
        );
    }
}
