//! Presence Channel: per-topic fan-out of lock snapshots.
//!
//! A subscriber is a delivery address (bounded `mpsc::Sender`) registered
//! under a topic with a [`SubscriberId`]. One WebSocket connection uses the
//! same id and sender for every topic it listens to.
//!
//! Each topic has a publish lock. The snapshot for a fan-out is computed
//! while holding it, so deliveries on one topic go out in the order the
//! snapshots were taken and a subscriber never sees an older snapshot after
//! a newer one. The subscriber index itself sits behind a plain mutex that is
//! never held across an `.await`, which lets disconnect paths unsubscribe
//! synchronously (including from `Drop`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use elk_schemas::{LockSnapshot, RecordType, ServerMessage};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

pub type SubscriberId = u64;

type Subscribers = HashMap<SubscriberId, mpsc::Sender<ServerMessage>>;

struct TopicChannel {
    publish: tokio::sync::Mutex<()>,
    subscribers: Mutex<Subscribers>,
}

impl TopicChannel {
    fn new() -> Self {
        Self {
            publish: tokio::sync::Mutex::new(()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct PresenceChannel {
    estimates: TopicChannel,
    invoices: TopicChannel,
    next_id: AtomicU64,
    buffer: usize,
}

impl PresenceChannel {
    /// `buffer` is the outbound queue depth callers should use for
    /// subscriber channels (see [`PresenceChannel::channel`]).
    pub fn new(buffer: usize) -> Self {
        Self {
            estimates: TopicChannel::new(),
            invoices: TopicChannel::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    fn topic(&self, record_type: RecordType) -> &TopicChannel {
        match record_type {
            RecordType::Estimate => &self.estimates,
            RecordType::Invoice => &self.invoices,
        }
    }

    pub fn next_subscriber_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// A fresh delivery queue sized for this channel.
    pub fn channel(&self) -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(self.buffer)
    }

    /// Register `tx` under `record_type` and send it `current()` as its first
    /// message. Re-subscribing an id replaces its sender.
    pub async fn subscribe<F, Fut>(
        &self,
        record_type: RecordType,
        id: SubscriberId,
        tx: mpsc::Sender<ServerMessage>,
        current: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LockSnapshot>,
    {
        let topic = self.topic(record_type);
        let _order = topic.publish.lock().await;
        let holders = current().await;
        let first = ServerMessage::Locked {
            record_type,
            holders,
        };
        match tx.try_send(first) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    subscriber_id = id,
                    topic = record_type.topic(),
                    "subscriber queue full; first snapshot dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber_id = id, topic = record_type.topic(), "subscriber gone before first snapshot");
                return;
            }
        }
        topic.subscribers().insert(id, tx);
        info!(subscriber_id = id, topic = record_type.topic(), "subscribed");
    }

    pub fn unsubscribe(&self, record_type: RecordType, id: SubscriberId) -> bool {
        let removed = self.topic(record_type).subscribers().remove(&id).is_some();
        if removed {
            info!(subscriber_id = id, topic = record_type.topic(), "unsubscribed");
        }
        removed
    }

    /// Remove `id` from every topic (transport disconnect).
    pub fn unsubscribe_all(&self, id: SubscriberId) {
        for rt in RecordType::ALL {
            self.unsubscribe(rt, id);
        }
    }

    /// Push the snapshot produced by `current()` to every subscriber of the
    /// topic. Returns how many subscribers accepted it.
    pub async fn publish<F, Fut>(&self, record_type: RecordType, current: F) -> usize
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LockSnapshot>,
    {
        let topic = self.topic(record_type);
        let _order = topic.publish.lock().await;
        let holders = current().await;
        let lease_count = holders.len();
        let delivered = fan_out(
            record_type,
            topic,
            ServerMessage::Locked {
                record_type,
                holders,
            },
        );
        debug!(topic = record_type.topic(), lease_count, delivered, "snapshot published");
        delivered
    }

    /// Send the snapshot produced by `current()` to one subscriber only.
    /// Ordered with publishes on the topic like any other delivery. Returns
    /// whether the queue accepted it.
    pub async fn resync<F, Fut>(
        &self,
        record_type: RecordType,
        id: SubscriberId,
        tx: &mpsc::Sender<ServerMessage>,
        current: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LockSnapshot>,
    {
        let topic = self.topic(record_type);
        let _order = topic.publish.lock().await;
        let holders = current().await;
        match tx.try_send(ServerMessage::Locked {
            record_type,
            holders,
        }) {
            Ok(()) => {
                debug!(subscriber_id = id, topic = record_type.topic(), "snapshot resent");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    subscriber_id = id,
                    topic = record_type.topic(),
                    "subscriber queue full; resync dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Push a message that is not derived from the lock table (for example
    /// `expired_<type>s_closed`), ordered with snapshots on the same topic.
    pub async fn broadcast(&self, msg: ServerMessage) -> usize {
        let record_type = msg.record_type();
        let topic = self.topic(record_type);
        let _order = topic.publish.lock().await;
        fan_out(record_type, topic, msg)
    }

    pub fn subscriber_count(&self, record_type: RecordType) -> usize {
        self.topic(record_type).subscribers().len()
    }
}

fn fan_out(record_type: RecordType, topic: &TopicChannel, msg: ServerMessage) -> usize {
    let mut subscribers = topic.subscribers();
    let mut delivered = 0;
    subscribers.retain(|id, tx| match tx.try_send(msg.clone()) {
        Ok(()) => {
            delivered += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            warn!(
                subscriber_id = *id,
                topic = record_type.topic(),
                "subscriber queue full; dropping message"
            );
            true
        }
        Err(TrySendError::Closed(_)) => {
            info!(subscriber_id = *id, topic = record_type.topic(), "pruned closed subscriber");
            false
        }
    });
    delivered
}
