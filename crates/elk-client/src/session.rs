//! Edit Session: the client side of one open edit view.
//!
//! # State diagram
//!
//! ```text
//!   enter()            snapshot: me            leave()
//!   Idle ──► Acquiring ──────────────► Held ──────────► Releasing ──► Idle
//!               │  ▲                   ▲ │  │
//!   snapshot:   │  └── snapshot: none ─┼─┘  │ snapshot: other
//!     other     ▼                      │    ▼
//!            Denied { holder } ◄───────┼────┘
//!               │  └── snapshot: me ───┘
//!               │ leave()
//!               └──────────────────────────────────► Releasing ──► Idle
//! ```
//!
//! The coordinator never replies to `start_edit`; the session learns the
//! outcome from the next `locked_<type>s` snapshot. A `Held` session whose
//! record drops out of the snapshot was reaped by the sweeper and quietly
//! asks for the lease again. `Denied` never asks again on its own, but a
//! snapshot naming this user moves it to `Held`: the subscribe snapshot can
//! name a holder whose lease lapses or is released before our `start_edit`
//! lands, and the grant that follows is ours to keep.
//!
//! While the session is entered, a timer fires every heartbeat interval:
//! `Held` sends a heartbeat, `Acquiring` re-sends `start_edit`. Send failures
//! are logged at debug and otherwise ignored; the next tick tries again.
//!
//! Dropping a session stops the timer and sends nothing. That is the page
//! reload path: the lease lapses on its own once heartbeats stop.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use elk_schemas::{ClientMessage, RecordId, RecordType, ServerMessage, User};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::transport::Transport;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// `start_edit` sent; waiting for a snapshot that names the holder.
    Acquiring,
    /// This user holds the lease; heartbeats are flowing.
    Held,
    /// Someone else holds the record. Render read-only.
    Denied { holder: User },
    /// Transient while `leave()` runs.
    Releasing,
}

/// Where a snapshot moves the session, given who it lists for our record.
fn next_state(state: &SessionState, me: &User, holder: Option<&User>) -> SessionState {
    match (state, holder) {
        (
            SessionState::Acquiring | SessionState::Held | SessionState::Denied { .. },
            Some(h),
        ) if h.id == me.id => SessionState::Held,
        (SessionState::Acquiring, Some(h)) | (SessionState::Held, Some(h)) => {
            SessionState::Denied { holder: h.clone() }
        }
        (SessionState::Held, None) => SessionState::Acquiring,
        (other, _) => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Shared core (session + timer task)
// ---------------------------------------------------------------------------

struct Shared {
    record_type: RecordType,
    record_id: RecordId,
    me: User,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_edit(&self) -> ClientMessage {
        ClientMessage::StartEdit {
            record_type: self.record_type,
            record_id: self.record_id,
            user: self.me.clone(),
        }
    }

    async fn send(&self, msg: ClientMessage) {
        let event = msg.event_name();
        if let Err(e) = self.transport.send(msg).await {
            debug!(%event, record_id = self.record_id, error = %e, "send failed; will retry on next tick");
        }
    }

    async fn tick(&self) {
        let msg = match *self.state() {
            SessionState::Held => Some(ClientMessage::Heartbeat {
                record_type: self.record_type,
                record_id: self.record_id,
            }),
            SessionState::Acquiring => Some(self.start_edit()),
            _ => None,
        };
        if let Some(msg) = msg {
            self.send(msg).await;
        }
    }
}

fn spawn_timer(shared: Arc<Shared>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            shared.tick().await;
        }
    })
}

// ---------------------------------------------------------------------------
// EditSession
// ---------------------------------------------------------------------------

pub struct EditSession {
    shared: Arc<Shared>,
    heartbeat_interval: Duration,
    timer: Option<JoinHandle<()>>,
}

impl EditSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        record_type: RecordType,
        record_id: RecordId,
        me: User,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                record_type,
                record_id,
                me,
                transport,
                state: Mutex::new(SessionState::Idle),
            }),
            heartbeat_interval,
            timer: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state().clone()
    }

    /// Read-only banner text while denied.
    pub fn banner(&self) -> Option<String> {
        match &*self.shared.state() {
            SessionState::Denied { holder } => {
                Some(format!("being edited by {}", holder.fullname))
            }
            _ => None,
        }
    }

    /// Open the edit view: subscribe to the topic, ask for the lease and
    /// start the timer. A no-op unless the session is `Idle`.
    pub async fn enter(&mut self) {
        {
            let mut state = self.shared.state();
            if *state != SessionState::Idle {
                return;
            }
            *state = SessionState::Acquiring;
        }
        let s = &self.shared;
        info!(topic = s.record_type.topic(), record_id = s.record_id, "entering edit view");
        s.send(ClientMessage::StartListening {
            record_type: s.record_type,
        })
        .await;
        s.send(s.start_edit()).await;
        self.timer = Some(spawn_timer(Arc::clone(s), self.heartbeat_interval));
    }

    /// Feed a message from the transport. Messages for other topics or
    /// records are ignored. Returns the state after the message.
    pub async fn on_server_message(&self, msg: &ServerMessage) -> SessionState {
        let s = &self.shared;
        let ServerMessage::Locked {
            record_type,
            holders,
        } = msg
        else {
            return self.state();
        };
        if *record_type != s.record_type {
            return self.state();
        }

        let (before, after) = {
            let mut state = s.state();
            let before = state.clone();
            *state = next_state(&before, &s.me, holders.get(&s.record_id));
            (before, state.clone())
        };

        if before != after {
            match &after {
                SessionState::Held => info!(record_id = s.record_id, "lease held"),
                SessionState::Denied { holder } => {
                    info!(record_id = s.record_id, holder_id = holder.id, "lease denied")
                }
                SessionState::Acquiring => {
                    info!(record_id = s.record_id, "lease reclaimed by server; re-acquiring");
                    s.send(s.start_edit()).await;
                }
                _ => {}
            }
        }
        after
    }

    /// One timer tick, for callers that drive time themselves.
    pub async fn tick(&self) {
        self.shared.tick().await;
    }

    /// Close the edit view on a normal exit path: stop the timer, release the
    /// lease if this session may hold it, return to `Idle`.
    ///
    /// A `Denied` view sends `stop_edit` too. A grant whose snapshot never
    /// reached us would otherwise block the record for a full TTL, and the
    /// server ignores `stop_edit` from anyone but the holder.
    pub async fn leave(&mut self) {
        let before = std::mem::replace(&mut *self.shared.state(), SessionState::Releasing);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let s = &self.shared;
        if matches!(
            before,
            SessionState::Held | SessionState::Acquiring | SessionState::Denied { .. }
        ) {
            s.send(ClientMessage::StopEdit {
                record_type: s.record_type,
                record_id: s.record_id,
                user: s.me.clone(),
            })
            .await;
        }
        *s.state() = SessionState::Idle;
        info!(record_id = s.record_id, "left edit view");
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
