#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use elk_client::{Transport, TransportError};
use elk_config::CoordinatorConfig;
use elk_daemon::{connection::Connection, coordinator::Coordinator, state::AppState};
use elk_lease::ManualClock;
use elk_schemas::{ClientMessage, LockSnapshot, ServerMessage, User};
use tokio::sync::mpsc;

pub const HEARTBEAT: Duration = Duration::from_secs(5);
pub const TTL: Duration = Duration::from_secs(15);

pub fn user(id: i64) -> User {
    User {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        fullname: format!("User Number {id}"),
        role: "staff".to_string(),
    }
}

/// Default config (5 s heartbeat, 15 s TTL) on a manual clock at the epoch.
pub fn manual_state() -> (Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let st = Arc::new(AppState::with_clock(CoordinatorConfig::default(), clock.clone()));
    (st, clock)
}

pub fn manual_coordinator() -> (Arc<Coordinator>, Arc<ManualClock>) {
    let (st, clock) = manual_state();
    (Arc::clone(&st.coordinator), clock)
}

/// Default timings, but every subscriber queue holds only `buffer` messages.
pub fn manual_coordinator_with_buffer(buffer: usize) -> (Arc<Coordinator>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let mut config = CoordinatorConfig::default();
    config.presence.subscriber_buffer = buffer;
    let coord = Arc::new(Coordinator::from_config_with_clock(&config, clock.clone()));
    (coord, clock)
}

/// Everything currently queued on `rx`, oldest first.
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(m) = rx.try_recv() {
        out.push(m);
    }
    out
}

/// Holder map of the newest `locked_*` message queued on `rx`.
pub fn latest_snapshot(rx: &mut mpsc::Receiver<ServerMessage>) -> Option<LockSnapshot> {
    drain(rx).into_iter().rev().find_map(|m| match m {
        ServerMessage::Locked { holders, .. } => Some(holders),
        _ => None,
    })
}

/// In-process transport: every message goes straight to a server-side
/// connection, as if it had arrived over a socket.
pub struct LocalTransport {
    conn: tokio::sync::Mutex<Connection>,
}

impl LocalTransport {
    pub fn open(coordinator: &Arc<Coordinator>) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let (conn, rx) = coordinator.open_connection();
        (
            Arc::new(Self {
                conn: tokio::sync::Mutex::new(conn),
            }),
            rx,
        )
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn send(&self, msg: ClientMessage) -> Result<(), TransportError> {
        self.conn.lock().await.handle(msg).await;
        Ok(())
    }
}
