//! Scenario: client edit session lifecycle
//!
//! # Invariants under test
//!
//! 1. `enter()` subscribes, then asks for the lease; the outcome comes from
//!    the next snapshot (`Held` for me, `Denied` for anyone else).
//! 2. While `Held`, a heartbeat goes out every interval; while `Acquiring`,
//!    `start_edit` is re-sent instead. `Denied` sends nothing.
//! 3. A `Held` session whose record vanishes from the snapshot re-acquires.
//! 4. Send failures are swallowed and the next tick tries again.
//! 5. `leave()` releases and stops the timer; dropping the session stops the
//!    timer without releasing. A denied view sends `stop_edit` as well, which
//!    the server ignores unless the grant was ours after all.
//! 6. A subscribe snapshot naming a holder whose lease is replaced before our
//!    `start_edit` lands denies at first; the grant snapshot that follows
//!    moves the session to `Held` and heartbeats start.
//!
//! Time is paused, so the heartbeat timer is driven deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use elk_client::{EditSession, SessionState, Transport, TransportError};
use elk_schemas::{ClientMessage, LockSnapshot, RecordType, ServerMessage, User};

const HEARTBEAT: Duration = Duration::from_millis(5_000);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedTransport {
    sent: Mutex<Vec<ClientMessage>>,
    failing: AtomicBool,
}

impl ScriptedTransport {
    fn events(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.event_name())
            .collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, msg: ClientMessage) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Io("link down".into()));
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

fn user(id: i64) -> User {
    User {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        fullname: format!("User Number {id}"),
        role: "staff".to_string(),
    }
}

fn locked(pairs: &[(i64, User)]) -> ServerMessage {
    let holders: LockSnapshot = pairs.iter().cloned().collect();
    ServerMessage::Locked {
        record_type: RecordType::Estimate,
        holders,
    }
}

fn session(t: &Arc<ScriptedTransport>, me: User) -> EditSession {
    EditSession::new(t.clone(), RecordType::Estimate, 42, me, HEARTBEAT)
}

/// Let the paused clock run past `n` heartbeat ticks.
async fn beats(n: u32) {
    tokio::time::sleep(HEARTBEAT * n + Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// 1. enter → Acquiring → Held / Denied
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn enter_subscribes_then_requests_lease() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));

    s.enter().await;
    assert_eq!(s.state(), SessionState::Acquiring);
    assert_eq!(
        t.events(),
        vec!["start_listening_estimates", "start_edit_estimate"]
    );

    // Initial subscribe snapshot predates the grant.
    assert_eq!(s.on_server_message(&locked(&[])).await, SessionState::Acquiring);
    assert_eq!(
        s.on_server_message(&locked(&[(42, user(1))])).await,
        SessionState::Held
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_naming_someone_else_denies() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;

    let state = s.on_server_message(&locked(&[(42, user(2))])).await;
    assert_eq!(state, SessionState::Denied { holder: user(2) });
    assert_eq!(s.banner().as_deref(), Some("being edited by User Number 2"));
}

#[tokio::test(start_paused = true)]
async fn other_records_and_topics_are_ignored() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;

    s.on_server_message(&locked(&[(7, user(2))])).await;
    s.on_server_message(&ServerMessage::Locked {
        record_type: RecordType::Invoice,
        holders: [(42, user(2))].into_iter().collect(),
    })
    .await;
    assert_eq!(s.state(), SessionState::Acquiring);
}

// ---------------------------------------------------------------------------
// 2. Timer behaviour per state
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn held_session_heartbeats_every_interval() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(1))])).await;
    t.clear();

    beats(3).await;
    assert_eq!(t.events(), vec!["heartbeat_edit_estimate"; 3]);
}

#[tokio::test(start_paused = true)]
async fn acquiring_session_retries_start_edit_on_tick() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    t.clear();

    beats(2).await;
    assert_eq!(t.events(), vec!["start_edit_estimate"; 2]);
}

#[tokio::test(start_paused = true)]
async fn denied_session_does_not_retry() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(2))])).await;
    t.clear();

    beats(4).await;
    assert!(t.events().is_empty());

    // Holder leaves; a denied session still waits for the user to re-enter.
    s.on_server_message(&locked(&[])).await;
    assert_eq!(s.state(), SessionState::Denied { holder: user(2) });
}

#[tokio::test(start_paused = true)]
async fn denied_by_a_lapsing_holder_adopts_its_own_grant() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;

    // Subscribe snapshot still lists the previous holder; our start_edit then
    // replaced that lease and the grant is published after it.
    assert_eq!(
        s.on_server_message(&locked(&[(42, user(2))])).await,
        SessionState::Denied { holder: user(2) }
    );
    assert_eq!(s.on_server_message(&locked(&[])).await, SessionState::Denied { holder: user(2) });
    assert_eq!(
        s.on_server_message(&locked(&[(42, user(1))])).await,
        SessionState::Held
    );
    assert_eq!(s.banner(), None);
    t.clear();

    beats(2).await;
    assert_eq!(t.events(), vec!["heartbeat_edit_estimate"; 2]);

    t.clear();
    s.leave().await;
    assert_eq!(t.events(), vec!["stop_edit_estimate"]);
}

// ---------------------------------------------------------------------------
// 3. Reaped while held
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn held_session_reacquires_after_being_reaped() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(1))])).await;
    t.clear();

    let state = s.on_server_message(&locked(&[])).await;
    assert_eq!(state, SessionState::Acquiring);
    assert_eq!(t.events(), vec!["start_edit_estimate"]);

    let state = s.on_server_message(&locked(&[(42, user(1))])).await;
    assert_eq!(state, SessionState::Held);
}

// ---------------------------------------------------------------------------
// 4. Send failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn send_failures_are_swallowed_and_retried() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(1))])).await;
    t.clear();

    t.failing.store(true, Ordering::SeqCst);
    beats(2).await;
    assert_eq!(s.state(), SessionState::Held);
    assert!(t.events().is_empty());

    t.failing.store(false, Ordering::SeqCst);
    beats(1).await;
    assert_eq!(t.events(), vec!["heartbeat_edit_estimate"]);
}

// ---------------------------------------------------------------------------
// 5. Exit paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn leave_releases_and_stops_heartbeats() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(1))])).await;
    t.clear();

    s.leave().await;
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(t.events(), vec!["stop_edit_estimate"]);

    t.clear();
    beats(3).await;
    assert!(t.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn leaving_a_denied_view_still_sends_stop_edit() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(2))])).await;
    t.clear();

    s.leave().await;
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(t.events(), vec!["stop_edit_estimate"]);
}

#[tokio::test(start_paused = true)]
async fn leaving_an_idle_session_sends_nothing() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));

    s.leave().await;
    assert_eq!(s.state(), SessionState::Idle);
    assert!(t.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_a_held_session_does_not_release() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(1))])).await;
    t.clear();

    drop(s);
    beats(3).await;
    assert!(t.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reentering_after_leave_starts_over() {
    let t = Arc::new(ScriptedTransport::default());
    let mut s = session(&t, user(1));
    s.enter().await;
    s.on_server_message(&locked(&[(42, user(2))])).await;
    s.leave().await;
    t.clear();

    s.enter().await;
    assert_eq!(s.state(), SessionState::Acquiring);
    assert_eq!(
        t.events(),
        vec!["start_listening_estimates", "start_edit_estimate"]
    );
}
