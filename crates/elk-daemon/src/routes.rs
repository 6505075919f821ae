//! Axum router and all HTTP handlers for elk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Lock traffic proper goes over `/v1/ws` (see `ws.rs`);
//! the plain HTTP routes are for observers, operators and the external
//! record-expiry job.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use elk_schemas::{RecordType, ServerMessage};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    api_types::{ErrorResponse, HealthResponse, RelayResponse, StatusResponse, TopicStatus},
    coordinator::Coordinator,
    presence::SubscriberId,
    state::{uptime_secs, AppState},
    ws,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/ws", get(ws::ws_upgrade))
        .route("/v1/topics/:topic/locks", get(topic_locks))
        .route("/v1/topics/:topic/stream", get(topic_stream))
        .route("/v1/topics/:topic/expired-closed", post(expired_closed))
        .with_state(state)
}

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

fn parse_topic(topic: &str) -> Result<RecordType, Response> {
    RecordType::from_topic(topic)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown topic: {topic}")))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut topics = Vec::new();
    for rt in RecordType::ALL {
        topics.push(TopicStatus {
            topic: rt.topic().to_string(),
            leases: st.coordinator.leases().lease_count(rt).await,
            subscribers: st.coordinator.presence().subscriber_count(rt),
        });
    }

    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            server_time: chrono::Utc::now(),
            heartbeat_interval_ms: st.config.lease.heartbeat_interval_ms,
            lease_ttl_ms: st.config.lease.ttl_ms,
            sweep_interval_ms: st.config.lease.sweep_interval_ms,
            config_hash: st.config_hash.clone(),
            topics,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/topics/{topic}/locks
// ---------------------------------------------------------------------------

pub(crate) async fn topic_locks(
    State(st): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Response {
    let rt = match parse_topic(&topic) {
        Ok(rt) => rt,
        Err(resp) => return resp,
    };
    let snap = st.coordinator.snapshot(rt).await;
    (StatusCode::OK, Json(snap)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/topics/{topic}/expired-closed
// ---------------------------------------------------------------------------

/// Relay for the external record-expiry job. The body (any JSON, or empty)
/// is forwarded verbatim as the event payload.
pub(crate) async fn expired_closed(
    State(st): State<Arc<AppState>>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Response {
    let rt = match parse_topic(&topic) {
        Ok(rt) => rt,
        Err(resp) => return resp,
    };
    let payload = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(topic = rt.topic(), error = %e, "rejecting malformed expired-closed body");
                return error(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"));
            }
        }
    };

    let delivered = st.coordinator.expired_closed(rt, payload).await;
    info!(topic = rt.topic(), delivered, "expired-closed relayed");
    (
        StatusCode::OK,
        Json(RelayResponse {
            event: format!("expired_{}_closed", rt.topic()),
            delivered,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/topics/{topic}/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn topic_stream(
    State(st): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Response {
    let rt = match parse_topic(&topic) {
        Ok(rt) => rt,
        Err(resp) => return resp,
    };

    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let coordinator = Arc::clone(&st.coordinator);
    let id = coordinator.presence().next_subscriber_id();
    let (tx, rx) = coordinator.presence().channel();
    coordinator.subscribe(rt, id, tx).await;

    let guard = SseSubscription {
        coordinator,
        record_type: rt,
        id,
    };
    let events = receiver_to_sse(rx, guard);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

/// Unsubscribes the SSE client when its stream is dropped (client hung up).
struct SseSubscription {
    coordinator: Arc<Coordinator>,
    record_type: RecordType,
    id: SubscriberId,
}

impl Drop for SseSubscription {
    fn drop(&mut self) {
        self.coordinator
            .presence()
            .unsubscribe(self.record_type, self.id);
    }
}

fn receiver_to_sse(
    rx: mpsc::Receiver<ServerMessage>,
    guard: SseSubscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(rx).map(move |m| {
        let _held = &guard;
        Ok(Event::default().event(m.event_name()).data(m.encode()))
    })
}
