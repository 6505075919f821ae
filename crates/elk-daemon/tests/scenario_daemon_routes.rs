//! Scenario: daemon HTTP routes
//!
//! # Invariants under test
//!
//! 1. `/v1/health` and `/v1/status` report service identity, lease timing and
//!    per-topic lease / subscriber counts.
//! 2. `GET /v1/topics/{topic}/locks` returns exactly the lock table restricted
//!    to that topic.
//! 3. Unknown topics are 404 on every topic route.
//! 4. `POST /v1/topics/{topic}/expired-closed` relays its body verbatim to the
//!    topic's subscribers; a malformed body is 400 and relays nothing.
//! 5. The SSE stream starts with the current snapshot and unsubscribes when
//!    the client goes away.
//!
//! All tests are pure in-process; no network required.

mod common;

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use common::{drain, manual_state, user};
use elk_daemon::routes;
use elk_lease::LeaseKey;
use elk_schemas::{RecordType, ServerMessage};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str, body: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. health / status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_service() {
    let (st, _clock) = manual_state();
    let (status, body) = call(routes::build_router(st), get("/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "elk-daemon");
}

#[tokio::test]
async fn status_reports_timing_and_counts() {
    let (st, _clock) = manual_state();
    st.coordinator
        .acquire(LeaseKey::new(RecordType::Estimate, 42), &user(1))
        .await
        .unwrap();
    let (_conn, _rx) = {
        let (mut conn, rx) = st.coordinator.open_connection();
        conn.handle(elk_schemas::ClientMessage::StartListening {
            record_type: RecordType::Invoice,
        })
        .await;
        (conn, rx)
    };

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["heartbeat_interval_ms"], 5000);
    assert_eq!(json["lease_ttl_ms"], 15000);

    let topics = json["topics"].as_array().unwrap();
    assert_eq!(topics.len(), 2);
    let estimates = topics.iter().find(|t| t["topic"] == "estimates").unwrap();
    let invoices = topics.iter().find(|t| t["topic"] == "invoices").unwrap();
    assert_eq!(estimates["leases"], 1);
    assert_eq!(estimates["subscribers"], 0);
    assert_eq!(invoices["leases"], 0);
    assert_eq!(invoices["subscribers"], 1);
}

// ---------------------------------------------------------------------------
// 2. locks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn locks_lists_only_that_topic() {
    let (st, _clock) = manual_state();
    let c = &st.coordinator;
    c.acquire(LeaseKey::new(RecordType::Estimate, 42), &user(1)).await.unwrap();
    c.acquire(LeaseKey::new(RecordType::Estimate, 43), &user(2)).await.unwrap();
    c.acquire(LeaseKey::new(RecordType::Invoice, 42), &user(3)).await.unwrap();

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/v1/topics/estimates/locks"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    let map = json.as_object().unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(json["42"]["id"], 1);
    assert_eq!(json["43"]["fullname"], "User Number 2");

    let (_, body) = call(routes::build_router(st), get("/v1/topics/invoices/locks")).await;
    let json = parse_json(body);
    assert_eq!(json.as_object().unwrap().len(), 1);
    assert_eq!(json["42"]["id"], 3);
}

// ---------------------------------------------------------------------------
// 3. unknown topics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_topic_is_404() {
    let (st, _clock) = manual_state();
    for req in [
        get("/v1/topics/customers/locks"),
        get("/v1/topics/customers/stream"),
        post("/v1/topics/customers/expired-closed", "{}"),
    ] {
        let (status, body) = call(routes::build_router(Arc::clone(&st)), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(parse_json(body)["error"]
            .as_str()
            .unwrap()
            .contains("customers"));
    }
}

// ---------------------------------------------------------------------------
// 4. expired-closed relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_closed_is_relayed_verbatim() {
    let (st, _clock) = manual_state();
    let (mut conn, mut rx) = st.coordinator.open_connection();
    conn.handle(elk_schemas::ClientMessage::StartListening {
        record_type: RecordType::Estimate,
    })
    .await;
    drain(&mut rx);

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/topics/estimates/expired-closed", r#"{"ids":[7,8]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["event"], "expired_estimates_closed");
    assert_eq!(json["delivered"], 1);

    match rx.try_recv().unwrap() {
        ServerMessage::ExpiredClosed {
            record_type,
            payload,
        } => {
            assert_eq!(record_type, RecordType::Estimate);
            assert_eq!(payload, json!({"ids": [7, 8]}));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn expired_closed_accepts_empty_body() {
    let (st, _clock) = manual_state();
    let (mut conn, mut rx) = st.coordinator.open_connection();
    conn.handle(elk_schemas::ClientMessage::StartListening {
        record_type: RecordType::Invoice,
    })
    .await;
    drain(&mut rx);

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/topics/invoices/expired-closed", ""),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    match rx.try_recv().unwrap() {
        ServerMessage::ExpiredClosed { payload, .. } => assert!(payload.is_null()),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn malformed_relay_body_is_400() {
    let (st, _clock) = manual_state();
    let (mut conn, mut rx) = st.coordinator.open_connection();
    conn.handle(elk_schemas::ClientMessage::StartListening {
        record_type: RecordType::Estimate,
    })
    .await;
    drain(&mut rx);

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/topics/estimates/expired-closed", "{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(rx.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// 5. SSE stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_starts_with_snapshot_and_unsubscribes_on_drop() {
    let (st, _clock) = manual_state();
    st.coordinator
        .acquire(LeaseKey::new(RecordType::Estimate, 42), &user(1))
        .await
        .unwrap();

    let resp = routes::build_router(Arc::clone(&st))
        .oneshot(get("/v1/topics/estimates/stream"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        st.coordinator.presence().subscriber_count(RecordType::Estimate),
        1
    );

    let mut body = resp.into_body();
    let frame = body
        .frame()
        .await
        .expect("stream ended")
        .expect("frame error")
        .into_data()
        .expect("not a data frame");
    let text = String::from_utf8_lossy(&frame).to_string();
    assert!(text.contains("event: locked_estimates"), "got: {text}");
    assert!(text.contains("User Number 1"), "got: {text}");

    drop(body);
    assert_eq!(
        st.coordinator.presence().subscriber_count(RecordType::Estimate),
        0
    );
}
