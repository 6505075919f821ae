//! Request and response types for the elk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicStatus {
    /// "estimates" | "invoices"
    pub topic: String,
    pub leases: usize,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub server_time: DateTime<Utc>,
    pub heartbeat_interval_ms: u64,
    pub lease_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub config_hash: Option<String>,
    pub topics: Vec<TopicStatus>,
}

// ---------------------------------------------------------------------------
// /v1/topics/{topic}/expired-closed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResponse {
    pub event: String,
    pub delivered: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
