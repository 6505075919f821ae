//! Shared runtime state for elk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The coordinator owns
//! all mutable lock and subscriber state; everything else here is fixed at
//! boot.

use std::sync::Arc;

use elk_config::CoordinatorConfig;
use elk_lease::Clock;
use serde::{Deserialize, Serialize};

use crate::coordinator::Coordinator;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub build: BuildInfo,
    pub config: CoordinatorConfig,
    /// Hash of the layered config this process booted with, when loaded from
    /// files.
    pub config_hash: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl AppState {
    pub fn new(config: CoordinatorConfig) -> Self {
        let coordinator = Arc::new(Coordinator::from_config(&config));
        Self::with_coordinator(config, coordinator)
    }

    /// State whose lease clock is supplied by the caller (tests).
    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        let coordinator = Arc::new(Coordinator::from_config_with_clock(&config, clock));
        Self::with_coordinator(config, coordinator)
    }

    pub fn with_coordinator(config: CoordinatorConfig, coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            build: BuildInfo {
                service: "elk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            config,
            config_hash: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
