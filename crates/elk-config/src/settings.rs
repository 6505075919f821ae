//! Typed coordinator tunables.
//!
//! Every field has a default, so an empty config is a valid config. Unknown
//! keys are rejected so a misspelled tunable fails at boot instead of
//! silently falling back to the default.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    pub lease: LeaseSettings,
    pub presence: PresenceSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaseSettings {
    /// How often an edit session renews its lease.
    pub heartbeat_interval_ms: u64,
    /// Maximum silence before a lease is reclaimed.
    pub ttl_ms: u64,
    /// Expiry sweep period.
    pub sweep_interval_ms: u64,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            ttl_ms: 15_000,
            sweep_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceSettings {
    /// Outbound queue depth per subscriber. A full queue drops that snapshot.
    pub subscriber_buffer: usize,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Decode the typed config from a layered load. Does not validate.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        serde_json::from_value(loaded.config_json.clone())
            .context("config does not match coordinator schema")
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.lease.heartbeat_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.lease.sweep_interval_ms)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .with_context(|| format!("invalid server.bind_addr: {}", self.server.bind_addr))
    }

    /// Check cross-field constraints.
    ///
    /// Hard errors: zero intervals, empty buffer, unparsable bind address, and
    /// a TTL under two heartbeats (one dropped beat would reclaim a live
    /// lease). A TTL under three heartbeats is accepted with a warning.
    pub fn validate(&self) -> Result<Vec<String>> {
        let l = &self.lease;
        if l.heartbeat_interval_ms == 0 {
            bail!("CONFIG_INVALID: lease.heartbeat_interval_ms must be > 0");
        }
        if l.ttl_ms == 0 {
            bail!("CONFIG_INVALID: lease.ttl_ms must be > 0");
        }
        if l.sweep_interval_ms == 0 {
            bail!("CONFIG_INVALID: lease.sweep_interval_ms must be > 0");
        }
        if self.presence.subscriber_buffer == 0 {
            bail!("CONFIG_INVALID: presence.subscriber_buffer must be >= 1");
        }
        if l.ttl_ms <= l.heartbeat_interval_ms {
            bail!(
                "CONFIG_INVALID: lease.ttl_ms ({}) must exceed lease.heartbeat_interval_ms ({})",
                l.ttl_ms,
                l.heartbeat_interval_ms
            );
        }
        if l.ttl_ms < l.heartbeat_interval_ms.saturating_mul(2) {
            bail!(
                "CONFIG_INVALID: lease.ttl_ms ({}) is under two heartbeats ({} ms); \
                 a single dropped beat would reclaim a live lease",
                l.ttl_ms,
                l.heartbeat_interval_ms * 2
            );
        }
        self.bind_addr()?;

        let mut warnings = Vec::new();
        if l.ttl_ms < l.heartbeat_interval_ms.saturating_mul(3) {
            warnings.push(format!(
                "lease.ttl_ms ({}) is under the recommended 3 x heartbeat ({} ms)",
                l.ttl_ms,
                l.heartbeat_interval_ms * 3
            ));
        }
        if l.sweep_interval_ms > l.ttl_ms {
            warnings.push(format!(
                "lease.sweep_interval_ms ({}) exceeds lease.ttl_ms ({}); \
                 crashed sessions will block others for up to ttl + sweep",
                l.sweep_interval_ms, l.ttl_ms
            ));
        }
        Ok(warnings)
    }
}
