//! elk-config
//!
//! Layered YAML configuration for the lock coordinator.
//!
//! Docs are merged in order (earlier = base, later = override), converted to
//! JSON, canonicalized with recursively sorted keys, and hashed with SHA-256.
//! The hash is logged at daemon boot so two processes can be checked for
//! identical effective tunables. Typed access lives in [`settings`].

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

mod settings;

pub use settings::{CoordinatorConfig, LeaseSettings, PresenceSettings, ServerSettings};

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty file is a no-op layer, not an instruction to wipe the base.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    let canonical = canonicalize(&merged);
    let canonical_json =
        serde_json::to_string(&canonical).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: canonical,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Rebuild every object with keys inserted in sorted order so the serialized
/// form does not depend on input key order, whatever map backend serde_json
/// was compiled with.
fn canonicalize(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_nested_keys_only() {
        let base = "lease:\n  ttl_ms: 15000\n  heartbeat_interval_ms: 5000\n";
        let overlay = "lease:\n  ttl_ms: 20000\n";
        let cfg = load_layered_yaml_from_strings(&[base, overlay]).unwrap();
        assert_eq!(cfg.config_json["lease"]["ttl_ms"], 20000);
        assert_eq!(cfg.config_json["lease"]["heartbeat_interval_ms"], 5000);
    }

    #[test]
    fn empty_layer_does_not_wipe_base() {
        let base = "presence:\n  subscriber_buffer: 8\n";
        let cfg = load_layered_yaml_from_strings(&[base, ""]).unwrap();
        assert_eq!(cfg.config_json["presence"]["subscriber_buffer"], 8);
    }

    #[test]
    fn no_layers_is_an_empty_object() {
        let cfg = load_layered_yaml_from_strings(&[]).unwrap();
        assert_eq!(cfg.canonical_json, "{}");
        assert_eq!(cfg.config_hash.len(), 64);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(load_layered_yaml_from_strings(&["lease: [unterminated"]).is_err());
    }
}
