//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `SYNC_BRIDGE_*` environment overrides
//! 4. [`validate`] the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::BridgeSettings;

/// Resolve the default settings file (`~/.sync-bridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sync-bridge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings the hub cannot run with.
pub fn validate(settings: &BridgeSettings) -> Result<()> {
    if settings.sessions.event_buffer_size == 0 {
        return Err(SettingsError::InvalidValue(
            "sessions.eventBufferSize must be at least 1".into(),
        ));
    }
    if settings.sessions.sweep_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "sessions.sweepIntervalSecs must be at least 1".into(),
        ));
    }
    if settings.server.send_queue_size == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueSize must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Apply `SYNC_BRIDGE_*` environment overrides to loaded settings.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` as the variable source.
pub fn apply_overrides_with<F>(settings: &mut BridgeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SYNC_BRIDGE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("SYNC_BRIDGE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("SYNC_BRIDGE_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("SYNC_BRIDGE_PING_INTERVAL_SECS", 1, 3600) {
        settings.server.ping_interval_secs = v;
    }
    if let Some(v) = env.usize("SYNC_BRIDGE_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }

    // ── Sessions ────────────────────────────────────────────────────
    if let Some(v) = env.usize("SYNC_BRIDGE_EVENT_BUFFER_SIZE", 1, 1_000_000) {
        settings.sessions.event_buffer_size = v;
    }
    if let Some(v) = env.usize("SYNC_BRIDGE_GLOBAL_LOG_SIZE", 1, 10_000_000) {
        settings.sessions.global_log_size = Some(v);
    }
    if let Some(v) = env.u64("SYNC_BRIDGE_SESSION_TIMEOUT_SECS", 1, 30 * 24 * 3600) {
        settings.sessions.idle_timeout_secs = v;
    }
    if let Some(v) = env.u64("SYNC_BRIDGE_SWEEP_INTERVAL_SECS", 1, 24 * 3600) {
        settings.sessions.sweep_interval_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SYNC_BRIDGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("SYNC_BRIDGE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BridgeSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = BridgeSettings::default();
        apply_overrides_with(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8765, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9000}, "sessions": {"globalLogSize": 50}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.sessions.global_log_capacity(), 50);
        assert_eq!(settings.sessions.event_buffer_size, 1000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let err = read_file_layer(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn zero_buffer_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"sessions": {"eventBufferSize": 0}}"#).unwrap();

        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(msg) if msg.contains("eventBufferSize")));
    }

    #[test]
    fn zero_sweep_interval_fails_validation() {
        let mut settings = BridgeSettings::default();
        settings.sessions.sweep_interval_secs = 0;
        assert!(validate(&settings).is_err());
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_valid_values() {
        let settings = overrides(&[
            ("SYNC_BRIDGE_PORT", "9100"),
            ("SYNC_BRIDGE_HOST", "127.0.0.1"),
            ("SYNC_BRIDGE_EVENT_BUFFER_SIZE", "25"),
            ("SYNC_BRIDGE_SESSION_TIMEOUT_SECS", "120"),
            ("SYNC_BRIDGE_SWEEP_INTERVAL_SECS", "5"),
            ("SYNC_BRIDGE_LOG_JSON", "off"),
        ]);
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.sessions.event_buffer_size, 25);
        assert_eq!(settings.sessions.global_log_capacity(), 50);
        assert_eq!(settings.sessions.idle_timeout_secs, 120);
        assert_eq!(settings.sessions.sweep_interval_secs, 5);
        assert!(!settings.logging.json);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let settings = overrides(&[
            ("SYNC_BRIDGE_PORT", "0"),
            ("SYNC_BRIDGE_EVENT_BUFFER_SIZE", "lots"),
            ("SYNC_BRIDGE_LOG_JSON", "maybe"),
            ("SYNC_BRIDGE_HOST", ""),
        ]);
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn global_log_override_is_explicit() {
        let settings = overrides(&[("SYNC_BRIDGE_GLOBAL_LOG_SIZE", "10")]);
        assert_eq!(settings.sessions.global_log_size, Some(10));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("65535", 1, 65535), Some(65535));
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_usize_range("50", 1, 100), Some(50));
        assert_eq!(parse_usize_range("abc", 1, 100), None);
    }
}
