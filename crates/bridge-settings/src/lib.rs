//! # bridge-settings
//!
//! Configuration for the sync bridge, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Settings file**: `~/.sync-bridge/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `SYNC_BRIDGE_*` overrides (highest priority)
//!
//! The binary applies its CLI flags on top and re-runs [`validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_with, deep_merge, load_settings, load_settings_from_path,
    settings_path, validate,
};
pub use types::{BridgeSettings, LoggingSettings, ServerSettings, SessionSettings};
