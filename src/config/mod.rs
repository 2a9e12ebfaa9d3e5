//! Uplink Configuration Module
//!
//! Channel endpoints, retry policy, batching threshold, and the local
//! fallback directory, loaded from TOML with environment overrides.
//!
//! ## Loading Order
//!
//! 1. `TELEMETRY_UPLINK_CONFIG` environment variable (path to TOML file)
//! 2. `telemetry_uplink.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Secrets (`TELEMETRY_API_KEY`, `TELEMETRY_STORAGE_TOKEN`) and endpoints
//! can always be supplied through the environment instead of the file.
//!
//! Configuration is passed explicitly to the components that need it;
//! there is no global instance.

mod uplink_config;
pub mod defaults;

pub use uplink_config::*;
