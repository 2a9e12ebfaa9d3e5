//! Uplink configuration loaded from TOML with environment overrides.

use super::defaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TELEMETRY_UPLINK_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const LOCAL_CONFIG_FILE: &str = "telemetry_uplink.toml";

/// Root configuration for the uplink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub batching: BatchingConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Events per sealed batch
    pub threshold: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::BATCH_SIZE_THRESHOLD,
        }
    }
}

/// Primary channel: HTTP collector API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: defaults::API_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Secondary channel: object-storage bucket.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Overrides the `https://<bucket>.s3.<region>.amazonaws.com` endpoint
    /// (S3-compatible stores, signing gateways).
    pub endpoint: Option<String>,
    pub key_prefix: String,
    /// Optional bearer token sent with each object write.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: defaults::STORAGE_REGION.to_string(),
            endpoint: None,
            key_prefix: defaults::STORAGE_KEY_PREFIX.to_string(),
            token: None,
            timeout_secs: defaults::STORAGE_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_prefix", &self.key_prefix)
            .field("token", &self.token.as_deref().map(redact))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_delay_secs: defaults::BACKOFF_BASE_SECS,
            max_delay_secs: defaults::BACKOFF_CAP_SECS,
            jitter_ms: defaults::BACKOFF_JITTER_MS,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub dir: PathBuf,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::FALLBACK_DIR),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl UplinkConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TELEMETRY_UPLINK_CONFIG`
    /// 2. `./telemetry_uplink.toml`
    /// 3. Built-in defaults
    ///
    /// Environment overrides are applied on top of whichever source won.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn load_file_or_default() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded uplink config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded uplink config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No uplink config file found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply overrides for secrets and endpoints.
    ///
    /// `lookup` is normally `std::env::var`; tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TELEMETRY_API_ENDPOINT") {
            self.api.endpoint = v;
        }
        if let Some(v) = lookup("TELEMETRY_API_KEY") {
            self.api.api_key = v;
        }
        if let Some(v) = lookup("TELEMETRY_STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("TELEMETRY_STORAGE_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = lookup("TELEMETRY_STORAGE_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = lookup("TELEMETRY_STORAGE_TOKEN") {
            self.storage.token = Some(v);
        }
        if let Some(v) = lookup("TELEMETRY_FALLBACK_DIR") {
            self.fallback.dir = PathBuf::from(v);
        }
    }

    /// Validate the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.batching.threshold == 0 {
            errors.push("batching.threshold must be > 0".to_string());
        }

        if self.api.endpoint.is_empty() {
            errors.push("api.endpoint is required".to_string());
        } else if !is_http_url(&self.api.endpoint) {
            errors.push(format!(
                "api.endpoint must start with http:// or https:// (got '{}')",
                self.api.endpoint
            ));
        }
        if self.api.api_key.is_empty() {
            errors.push("api.api_key is required (or set TELEMETRY_API_KEY)".to_string());
        }
        if self.api.timeout_secs == 0 {
            errors.push("api.timeout_secs must be > 0".to_string());
        }

        if self.storage.bucket.is_empty() {
            errors.push("storage.bucket is required".to_string());
        }
        if self.storage.region.is_empty() && self.storage.endpoint.is_none() {
            errors.push("storage.region is required when storage.endpoint is unset".to_string());
        }
        if let Some(endpoint) = &self.storage.endpoint {
            if !is_http_url(endpoint) {
                errors.push(format!(
                    "storage.endpoint must start with http:// or https:// (got '{endpoint}')"
                ));
            }
        }
        if self.storage.timeout_secs == 0 {
            errors.push("storage.timeout_secs must be > 0".to_string());
        }

        if self.retry.base_delay_secs > self.retry.max_delay_secs {
            errors.push(format!(
                "retry.base_delay_secs ({}) must be <= retry.max_delay_secs ({})",
                self.retry.base_delay_secs, self.retry.max_delay_secs
            ));
        }

        if self.fallback.dir.as_os_str().is_empty() {
            errors.push("fallback.dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> UplinkConfig {
        let mut config = UplinkConfig::default();
        config.api.endpoint = "https://collector.example.com/v1/events".to_string();
        config.api.api_key = "k-123".to_string();
        config.storage.bucket = "telemetry-archive".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = UplinkConfig::default();
        assert_eq!(config.batching.threshold, 100);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(5));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(30));
        assert_eq!(config.retry.jitter(), Duration::ZERO);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = UplinkConfig::from_toml(
            r#"
            [batching]
            threshold = 25

            [api]
            endpoint = "https://collector.example.com/v1/events"
            "#,
        )
        .unwrap();

        assert_eq!(config.batching.threshold, 25);
        assert_eq!(config.api.endpoint, "https://collector.example.com/v1/events");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = valid_config();
        let parsed = UplinkConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("uplink.toml");
        std::fs::write(&path, "[storage]\nbucket = \"b1\"\nregion = \"eu-west-1\"\n").unwrap();

        let config = UplinkConfig::load_from_file(&path).unwrap();
        assert_eq!(config.storage.bucket, "b1");
        assert_eq!(config.storage.region, "eu-west-1");

        let missing = UplinkConfig::load_from_file(&tmp.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(..))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TELEMETRY_API_KEY", "secret"),
            ("TELEMETRY_STORAGE_BUCKET", "override-bucket"),
            ("TELEMETRY_STORAGE_TOKEN", "tok"),
        ]
        .into_iter()
        .collect();

        let mut config = valid_config();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.api.api_key, "secret");
        assert_eq!(config.storage.bucket, "override-bucket");
        assert_eq!(config.storage.token.as_deref(), Some("tok"));
        assert_eq!(config.api.endpoint, "https://collector.example.com/v1/events");
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = UplinkConfig::default();
        config.batching.threshold = 0;
        config.retry.base_delay_secs = 60;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("batching.threshold")));
                assert!(errors.iter().any(|e| e.contains("api.endpoint")));
                assert!(errors.iter().any(|e| e.contains("api.api_key")));
                assert!(errors.iter().any(|e| e.contains("storage.bucket")));
                assert!(errors.iter().any(|e| e.contains("retry.base_delay_secs")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_non_http_endpoint() {
        let mut config = valid_config();
        config.api.endpoint = "ftp://collector".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = valid_config();
        config.storage.token = Some("tok-secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("k-123"));
        assert!(!rendered.contains("tok-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
