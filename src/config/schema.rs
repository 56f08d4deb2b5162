//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the request pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target API settings (base URL, timeout).
    pub client: ClientConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Client-side rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// CSRF token handling.
    pub csrf: CsrfConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Target API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every endpoint is appended to (e.g., "http://localhost:3000/api").
    pub base_url: String,

    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Optional device identifier sent as `X-Device-ID`.
    pub device_id: Option<String>,

    /// User-Agent header for outgoing requests.
    pub user_agent: String,

    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_ms: 10_000,
            device_id: None,
            user_agent: concat!("request-pipeline/", env!("CARGO_PKG_VERSION")).to_string(),
            use_system_proxy: true,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical call (first try included).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,

    /// Run every retry through the rate limiter again.
    pub recheck_rate_limit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: false,
            recheck_rate_limit: false,
        }
    }
}

/// A single sliding-window policy as written in the config file.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct WindowConfig {
    /// Requests admitted per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl WindowConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Client-side rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. When disabled every request is admitted.
    pub enabled: bool,

    /// Interval of the background sweep that drops idle keys, in seconds.
    pub sweep_interval_secs: u64,

    /// Path substring marking overview/summary endpoints.
    pub overview_marker: String,

    /// Collection path segments whose reads and writes get dedicated policies.
    pub collections: Vec<String>,

    /// Overview and summary endpoints.
    pub overview: WindowConfig,

    /// Reads of a known collection.
    pub read: WindowConfig,

    /// Writes to a known collection.
    pub modification: WindowConfig,

    /// Everything else.
    pub default: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 300,
            overview_marker: "overview".to_string(),
            collections: vec!["budgets".to_string()],
            overview: WindowConfig::new(200, 60),
            read: WindowConfig::new(100, 60),
            modification: WindowConfig::new(30, 60),
            default: WindowConfig::new(30, 60),
        }
    }
}

/// CSRF token handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Attach CSRF headers to state-changing requests.
    pub enabled: bool,

    /// Token issuance endpoint, relative to the base URL.
    pub token_path: String,

    /// Header carrying the token.
    pub header_name: String,

    /// Auxiliary marker header sent alongside the token.
    pub marker_header: String,

    /// Value of the marker header.
    pub marker_value: String,

    /// Token lifetime used when the server omits `expiresIn`, in milliseconds.
    pub default_expiry_ms: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_path: "/csrf-token".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            marker_header: "X-Requested-With".to_string(),
            marker_value: "XMLHttpRequest".to_string(),
            default_expiry_ms: 3_600_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format: "pretty" or "compact".
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = PipelineConfig::default();
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.retries.base_delay_ms, 1000);
        assert!(!config.retries.jitter);
        assert_eq!(config.rate_limit.modification, WindowConfig::new(30, 60));
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
        assert_eq!(config.csrf.default_expiry_ms, 3_600_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [client]
            base_url = "https://api.example.com"

            [rate_limit.read]
            max_requests = 5
            window_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.client.base_url, "https://api.example.com");
        assert_eq!(config.client.timeout_ms, 10_000);
        assert_eq!(config.rate_limit.read, WindowConfig::new(5, 10));
        assert_eq!(config.rate_limit.overview, WindowConfig::new(200, 60));
        assert_eq!(config.csrf.header_name, "X-CSRF-Token");
    }
}
