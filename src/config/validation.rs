//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the base URL parses and uses http/https
//! - Validate value ranges (timeouts > 0, attempts > 0, windows > 0)
//! - Check the device identifier format
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use url::Url;

use crate::config::schema::{PipelineConfig, WindowConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., "client.base_url").
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(message) = parse_base_url(&config.client.base_url) {
        errors.push(ValidationError::new("client.base_url", message));
    }

    if config.client.timeout_ms == 0 {
        errors.push(ValidationError::new("client.timeout_ms", "must be greater than 0"));
    }

    if let Some(device_id) = &config.client.device_id {
        if !is_valid_device_id(device_id) {
            errors.push(ValidationError::new(
                "client.device_id",
                "must be 8-64 characters of letters, digits, '-' or '_'",
            ));
        }
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }

    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must not be smaller than retries.base_delay_ms",
        ));
    }

    let limits = &config.rate_limit;
    if limits.enabled {
        if limits.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
        for (name, window) in [
            ("overview", &limits.overview),
            ("read", &limits.read),
            ("modification", &limits.modification),
            ("default", &limits.default),
        ] {
            check_window(name, window, &mut errors);
        }
    }

    let csrf = &config.csrf;
    if csrf.enabled {
        if !csrf.token_path.starts_with('/') {
            errors.push(ValidationError::new("csrf.token_path", "must start with '/'"));
        }
        if reqwest::header::HeaderName::from_bytes(csrf.header_name.as_bytes()).is_err() {
            errors.push(ValidationError::new("csrf.header_name", "is not a valid header name"));
        }
        if reqwest::header::HeaderName::from_bytes(csrf.marker_header.as_bytes()).is_err() {
            errors.push(ValidationError::new("csrf.marker_header", "is not a valid header name"));
        }
        if csrf.default_expiry_ms == 0 {
            errors.push(ValidationError::new("csrf.default_expiry_ms", "must be greater than 0"));
        }
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "compact") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be \"pretty\" or \"compact\"",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a base URL, accepting only http and https.
pub fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}', expected http or https", other)),
    }
}

/// Device IDs are 8-64 characters, alphanumeric with hyphens/underscores.
pub fn is_valid_device_id(device_id: &str) -> bool {
    (8..=64).contains(&device_id.len())
        && device_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_window(name: &str, window: &WindowConfig, errors: &mut Vec<ValidationError>) {
    if window.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{}.max_requests", name),
            "must be greater than 0",
        ));
    }
    if window.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{}.window_secs", name),
            "must be greater than 0",
        ));
    }
}
