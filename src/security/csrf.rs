//! CSRF token acquisition and caching.
//!
//! # State Transitions
//! ```text
//! NoToken → Refreshing → Valid
//! Valid → Expired (now >= expires_at) → Refreshing
//! Refreshing → NoToken (refresh failed, cache cleared)
//! ```

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use url::Url;

use crate::clock::{default_clock, Clock};
use crate::config::CsrfConfig;
use crate::http::sender::{HttpSender, OutgoingRequest};
use crate::http::types::{PipelineError, PipelineResult};
use crate::observability::metrics;
use crate::security::sanitize::{build_url, sanitize};

/// A cached anti-forgery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub value: String,
    pub expires_at: Instant,
}

/// Observable state of the token cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    /// The cache is locked by a refresh (or a lookup) in progress.
    Refreshing,
    Valid,
    Expired,
}

/// Body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    /// Lifetime in milliseconds.
    #[serde(rename = "expiresIn")]
    expires_in: Option<u64>,
    #[serde(rename = "expires_in")]
    expires_in_snake: Option<u64>,
}

/// Fetches, caches and hands out the CSRF token.
///
/// The cache sits behind an async mutex that is held across the refresh
/// call, so concurrent callers that find no valid token wait for the one
/// refresh in flight instead of issuing their own.
pub struct CsrfTokenManager {
    sender: Arc<dyn HttpSender>,
    token_url: Url,
    header_name: HeaderName,
    marker_name: HeaderName,
    marker_value: HeaderValue,
    default_expiry: Duration,
    request_timeout: Duration,
    enabled: bool,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CsrfToken>>,
}

impl CsrfTokenManager {
    pub fn new(
        config: &CsrfConfig,
        base_url: &Url,
        sender: Arc<dyn HttpSender>,
        request_timeout: Duration,
    ) -> PipelineResult<Self> {
        Self::with_clock(config, base_url, sender, request_timeout, default_clock())
    }

    pub fn with_clock(
        config: &CsrfConfig,
        base_url: &Url,
        sender: Arc<dyn HttpSender>,
        request_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> PipelineResult<Self> {
        let token_url = build_url(base_url, &sanitize(&config.token_path))?;
        let header_name = parse_header_name(&config.header_name)?;
        let marker_name = parse_header_name(&config.marker_header)?;
        let marker_value = HeaderValue::from_str(&config.marker_value).map_err(|e| {
            PipelineError::Validation(format!("invalid CSRF marker value: {}", e))
        })?;

        Ok(Self {
            sender,
            token_url,
            header_name,
            marker_name,
            marker_value,
            default_expiry: Duration::from_millis(config.default_expiry_ms),
            request_timeout,
            enabled: config.enabled,
            clock,
            cached: Mutex::new(None),
        })
    }

    /// Return the cached token, refreshing it when absent or expired.
    pub async fn get_token(&self) -> PipelineResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if self.clock.now() < token.expires_at {
                return Ok(token.value.clone());
            }
            tracing::debug!("CSRF token expired, refreshing");
        }

        match self.refresh().await {
            Ok(token) => {
                let value = token.value.clone();
                *cached = Some(token);
                metrics::record_csrf_refresh("success");
                Ok(value)
            }
            Err(e) => {
                *cached = None;
                metrics::record_csrf_refresh("failure");
                tracing::error!(error = %e, url = %self.token_url, "CSRF token refresh failed");
                Err(e)
            }
        }
    }

    /// Headers for a state-changing request.
    ///
    /// Never fails: when the token cannot be obtained the request goes out
    /// without CSRF headers and the server decides.
    pub async fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.enabled {
            return headers;
        }

        match self.get_token().await {
            Ok(token) => match HeaderValue::from_str(&token) {
                Ok(value) => {
                    headers.insert(self.header_name.clone(), value);
                    headers.insert(self.marker_name.clone(), self.marker_value.clone());
                }
                Err(_) => {
                    tracing::warn!("CSRF token is not a valid header value, sending without it");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Proceeding without CSRF protection");
            }
        }
        headers
    }

    /// Forget the cached token; the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    pub fn state(&self) -> TokenState {
        match self.cached.try_lock() {
            Err(_) => TokenState::Refreshing,
            Ok(guard) => match guard.as_ref() {
                None => TokenState::NoToken,
                Some(token) if self.clock.now() < token.expires_at => TokenState::Valid,
                Some(_) => TokenState::Expired,
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn refresh(&self) -> PipelineResult<CsrfToken> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let request = OutgoingRequest {
            method: Method::GET,
            url: self.token_url.clone(),
            headers,
            body: None,
        };

        let response = match timeout(self.request_timeout, self.sender.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(PipelineError::CsrfAcquisition(e.to_string())),
            Err(_) => {
                return Err(PipelineError::CsrfAcquisition(format!(
                    "token request timed out after {}ms",
                    self.request_timeout.as_millis()
                )))
            }
        };

        if !response.status.is_success() {
            return Err(PipelineError::CsrfAcquisition(format!(
                "token endpoint returned {}",
                response.status
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            PipelineError::CsrfAcquisition(format!("malformed token response: {}", e))
        })?;

        let value = parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::CsrfAcquisition("response has no token".to_string()))?;
        let lifetime = parsed
            .expires_in
            .or(parsed.expires_in_snake)
            .map(Duration::from_millis)
            .unwrap_or(self.default_expiry);

        tracing::debug!(lifetime_ms = lifetime.as_millis() as u64, "CSRF token refreshed");
        Ok(CsrfToken {
            value,
            expires_at: self.clock.now() + lifetime,
        })
    }
}

impl std::fmt::Debug for CsrfTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfTokenManager")
            .field("token_url", &self.token_url.as_str())
            .field("enabled", &self.enabled)
            .field("state", &self.state())
            .finish()
    }
}

fn parse_header_name(name: &str) -> PipelineResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| PipelineError::Validation(format!("invalid header name '{}': {}", name, e)))
}
