//! Retry logic.
//!
//! # Responsibilities
//! - Classify a raw response into a decoded body or a `PipelineError`
//! - Decide whether a failed attempt is retried
//! - Compute the delay before the next attempt
//!
//! # Design Decisions
//! - Timeouts, network errors and 5xx are retryable; 4xx never is
//! - A server 429 becomes `RateLimited` and is left to the caller
//! - Undecodable 2xx bodies are not retried (the server will answer the same)

use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::http::sender::RawResponse;
use crate::http::types::{PipelineError, PipelineResult};
use crate::resilience::backoff::calculate_backoff;

/// Wait suggested when a 429 carries no usable hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Attempt budget and backoff schedule for one logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl RetryPolicy {
    /// True if `attempt` (1-based) failed with `error` and another try is allowed.
    pub fn should_retry(&self, attempt: u32, error: &PipelineError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms, self.jitter)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }
}

/// Turn a raw response into a decoded JSON body or a classified error.
pub fn classify_response(response: RawResponse) -> PipelineResult<Value> {
    let status = response.status;

    if status.is_success() {
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&response.body)
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()));
    }

    if status.as_u16() == 429 {
        return Err(PipelineError::RateLimited {
            retry_after: retry_after_hint(&response),
        });
    }

    let body = truncate(&response.body);
    if status.is_server_error() {
        Err(PipelineError::Server {
            status: status.as_u16(),
            body,
        })
    } else {
        // 4xx, and anything else that is neither success nor 5xx (1xx/3xx
        // leaking through), is treated as a client-side problem.
        Err(PipelineError::Client {
            status: status.as_u16(),
            body,
        })
    }
}

/// `Retry-After` in seconds, else a `retry_after` field in the JSON body.
fn retry_after_hint(response: &RawResponse) -> Duration {
    let from_header = response
        .headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let from_body = || {
        serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|body| body.get("retry_after").and_then(Value::as_u64))
    };

    match from_header.or_else(from_body) {
        Some(seconds) => Duration::from_secs(seconds),
        None => {
            tracing::warn!("429 without a usable Retry-After, using default");
            DEFAULT_RETRY_AFTER
        }
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;
    use serde_json::json;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_success_decodes_json() {
        let body = classify_response(response(200, r#"{"data":"ok"}"#)).unwrap();
        assert_eq!(body, json!({"data": "ok"}));
        assert_eq!(classify_response(response(204, "")).unwrap(), Value::Null);
    }

    #[test]
    fn test_success_with_garbage_is_malformed() {
        let err = classify_response(response(200, "<html>")).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_status_classes() {
        let err = classify_response(response(503, "unavailable")).unwrap_err();
        assert!(matches!(err, PipelineError::Server { status: 503, .. }));
        assert!(err.is_retryable());

        let err = classify_response(response(404, "missing")).unwrap_err();
        assert!(matches!(err, PipelineError::Client { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_429_reads_retry_after() {
        let mut resp = response(429, "");
        resp.headers.insert(RETRY_AFTER, HeaderValue::from_static("17"));
        let err = classify_response(resp).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RateLimited { retry_after } if retry_after == Duration::from_secs(17)
        ));

        let resp = response(429, r#"{"error":"Rate limit exceeded","retry_after":60}"#);
        assert!(matches!(
            classify_response(resp).unwrap_err(),
            PipelineError::RateLimited { retry_after } if retry_after == Duration::from_secs(60)
        ));

        assert!(matches!(
            classify_response(response(429, "slow down")).unwrap_err(),
            PipelineError::RateLimited { retry_after } if retry_after == DEFAULT_RETRY_AFTER
        ));
    }

    #[test]
    fn test_long_error_bodies_are_truncated() {
        let err = classify_response(response(500, &"x".repeat(2000))).unwrap_err();
        match err {
            PipelineError::Server { body, .. } => assert!(body.len() < 600),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_policy_decisions() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        let server = PipelineError::Server { status: 500, body: String::new() };
        let client = PipelineError::Client { status: 400, body: String::new() };

        assert!(policy.should_retry(1, &server));
        assert!(policy.should_retry(2, &server));
        assert!(!policy.should_retry(3, &server));
        assert!(!policy.should_retry(1, &client));

        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
    }
}
