//! Outcome types and error definitions for pipeline calls.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can end a pipeline call.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed endpoint, URL or request; raised before any network activity.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Admission rejected, locally or by the server (429).
    #[error("Rate limited, retry after {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// A single attempt exceeded its deadline.
    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Connection refused, DNS failure, reset, etc.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a 5xx status.
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    /// The server answered with a 4xx status.
    #[error("Client error {status}: {body}")]
    Client { status: u16, body: String },

    /// The CSRF token could not be obtained.
    #[error("CSRF token acquisition failed: {0}")]
    CsrfAcquisition(String),

    /// A 2xx body that is not the expected JSON.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Every attempt failed with a retryable error.
    #[error("Request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Timeout { .. }
                | PipelineError::Network(_)
                | PipelineError::Server { .. }
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Network(_) => "network",
            PipelineError::Server { .. } => "server_error",
            PipelineError::Client { .. } => "client_error",
            PipelineError::CsrfAcquisition(_) => "csrf",
            PipelineError::MalformedResponse(_) => "malformed_response",
            PipelineError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// The underlying cause, looking through `RetriesExhausted`.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Tagged result of one logical call.
#[derive(Debug)]
pub enum RequestOutcome {
    Success(Value),
    RateLimited(Duration),
    Failed(PipelineError),
}

impl From<PipelineResult<Value>> for RequestOutcome {
    fn from(result: PipelineResult<Value>) -> Self {
        match result {
            Ok(body) => RequestOutcome::Success(body),
            Err(PipelineError::RateLimited { retry_after }) => RequestOutcome::RateLimited(retry_after),
            Err(e) => RequestOutcome::Failed(e),
        }
    }
}

/// One network attempt within a logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt counter.
    pub attempt_number: u32,
    /// Backoff slept before this attempt (zero for the first).
    pub delay_before: Duration,
}

impl RetryAttempt {
    pub fn first() -> Self {
        Self {
            attempt_number: 1,
            delay_before: Duration::ZERO,
        }
    }

    /// The attempt that follows this one after sleeping `delay`.
    pub fn next(self, delay: Duration) -> Self {
        Self {
            attempt_number: self.attempt_number + 1,
            delay_before: delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::Timeout { after: Duration::from_secs(5) }.is_retryable());
        assert!(PipelineError::Network("refused".into()).is_retryable());
        assert!(PipelineError::Server { status: 503, body: String::new() }.is_retryable());

        assert!(!PipelineError::Client { status: 404, body: String::new() }.is_retryable());
        assert!(!PipelineError::Validation("bad".into()).is_retryable());
        assert!(!PipelineError::MalformedResponse("eof".into()).is_retryable());
        assert!(!PipelineError::RateLimited { retry_after: Duration::ZERO }.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::RateLimited {
            retry_after: Duration::from_secs(40),
        };
        assert_eq!(err.to_string(), "Rate limited, retry after 40000ms");

        let err = PipelineError::RetriesExhausted {
            attempts: 3,
            source: Box::new(PipelineError::Server {
                status: 502,
                body: "bad gateway".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "Request failed after 3 attempts: Server error 502: bad gateway"
        );
        assert_eq!(err.root_cause().kind(), "server_error");
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: PipelineResult<Value> = Ok(serde_json::json!({"data": "ok"}));
        assert!(matches!(RequestOutcome::from(ok), RequestOutcome::Success(_)));

        let limited: PipelineResult<Value> = Err(PipelineError::RateLimited {
            retry_after: Duration::from_secs(1),
        });
        assert!(matches!(
            RequestOutcome::from(limited),
            RequestOutcome::RateLimited(d) if d == Duration::from_secs(1)
        ));

        let failed: PipelineResult<Value> = Err(PipelineError::Network("reset".into()));
        assert!(matches!(RequestOutcome::from(failed), RequestOutcome::Failed(_)));
    }

    #[test]
    fn test_retry_attempt_sequence() {
        let first = RetryAttempt::first();
        let second = first.next(Duration::from_millis(1000));
        assert_eq!(second.attempt_number, 2);
        assert_eq!(second.delay_before, Duration::from_millis(1000));
    }
}
