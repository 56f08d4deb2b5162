//! Metrics collection.
//!
//! # Responsibilities
//! - Name and label the pipeline's metrics in one place
//! - Record through the `metrics` facade; installing an exporter is the
//!   embedding application's job
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): logical calls by method, outcome
//! - `pipeline_request_duration_seconds` (histogram): end-to-end call latency
//! - `pipeline_attempts_total` (counter): network attempts by outcome
//! - `pipeline_rate_limited_total` (counter): local rejections by category
//! - `pipeline_csrf_refresh_total` (counter): token refreshes by result
//! - `pipeline_rate_limit_keys` (gauge): keys tracked after a sweep
//!
//! # Design Decisions
//! - Without a recorder installed every call here is a no-op
//! - Labels stay low-cardinality (no endpoint paths)

use std::time::Instant;

/// Record a finished logical call.
pub fn record_request(method: &str, outcome: &str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();

    ::metrics::counter!(
        "pipeline_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "pipeline_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration);
}

/// Record one network attempt.
pub fn record_attempt(outcome: &str) {
    ::metrics::counter!("pipeline_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a request rejected by the client-side rate limiter.
pub fn record_rate_limited(category: &'static str) {
    ::metrics::counter!("pipeline_rate_limited_total", "category" => category).increment(1);
}

/// Record how many rate limit keys remain after a sweep.
pub fn record_rate_limit_keys(count: usize) {
    ::metrics::gauge!("pipeline_rate_limit_keys").set(count as f64);
}

/// Record a CSRF token refresh ("success" or "failure").
pub fn record_csrf_refresh(result: &'static str) {
    ::metrics::counter!("pipeline_csrf_refresh_total", "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("GET", "success", Instant::now());
        record_attempt("timeout");
        record_rate_limited("read");
        record_rate_limit_keys(3);
        record_csrf_refresh("success");
    }
}
