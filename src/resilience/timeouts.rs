//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each network attempt with a deadline
//! - Cancel the in-flight attempt cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the future aborts the call
//! - Timeout errors are distinct from other errors (and retryable)
//! - Only the attempt is cancelled, never the surrounding retry loop

use std::future::Future;
use std::time::Duration;

use crate::http::types::{PipelineError, PipelineResult};

/// Run `fut` with a deadline, mapping expiry to `PipelineError::Timeout`.
pub async fn with_timeout<T, F>(after: Duration, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout { after }),
    }
}
