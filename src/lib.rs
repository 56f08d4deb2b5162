//! Resilient API Request Pipeline Library
//!
//! Client-side request pipeline: endpoint sanitization, sliding-window rate
//! limiting, CSRF token management and a retrying transport with
//! per-attempt timeouts and exponential backoff.

pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::PipelineConfig;
pub use http::{PipelineError, PipelineResult, RequestOptions, RequestOutcome, RetryingTransport};
pub use lifecycle::Shutdown;
