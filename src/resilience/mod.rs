//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! One attempt of a logical call:
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → retries.rs (classify response, decide whether to retry)
//!     → backoff.rs (exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient failures (timeout, network, 5xx) are retried
//! - No jitter unless configured, so delays are predictable

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
