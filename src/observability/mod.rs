//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Transport, rate limiter and CSRF manager produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → Whatever subscriber / recorder the embedding binary installs
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a call
//! - Metrics are cheap (no-ops until a recorder exists)

pub mod logging;
pub mod metrics;
