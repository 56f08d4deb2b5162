//! HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → request.rs (method, headers, body, request ID)
//!     → transport.rs (rate limit, sanitize, CSRF, retries)
//!     → sender.rs (reqwest on the wire)
//!     → types.rs (decoded body or classified PipelineError)
//! ```

pub mod request;
pub mod sender;
pub mod transport;
pub mod types;

pub use request::{RequestId, RequestOptions, X_DEVICE_ID, X_REQUEST_ID};
pub use sender::{HttpSender, OutgoingRequest, RawResponse, ReqwestSender};
pub use transport::RetryingTransport;
pub use types::{PipelineError, PipelineResult, RequestOutcome, RetryAttempt};
