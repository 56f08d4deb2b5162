//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing call:
//!     → rate_limit.rs (client-side sliding window per endpoint category)
//!     → sanitize.rs (clean the endpoint, check the URL scheme)
//!     → csrf.rs (anti-forgery token for state-changing methods)
//!     → Hand to the sender
//! ```
//!
//! # Design Decisions
//! - Fail closed on malformed endpoints and URLs
//! - Fail open on CSRF acquisition; the server has the final say
//! - No trust in caller-supplied endpoint strings

pub mod csrf;
pub mod rate_limit;
pub mod sanitize;

pub use csrf::{CsrfToken, CsrfTokenManager, TokenState};
pub use rate_limit::{EndpointCategory, EndpointKey, RateLimiter, RateWindowPolicy};
pub use sanitize::{build_url, sanitize, validate_url};
