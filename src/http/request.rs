//! Caller-facing request description.
//!
//! # Responsibilities
//! - Carry method, extra headers and optional JSON body for one call
//! - Generate the per-call request ID
//!
//! # Design Decisions
//! - One request ID per logical call, shared by all of its attempts
//! - Invalid caller headers are rejected early, not silently dropped

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

use crate::http::types::{PipelineError, PipelineResult};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the client device identifier.
pub const X_DEVICE_ID: &str = "x-device-id";

/// Unique identifier for one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Method, headers and body for one call through the transport.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn post(body: Value) -> Self {
        Self::new(Method::POST).with_body(body)
    }

    pub fn put(body: Value) -> Self {
        Self::new(Method::PUT).with_body(body)
    }

    pub fn patch(body: Value) -> Self {
        Self::new(Method::PATCH).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a caller header. Fails on a name or value that is not valid HTTP.
    pub fn header(mut self, name: &str, value: &str) -> PipelineResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PipelineError::Validation(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PipelineError::Validation(format!("invalid value for header '{}': {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// POST, PUT, PATCH and DELETE carry the CSRF token.
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}
