//! Outbound HTTP seam.
//!
//! # Responsibilities
//! - Describe one outgoing request and its raw response
//! - Perform the network call (reqwest in production)
//! - Map connection-level failures to `PipelineError::Network`
//!
//! # Design Decisions
//! - No timeouts or retries here; the transport owns both
//! - Cookie store enabled so the session cookie paired with the CSRF
//!   token travels with every request
//! - Bodies are buffered as text; decoding is the transport's job

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::http::types::PipelineError;

/// A fully-built request ready for the wire.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

/// Status, headers and buffered body of a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Something that can put a request on the wire.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, PipelineError>;
}

/// Production sender backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: Client,
}

impl ReqwestSender {
    pub fn new(config: &ClientConfig) -> Result<Self, PipelineError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.as_str());
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Validation(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (its settings are used as-is).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, PipelineError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(network_error)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Flatten a reqwest error and its causes into one message.
fn network_error(err: reqwest::Error) -> PipelineError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    PipelineError::Network(message)
}
