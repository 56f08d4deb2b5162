//! The retrying transport.
//!
//! # Responsibilities
//! - Run one logical call end to end: admission, URL building, headers,
//!   timed attempts, classification and retries
//! - Own the wiring between sender, rate limiter and CSRF manager
//! - Start the background rate-limit sweeper
//!
//! # Data Flow
//! ```text
//! send(endpoint, options)
//!     → RateLimiter::is_allowed (reject → RateLimited, never retried)
//!     → sanitize + build_url (reject → Validation, before any I/O)
//!     → loop per attempt:
//!         headers (+ CSRF for mutating methods)
//!         → sender under timeout
//!         → classify_response
//!         → retryable? sleep backoff and loop : return
//! ```
//!
//! # Design Decisions
//! - CSRF headers are fetched again on every attempt
//! - The rate limiter is consulted once per call unless
//!   `retries.recheck_rate_limit` is set
//! - A 403 on a mutating call invalidates the cached CSRF token

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;

use crate::clock::{default_clock, Clock};
use crate::config::validation::parse_base_url;
use crate::config::{validate_config, PipelineConfig};
use crate::http::request::{RequestId, RequestOptions, X_DEVICE_ID, X_REQUEST_ID};
use crate::http::sender::{HttpSender, OutgoingRequest, ReqwestSender};
use crate::http::types::{PipelineError, PipelineResult, RequestOutcome, RetryAttempt};
use crate::observability::metrics;
use crate::resilience::retries::classify_response;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::RetryPolicy;
use crate::security::csrf::CsrfTokenManager;
use crate::security::rate_limit::{EndpointKey, RateLimiter};
use crate::security::sanitize::{build_url, sanitize};

const APPLICATION_JSON: &str = "application/json";

/// Sends requests with client-side rate limiting, CSRF protection,
/// per-attempt timeouts and exponential-backoff retries.
#[derive(Clone)]
pub struct RetryingTransport {
    base_url: Url,
    sender: Arc<dyn HttpSender>,
    limiter: Arc<RateLimiter>,
    csrf: Arc<CsrfTokenManager>,
    policy: RetryPolicy,
    request_timeout: Duration,
    device_id: Option<HeaderValue>,
    recheck_rate_limit: bool,
    sweep_interval: Duration,
}

impl RetryingTransport {
    /// Build a transport talking to the network through `reqwest`.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        let sender = ReqwestSender::new(&config.client)?;
        Self::with_sender(config, Arc::new(sender))
    }

    /// Build a transport over a custom sender.
    pub fn with_sender(config: PipelineConfig, sender: Arc<dyn HttpSender>) -> PipelineResult<Self> {
        Self::with_sender_and_clock(config, sender, default_clock())
    }

    /// Like [`with_sender`](Self::with_sender), reading time from `clock`.
    pub fn with_sender_and_clock(
        config: PipelineConfig,
        sender: Arc<dyn HttpSender>,
        clock: Arc<dyn Clock>,
    ) -> PipelineResult<Self> {
        validate_config(&config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            PipelineError::Validation(joined)
        })?;

        let base_url = parse_base_url(&config.client.base_url).map_err(PipelineError::Validation)?;
        let limiter = Arc::new(RateLimiter::with_clock(config.rate_limit.clone(), clock.clone()));
        let csrf = Arc::new(CsrfTokenManager::with_clock(
            &config.csrf,
            &base_url,
            sender.clone(),
            config.client.timeout(),
            clock,
        )?);

        Self::with_parts(&config, sender, limiter, csrf)
    }

    /// Assemble a transport from already-built components.
    ///
    /// The limiter and CSRF manager may be shared with other transports.
    pub fn with_parts(
        config: &PipelineConfig,
        sender: Arc<dyn HttpSender>,
        limiter: Arc<RateLimiter>,
        csrf: Arc<CsrfTokenManager>,
    ) -> PipelineResult<Self> {
        let base_url = parse_base_url(&config.client.base_url).map_err(PipelineError::Validation)?;
        let device_id = config
            .client
            .device_id
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| PipelineError::Validation(format!("invalid device id: {}", e)))?;

        Ok(Self {
            base_url,
            sender,
            limiter,
            csrf,
            policy: RetryPolicy::from(&config.retries),
            request_timeout: config.client.timeout(),
            device_id,
            recheck_rate_limit: config.retries.recheck_rate_limit,
            sweep_interval: Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
        })
    }

    /// Perform one logical call and decode its JSON body.
    pub async fn send(&self, endpoint: &str, options: RequestOptions) -> PipelineResult<Value> {
        let request_id = RequestId::new();
        let method = options.method.clone();
        let start = Instant::now();

        let span = tracing::debug_span!("pipeline_send", %request_id, %method, endpoint);
        let result = self
            .send_inner(endpoint, options, &request_id)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_request(method.as_str(), outcome, start);
        if let Err(e) = &result {
            tracing::warn!(%request_id, %method, endpoint, error = %e, "Request failed");
        }
        result
    }

    async fn send_inner(
        &self,
        endpoint: &str,
        options: RequestOptions,
        request_id: &RequestId,
    ) -> PipelineResult<Value> {
        let path = sanitize(endpoint);
        let key = EndpointKey::new(options.method.clone(), path.clone());

        self.admit(&key)?;

        let url = build_url(&self.base_url, &path)?;
        let mutating = options.is_state_changing();
        let mut attempt = RetryAttempt::first();

        loop {
            tracing::debug!(
                %request_id,
                endpoint = %key,
                attempt = attempt.attempt_number,
                delay_ms = attempt.delay_before.as_millis() as u64,
                "Sending attempt"
            );

            let headers = self.build_headers(&options, request_id, mutating).await;
            let request = OutgoingRequest {
                method: options.method.clone(),
                url: url.clone(),
                headers,
                body: options.body.clone(),
            };

            let sender = self.sender.clone();
            let result = with_timeout(self.request_timeout, async move {
                let response = sender.send(request).await?;
                classify_response(response)
            })
            .await;

            let error = match result {
                Ok(body) => {
                    metrics::record_attempt("success");
                    return Ok(body);
                }
                Err(e) => e,
            };
            metrics::record_attempt(error.kind());

            if mutating && matches!(error, PipelineError::Client { status: 403, .. }) {
                tracing::info!(%request_id, endpoint = %key, "403 on mutating call, dropping CSRF token");
                self.csrf.invalidate().await;
            }

            if !error.is_retryable() {
                return Err(error);
            }
            if !self.policy.should_retry(attempt.attempt_number, &error) {
                return Err(PipelineError::RetriesExhausted {
                    attempts: attempt.attempt_number,
                    source: Box::new(error),
                });
            }

            let delay = self.policy.delay_after(attempt.attempt_number);
            tracing::warn!(
                %request_id,
                endpoint = %key,
                attempt = attempt.attempt_number,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;

            if self.recheck_rate_limit {
                self.admit(&key)?;
            }
            attempt = attempt.next(delay);
        }
    }

    fn admit(&self, key: &EndpointKey) -> PipelineResult<()> {
        if self.limiter.is_allowed(key) {
            Ok(())
        } else {
            Err(PipelineError::RateLimited {
                retry_after: self.limiter.time_until_reset(key),
            })
        }
    }

    async fn build_headers(
        &self,
        options: &RequestOptions,
        request_id: &RequestId,
        mutating: bool,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        if options.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        }
        if let Ok(id) = HeaderValue::from_str(request_id.as_str()) {
            headers.insert(HeaderName::from_static(X_REQUEST_ID), id);
        }
        if let Some(device_id) = &self.device_id {
            headers.insert(HeaderName::from_static(X_DEVICE_ID), device_id.clone());
        }

        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        if mutating {
            headers.extend(self.csrf.get_headers().await);
        }
        headers
    }

    /// Like [`send`](Self::send), tagging the result instead of failing.
    pub async fn outcome(&self, endpoint: &str, options: RequestOptions) -> RequestOutcome {
        self.send(endpoint, options).await.into()
    }

    pub async fn get(&self, endpoint: &str) -> PipelineResult<Value> {
        self.send(endpoint, RequestOptions::get()).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> PipelineResult<Value> {
        self.send(endpoint, RequestOptions::post(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: Value) -> PipelineResult<Value> {
        self.send(endpoint, RequestOptions::put(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: Value) -> PipelineResult<Value> {
        self.send(endpoint, RequestOptions::patch(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> PipelineResult<Value> {
        self.send(endpoint, RequestOptions::delete()).await
    }

    /// Start the periodic rate-limit sweep; it stops when `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        self.limiter.clone().spawn_sweeper(self.sweep_interval, shutdown)
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn csrf(&self) -> &Arc<CsrfTokenManager> {
        &self.csrf
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("base_url", &self.base_url.as_str())
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .field("recheck_rate_limit", &self.recheck_rate_limit)
            .finish_non_exhaustive()
    }
}
