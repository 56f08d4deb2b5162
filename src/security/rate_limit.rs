//! Client-side sliding-window rate limiting per endpoint category.

use dashmap::DashMap;
use reqwest::Method;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::clock::{default_clock, Clock};
use crate::config::{RateLimitConfig, WindowConfig};
use crate::observability::metrics;

/// Coarse request class used to pick a rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointCategory {
    /// Overview and summary reads (most permissive).
    Overview,
    /// Reads of a known collection.
    Read,
    /// Writes to a known collection (strictest).
    Modification,
    /// Anything unrecognized.
    Default,
}

impl EndpointCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Read => "read",
            Self::Modification => "modification",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static admission policy for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl From<WindowConfig> for RateWindowPolicy {
    fn from(config: WindowConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Identifies what is being rate limited: method plus endpoint path.
///
/// The query string is not part of the key, so `/budgets?x=1` and
/// `/budgets?x=2` share one window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub method: Method,
    pub path: String,
}

impl EndpointKey {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if let Some(query) = path.find('?') {
            path.truncate(query);
        }
        Self { method, path }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Timestamps admitted inside the trailing window, oldest first.
#[derive(Debug, Default)]
struct RateWindowState {
    timestamps: VecDeque<Instant>,
}

impl RateWindowState {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter keyed by category and endpoint.
///
/// Each check purges stale timestamps and, when admitting, records the new
/// timestamp while the map shard is still locked, so two concurrent calls on
/// the same key can never both take the last slot.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindowState>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, default_clock())
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            config,
            clock,
        }
    }

    /// Classify a request. First match wins; unknown endpoints get `Default`.
    pub fn classify(&self, key: &EndpointKey) -> EndpointCategory {
        let path = key.path.to_ascii_lowercase();
        if !self.config.overview_marker.is_empty()
            && path.contains(&self.config.overview_marker.to_ascii_lowercase())
        {
            return EndpointCategory::Overview;
        }

        let in_collection = self
            .config
            .collections
            .iter()
            .any(|collection| targets_collection(&path, collection));
        if in_collection {
            if is_read_method(&key.method) {
                EndpointCategory::Read
            } else {
                EndpointCategory::Modification
            }
        } else {
            EndpointCategory::Default
        }
    }

    /// The policy applied to a category.
    pub fn policy(&self, category: EndpointCategory) -> RateWindowPolicy {
        let window = match category {
            EndpointCategory::Overview => self.config.overview,
            EndpointCategory::Read => self.config.read,
            EndpointCategory::Modification => self.config.modification,
            EndpointCategory::Default => self.config.default,
        };
        window.into()
    }

    /// Check-and-record: admit the request if its window has room.
    pub fn is_allowed(&self, key: &EndpointKey) -> bool {
        if !self.config.enabled {
            return true;
        }

        let category = self.classify(key);
        let policy = self.policy(category);
        let now = self.clock.now();

        let mut state = self.windows.entry(state_key(category, key)).or_default();
        state.purge(now, policy.window);

        if state.timestamps.len() < policy.max_requests as usize {
            state.timestamps.push_back(now);
            true
        } else {
            tracing::warn!(
                endpoint = %key,
                category = %category,
                limit = policy.max_requests,
                "Client-side rate limit reached"
            );
            metrics::record_rate_limited(category.as_str());
            false
        }
    }

    /// Time until the key admits another request (zero when under the limit).
    pub fn time_until_reset(&self, key: &EndpointKey) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }

        let category = self.classify(key);
        let policy = self.policy(category);
        let now = self.clock.now();

        let Some(mut state) = self.windows.get_mut(&state_key(category, key)) else {
            return Duration::ZERO;
        };
        state.purge(now, policy.window);

        if state.timestamps.len() < policy.max_requests as usize {
            return Duration::ZERO;
        }
        state
            .timestamps
            .front()
            .map(|oldest| (*oldest + policy.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Drop every key whose timestamps are all outside their window.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|key, state| {
            let window = self.policy(category_from_state_key(key)).window;
            state.purge(now, window);
            !state.timestamps.is_empty()
        });
        let remaining = self.windows.len();
        metrics::record_rate_limit_keys(remaining);
        before.saturating_sub(remaining)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Run [`RateLimiter::sweep`] periodically until shutdown is signalled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval = ?interval, "Rate limit sweeper starting");
            let mut ticker = time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.tracked_keys(), "Swept idle rate limit keys");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

fn state_key(category: EndpointCategory, key: &EndpointKey) -> String {
    format!("{}:{}", category, key)
}

fn category_from_state_key(state_key: &str) -> EndpointCategory {
    match state_key.split(':').next() {
        Some("overview") => EndpointCategory::Overview,
        Some("read") => EndpointCategory::Read,
        Some("modification") => EndpointCategory::Modification,
        _ => EndpointCategory::Default,
    }
}

/// True when one of the path's segments is exactly the collection name.
fn targets_collection(path: &str, collection: &str) -> bool {
    let collection = collection.trim_matches('/').to_ascii_lowercase();
    path.split(['/', '?'])
        .any(|segment| !segment.is_empty() && segment == collection)
}

fn is_read_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
