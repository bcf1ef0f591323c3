//! Typed configuration for every subsystem (§4.10).
//!
//! Each struct follows the same convention: a `Default` impl with the
//! standard numbers, plus `with_*` builder methods returning `Self`.

use std::time::Duration;

/// Configuration for [`crate::transport::TransportClient`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Domain the socket endpoint is hosted under
    /// (`wss://mt-provisioning-api-v1.<domain>/ws`, §6).
    pub domain: String,
    /// Auth token sent as the `auth-token` query parameter.
    pub auth_token: String,
    /// Reconnect policy (§6: 1s initial, 5s max, unlimited attempts).
    pub reconnect: ReconnectConfig,
    /// Timeout for an individual `request()` round trip.
    pub request_timeout: Duration,
}

impl TransportConfig {
    /// Create a new configuration with the standard reconnect defaults.
    #[must_use]
    pub fn new(domain: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            auth_token: auth_token.into(),
            reconnect: ReconnectConfig::default(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Override the reconnect policy.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The full websocket URL (`/ws` path, §6).
    #[must_use]
    pub fn socket_url(&self) -> String {
        format!(
            "wss://mt-provisioning-api-v1.{}/ws?auth-token={}",
            self.domain, self.auth_token
        )
    }
}

/// Reconnect backoff parameters, reused by `TransportClient` (§4.1) and
/// `StreamingConnection`'s synchronize-retry loop (§4.5), which each carry
/// their own instance since the two use different numbers
/// (1s/5s unlimited vs. `retryInterval`/300s cap).
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Initial backoff before the first retry.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Multiplier applied to the backoff on each consecutive failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    /// §6: 1s initial delay, 5s max delay.
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// The synchronize-retry cadence from §4.5: same 1s initial delay, but
    /// doubling up to a 300-second cap instead of transport's 5-second cap.
    #[must_use]
    pub const fn synchronize_retry() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

/// Configuration for [`crate::http::HttpClient`] (§4.2).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for REST calls.
    pub base_url: String,
    /// Maximum number of retries for `ApiError`/`InternalError` (default 2,
    /// i.e. up to 3 total calls).
    pub retries: u32,
    /// Budget, in seconds, for 202-polling and `TooManyRequestsError` waits.
    pub max_delay_in_seconds: u64,
    /// Per-call HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            retries: 2,
            max_delay_in_seconds: 300,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl HttpClientConfig {
    /// Create a configuration pointed at `base_url`, with the standard defaults.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Override the retry ceiling.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Override the max-delay budget.
    #[must_use]
    pub const fn with_max_delay_in_seconds(mut self, secs: u64) -> Self {
        self.max_delay_in_seconds = secs;
        self
    }
}

/// Configuration for [`crate::sync::ConnectionHealthMonitor`] (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    /// How long since the last `onSymbolPriceUpdated` before
    /// `quoteStreamingHealthy` flips false.
    pub staleness_threshold: Duration,
    /// How often `healthy` is sampled into the rolling uptime window.
    pub sampling_interval: Duration,
    /// Size of the rolling uptime window.
    pub uptime_window: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(60),
            sampling_interval: Duration::from_secs(60),
            uptime_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}
