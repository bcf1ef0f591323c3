//! Connection health scoring and rolling uptime accounting (§4.7).
//!
//! Generalizes the broker-stream `FeedHealthTracker`'s rolling-sample
//! pattern: rather than latency percentiles over a fixed metrics window,
//! this tracks the four booleans §4.7 names and samples their conjunction
//! into a ring buffer to compute uptime percentage over a configurable
//! window.

use std::collections::VecDeque;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::HealthMonitorConfig;
use crate::sync::listener::{PriceUpdate, SynchronizationListener};

struct Inner {
    connected: bool,
    connected_to_broker: bool,
    synchronized: bool,
    last_price_time: Option<Instant>,
    uptime_samples: VecDeque<(Instant, bool)>,
}

impl Inner {
    fn new() -> Self {
        Self {
            connected: false,
            connected_to_broker: false,
            synchronized: false,
            last_price_time: None,
            uptime_samples: VecDeque::new(),
        }
    }
}

/// Tracks `connected`/`connectedToBroker`/`synchronized`/`quoteStreamingHealthy`
/// for one account and aggregates them into `healthy` (§4.7).
#[derive(Debug)]
pub struct ConnectionHealthMonitor {
    config: HealthMonitorConfig,
    inner: RwLock<Inner>,
}

impl ConnectionHealthMonitor {
    /// A monitor with every signal initially unhealthy, matching a
    /// freshly created connection that has not yet observed anything.
    #[must_use]
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Whether the transport session is currently connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.inner.read().connected
    }

    /// Whether the broker-side connection is currently up.
    #[must_use]
    pub fn connected_to_broker(&self) -> bool {
        self.inner.read().connected_to_broker
    }

    /// Whether the terminal state has completed its initial synchronization.
    #[must_use]
    pub fn synchronized(&self) -> bool {
        self.inner.read().synchronized
    }

    /// Whether a price tick has arrived within `staleness_threshold` (§4.7:
    /// "derived from the gap between now and the most recent
    /// `onSymbolPriceUpdated`"). `false` if no tick has ever arrived.
    #[must_use]
    pub fn quote_streaming_healthy(&self) -> bool {
        self.inner
            .read()
            .last_price_time
            .is_some_and(|last| last.elapsed() <= self.config.staleness_threshold)
    }

    /// `healthy = AND(connected, connectedToBroker, synchronized,
    /// quoteStreamingHealthy)` (§4.7).
    #[must_use]
    pub fn healthy(&self) -> bool {
        let inner = self.inner.read();
        inner.connected
            && inner.connected_to_broker
            && inner.synchronized
            && inner
                .last_price_time
                .is_some_and(|last| last.elapsed() <= self.config.staleness_threshold)
    }

    /// Percentage (0.0-100.0) of samples within the rolling uptime window
    /// for which [`Self::healthy`] was true at sampling time. `None` if no
    /// sample has been taken yet.
    #[must_use]
    pub fn uptime_percentage(&self) -> Option<f64> {
        let inner = self.inner.read();
        if inner.uptime_samples.is_empty() {
            return None;
        }
        let healthy_count = inner.uptime_samples.iter().filter(|(_, healthy)| *healthy).count();
        #[allow(clippy::cast_precision_loss)]
        Some(healthy_count as f64 / inner.uptime_samples.len() as f64 * 100.0)
    }

    /// Take one sample of [`Self::healthy`] into the rolling window,
    /// evicting samples older than `uptime_window`.
    pub fn sample(&self) {
        let now = Instant::now();
        let healthy = self.healthy();
        let mut inner = self.inner.write();
        inner.uptime_samples.push_back((now, healthy));
        let window = self.config.uptime_window;
        while let Some(&(ts, _)) = inner.uptime_samples.front() {
            if now.duration_since(ts) > window {
                inner.uptime_samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Spawn the background task that calls [`Self::sample`] every
    /// `sampling_interval`, until `cancel` fires. Consumers typically hold
    /// this monitor behind an `Arc` so the spawned task can outlive the
    /// caller's stack frame.
    pub fn spawn_sampling(self: &std::sync::Arc<Self>, cancel: CancellationToken) {
        let monitor = std::sync::Arc::clone(self);
        let interval = monitor.config.sampling_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => monitor.sample(),
                    () = cancel.cancelled() => break,
                }
            }
        });
    }
}

#[async_trait]
impl SynchronizationListener for ConnectionHealthMonitor {
    async fn on_connected(&self, _instance_index: &str, _replicas: &[String]) {
        self.inner.write().connected = true;
    }

    async fn on_disconnected(&self, _instance_index: &str) {
        let mut inner = self.inner.write();
        inner.connected = false;
        inner.synchronized = false;
    }

    async fn on_broker_connection_status_changed(&self, _instance_index: &str, connected: bool) {
        self.inner.write().connected_to_broker = connected;
    }

    async fn on_synchronization_started(
        &self,
        _instance_index: &str,
        _specifications_updated: bool,
        _positions_updated: bool,
        _orders_updated: bool,
    ) {
        self.inner.write().synchronized = false;
    }

    async fn on_pending_orders_synchronized(&self, _instance_index: &str, _synchronization_id: &str) {
        self.inner.write().synchronized = true;
    }

    async fn on_symbol_prices_updated(&self, _instance_index: &str, _update: &PriceUpdate) {
        self.inner.write().last_price_time = Some(Instant::now());
    }

    async fn on_stream_closed(&self, _instance_index: &str) {
        let mut inner = self.inner.write();
        inner.connected = false;
        inner.connected_to_broker = false;
        inner.synchronized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn freshly_created_monitor_is_unhealthy() {
        let monitor = ConnectionHealthMonitor::new(HealthMonitorConfig::default());
        assert!(!monitor.healthy());
        assert!(!monitor.quote_streaming_healthy());
    }

    #[tokio::test]
    async fn healthy_requires_all_four_signals() {
        let monitor = ConnectionHealthMonitor::new(HealthMonitorConfig::default());
        monitor.on_connected("0", &[]).await;
        monitor.on_broker_connection_status_changed("0", true).await;
        monitor.on_pending_orders_synchronized("0", "sync-1").await;
        assert!(!monitor.healthy(), "no price tick yet, quote streaming unhealthy");

        monitor
            .on_symbol_prices_updated("0", &PriceUpdate::default())
            .await;
        assert!(monitor.healthy());
    }

    #[tokio::test]
    async fn disconnect_clears_synchronized_and_connected() {
        let monitor = ConnectionHealthMonitor::new(HealthMonitorConfig::default());
        monitor.on_connected("0", &[]).await;
        monitor.on_pending_orders_synchronized("0", "sync-1").await;
        monitor.on_disconnected("0").await;
        assert!(!monitor.connected());
        assert!(!monitor.synchronized());
    }

    #[tokio::test]
    async fn sample_records_current_healthy_state() {
        let monitor = ConnectionHealthMonitor::new(HealthMonitorConfig::default());
        assert_eq!(monitor.uptime_percentage(), None);
        monitor.sample();
        assert_eq!(monitor.uptime_percentage(), Some(0.0));

        monitor.on_connected("0", &[]).await;
        monitor.on_broker_connection_status_changed("0", true).await;
        monitor.on_pending_orders_synchronized("0", "sync-1").await;
        monitor
            .on_symbol_prices_updated("0", &PriceUpdate::default())
            .await;
        monitor.sample();
        assert_eq!(monitor.uptime_percentage(), Some(50.0));
    }
}
