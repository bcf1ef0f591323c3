//! Per-account synchronization orchestration (§4.5).
//!
//! Owns the per-`instanceIndex` state machine (`CREATED` → `SUBSCRIBED` →
//! `SYNCHRONIZING` → `SYNCHRONIZED` → `DISCONNECTED` → `SUBSCRIBED` | `CLOSED`,
//! §3), decodes [`TransportClient`] events into [`SynchronizationListener`]
//! calls, and fans each decoded packet out to every registered listener
//! sequentially, awaiting one before starting the next (§5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout as tokio_timeout;
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectConfig;
use crate::error::SdkError;
use crate::models::{AccountInformation, Order, Position, SymbolPrice, SymbolSpecification};
use crate::sync::listener::{HealthStatus, MarketDataSubscription, PriceUpdate, SynchronizationListener};
use crate::terminal_state::TerminalStateRegistry;
use crate::transport::packets::{event_type, request_type};
use crate::transport::reconnect::ReconnectPolicy;
use crate::transport::TransportClient;

/// Lifecycle of one `instanceIndex` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// No `subscribe` has been sent yet.
    Created,
    /// `subscribe` succeeded; no synchronize round has started.
    Subscribed,
    /// A `synchronize` request is outstanding or retrying.
    Synchronizing,
    /// `onPendingOrdersSynchronized` fired for the current round.
    Synchronized,
    /// The transport reported `disconnected` for this instance.
    Disconnected,
    /// `onStreamClosed` fired; the instance is torn down.
    Closed,
}

struct InstanceHandle {
    state: InstanceState,
    subscriptions: HashMap<String, Vec<MarketDataSubscription>>,
    should_synchronize: u64,
    retry: ReconnectPolicy,
    ever_subscribed: bool,
}

impl InstanceHandle {
    fn new() -> Self {
        Self {
            state: InstanceState::Created,
            subscriptions: HashMap::new(),
            should_synchronize: 0,
            retry: ReconnectPolicy::new(ReconnectConfig::synchronize_retry()),
            ever_subscribed: false,
        }
    }
}

/// Options for [`StreamingConnection::wait_synchronized`] (§4.5).
#[derive(Debug, Clone)]
pub struct WaitSynchronizedOptions {
    /// Restricts the wait to a specific instance; `None` accepts any.
    pub instance_index: Option<String>,
    /// Application identifier the caller is waiting on. Carried for
    /// protocol fidelity with the wire `synchronize` payload; this crate
    /// tracks synchronization per-instance rather than per-application, so
    /// it does not otherwise affect the wait.
    pub application_pattern: Option<String>,
    /// A specific synchronization round to wait for. Unused beyond
    /// documentation purposes: `is_synchronized` reflects only the most
    /// recent round.
    pub synchronization_id: Option<String>,
    /// How long to wait before giving up.
    pub timeout: Duration,
    /// Poll interval.
    pub interval: Duration,
}

impl Default for WaitSynchronizedOptions {
    /// §4.5: 300s timeout, 1000ms poll interval.
    fn default() -> Self {
        Self {
            instance_index: None,
            application_pattern: None,
            synchronization_id: None,
            timeout: Duration::from_secs(300),
            interval: Duration::from_millis(1000),
        }
    }
}

/// Orchestrates one account's subscribe/synchronize lifecycle and routes
/// decoded transport events to every registered listener (§4.5).
pub struct StreamingConnection {
    transport: Arc<TransportClient>,
    account_id: String,
    terminal_state: Arc<TerminalStateRegistry>,
    listeners: parking_lot::RwLock<Vec<Arc<dyn SynchronizationListener>>>,
    instances: parking_lot::RwLock<HashMap<String, InstanceHandle>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl StreamingConnection {
    /// Build a connection over `transport`, scoped to `account_id`, with
    /// `terminal_state` already registered as a listener.
    #[must_use]
    pub fn new(transport: Arc<TransportClient>, account_id: impl Into<String>, terminal_state: Arc<TerminalStateRegistry>) -> Arc<Self> {
        let connection = Arc::new(Self {
            transport,
            account_id: account_id.into(),
            terminal_state: Arc::clone(&terminal_state),
            listeners: parking_lot::RwLock::new(Vec::new()),
            instances: parking_lot::RwLock::new(HashMap::new()),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        connection.listeners.write().push(terminal_state);
        connection
    }

    /// Register an additional listener (history storage, a health monitor,
    /// a caller's own observer). Takes effect for events received after
    /// this call returns.
    pub fn add_listener(&self, listener: Arc<dyn SynchronizationListener>) {
        self.listeners.write().push(listener);
    }

    /// Start routing transport events to registered listeners. Idempotent.
    pub fn connect(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let connection = Arc::clone(self);
        let mut events = connection.transport.events();
        let cancel = connection.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        match event {
                            Ok(packet) => connection.dispatch_event(&packet).await,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }
        });
    }

    /// Stop routing events, abandon any pending retry timers, and fan out
    /// `onStreamClosed` for every tracked instance so listeners tear down
    /// their per-instance state (§3 lifecycle). There is no wire event for
    /// this — unlike every other `SynchronizationListener` callback, it is
    /// driven by the client closing the connection, not by a server packet.
    pub async fn close(&self) {
        let instance_indices: Vec<String> = self.instances.read().keys().cloned().collect();
        for instance_index in instance_indices {
            self.fan_out(|listener| {
                let instance_index = instance_index.clone();
                async move { listener.on_stream_closed(&instance_index).await }
            })
            .await;
        }
        self.instances.write().clear();
        self.cancel.cancel();
    }

    fn state(&self, instance_index: &str) -> InstanceState {
        self.instances
            .read()
            .get(instance_index)
            .map_or(InstanceState::Created, |handle| handle.state)
    }

    fn set_state(&self, instance_index: &str, state: InstanceState) {
        self.instances
            .write()
            .entry(instance_index.to_string())
            .or_insert_with(InstanceHandle::new)
            .state = state;
    }

    fn bump_generation(&self, instance_index: &str) -> u64 {
        let mut instances = self.instances.write();
        let handle = instances.entry(instance_index.to_string()).or_insert_with(InstanceHandle::new);
        handle.should_synchronize += 1;
        handle.should_synchronize
    }

    fn current_generation(&self, instance_index: &str) -> u64 {
        self.instances.read().get(instance_index).map_or(0, |handle| handle.should_synchronize)
    }

    /// `subscribe` (§6): join the account's replica set for `instance_index`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn subscribe(&self, instance_index: &str) -> Result<(), SdkError> {
        self.transport
            .request(request_type::SUBSCRIBE, &self.account_id, json!({ "instanceIndex": instance_index }))
            .await?;
        {
            let mut instances = self.instances.write();
            let handle = instances.entry(instance_index.to_string()).or_insert_with(InstanceHandle::new);
            handle.state = InstanceState::Subscribed;
            handle.ever_subscribed = true;
        }
        Ok(())
    }

    async fn try_synchronize(&self, instance_index: &str) -> Result<(), SdkError> {
        let hashes = self.terminal_state.get_hashes(instance_index);
        let payload = json!({
            "instanceIndex": instance_index,
            "specificationsMd5": hashes.specifications_md5,
            "positionsMd5": hashes.positions_md5,
            "ordersMd5": hashes.orders_md5,
        });
        self.transport.request(request_type::SYNCHRONIZE, &self.account_id, payload).await?;
        Ok(())
    }

    /// `synchronize` (§4.5/§6): request a delta-resume synchronization round
    /// for `instance_index`. On failure, schedules a retry with the 1s→300s
    /// doubling backoff (§4.5), cancelled if a newer `synchronize` call
    /// supersedes it before the retry fires.
    ///
    /// # Errors
    ///
    /// Returns the error from the first attempt; retries happen in the
    /// background and are not observable through this call's result.
    pub async fn synchronize(self: &Arc<Self>, instance_index: &str) -> Result<(), SdkError> {
        let generation = self.bump_generation(instance_index);
        self.set_state(instance_index, InstanceState::Synchronizing);

        match self.try_synchronize(instance_index).await {
            Ok(()) => {
                if let Some(handle) = self.instances.write().get_mut(instance_index) {
                    handle.retry.reset();
                }
                Ok(())
            }
            Err(err) => {
                self.schedule_retry(instance_index, generation);
                Err(err)
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, instance_index: &str, generation: u64) {
        let backoff = {
            let mut instances = self.instances.write();
            let handle = instances.entry(instance_index.to_string()).or_insert_with(InstanceHandle::new);
            handle.retry.next_backoff()
        };
        let Some(backoff) = backoff else {
            return;
        };

        let connection = Arc::clone(self);
        let instance_index = instance_index.to_string();
        let cancel = connection.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = cancel.cancelled() => return,
            }
            if connection.current_generation(&instance_index) != generation {
                return;
            }
            let _ = connection.synchronize(&instance_index).await;
        });
    }

    /// `waitSynchronized` (§4.5): poll until the target instance (or, with
    /// `instance_index: None`, any tracked instance) completes a
    /// synchronization round.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Timeout`] if `options.timeout` elapses first.
    pub async fn wait_synchronized(&self, options: &WaitSynchronizedOptions) -> Result<(), SdkError> {
        let deadline = Instant::now() + options.timeout;
        loop {
            let synchronized = match &options.instance_index {
                Some(index) => self.terminal_state.is_synchronized(index),
                None => {
                    let indices: Vec<String> = self.instances.read().keys().cloned().collect();
                    indices.iter().any(|index| self.terminal_state.is_synchronized(index))
                }
            };
            if synchronized {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SdkError::Timeout {
                    message: "timed out waiting for synchronization".to_string(),
                });
            }
            tokio::time::sleep(options.interval.min(remaining)).await;
        }
    }

    /// `subscribeToMarketData` (§4.5/§6): request quote streaming for
    /// `symbol` and wait up to `timeout` for the first tick. Returns `None`
    /// on timeout rather than an error, matching the "may legitimately have
    /// no price yet" semantics of a newly subscribed, illiquid symbol.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn subscribe_to_market_data(
        &self,
        instance_index: &str,
        symbol: &str,
        subscriptions: Vec<MarketDataSubscription>,
        timeout: Duration,
    ) -> Result<Option<SymbolPrice>, SdkError> {
        let waiter = self.terminal_state.register_price_waiter(instance_index, symbol);

        let payload = json!({
            "instanceIndex": instance_index,
            "symbol": symbol,
            "subscriptions": subscriptions
                .iter()
                .map(|s| json!({ "type": s.subscription_type }))
                .collect::<Vec<_>>(),
        });
        self.transport
            .request(request_type::SUBSCRIBE_TO_MARKET_DATA, &self.account_id, payload)
            .await?;

        {
            let mut instances = self.instances.write();
            let handle = instances.entry(instance_index.to_string()).or_insert_with(InstanceHandle::new);
            handle.subscriptions.insert(symbol.to_string(), subscriptions);
        }

        match tokio_timeout(timeout, waiter).await {
            Ok(Ok(price)) => Ok(Some(price)),
            Ok(Err(_)) | Err(_) => Ok(None),
        }
    }

    /// `unsubscribeFromMarketData` (§6).
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn unsubscribe_from_market_data(&self, instance_index: &str, symbol: &str) -> Result<(), SdkError> {
        self.transport
            .request(
                request_type::UNSUBSCRIBE_FROM_MARKET_DATA,
                &self.account_id,
                json!({ "instanceIndex": instance_index, "symbol": symbol }),
            )
            .await?;
        if let Some(handle) = self.instances.write().get_mut(instance_index) {
            handle.subscriptions.remove(symbol);
        }
        Ok(())
    }

    /// `removeHistory` (§6): clear server-side cached history for
    /// `instance_index`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn remove_history(&self, instance_index: &str) -> Result<(), SdkError> {
        self.transport
            .request(request_type::REMOVE_HISTORY, &self.account_id, json!({ "instanceIndex": instance_index }))
            .await?;
        Ok(())
    }

    /// `removeApplication` (§6): drop this application's subscription to
    /// the account entirely.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn remove_application(&self) -> Result<(), SdkError> {
        self.transport
            .request(request_type::REMOVE_APPLICATION, &self.account_id, Value::Null)
            .await?;
        Ok(())
    }

    async fn fan_out<F, Fut>(&self, call: F)
    where
        F: Fn(Arc<dyn SynchronizationListener>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let listeners: Vec<Arc<dyn SynchronizationListener>> = self.listeners.read().clone();
        for listener in listeners {
            call(listener).await;
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch_event(self: &Arc<Self>, packet: &Value) {
        let Some(kind) = packet.get("type").and_then(Value::as_str) else {
            return;
        };
        let instance_index = packet.get("instanceIndex").and_then(Value::as_str).unwrap_or("0").to_string();
        let synchronization_id = packet.get("synchronizationId").and_then(Value::as_str).unwrap_or_default().to_string();

        match kind {
            event_type::AUTHENTICATED => {
                let replicas: Vec<String> = packet
                    .get("replicas")
                    .and_then(Value::as_array)
                    .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                let was_subscribed = self
                    .instances
                    .read()
                    .get(&instance_index)
                    .is_some_and(|handle| handle.ever_subscribed);

                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let replicas = replicas.clone();
                    async move { listener.on_connected(&instance_index, &replicas).await }
                })
                .await;

                if was_subscribed {
                    let _ = self.subscribe(&instance_index).await;
                }
            }
            event_type::DISCONNECTED => {
                self.set_state(&instance_index, InstanceState::Disconnected);
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    async move { listener.on_disconnected(&instance_index).await }
                })
                .await;
            }
            event_type::SYNCHRONIZATION_STARTED => {
                let specifications_updated = packet.get("specificationsUpdated").and_then(Value::as_bool).unwrap_or(true);
                let positions_updated = packet.get("positionsUpdated").and_then(Value::as_bool).unwrap_or(true);
                let orders_updated = packet.get("ordersUpdated").and_then(Value::as_bool).unwrap_or(true);
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    async move {
                        listener
                            .on_synchronization_started(&instance_index, specifications_updated, positions_updated, orders_updated)
                            .await;
                    }
                })
                .await;
            }
            event_type::ACCOUNT_INFORMATION => {
                let Some(account_information) = packet
                    .get("accountInformation")
                    .and_then(|value| serde_json::from_value::<AccountInformation>(value.clone()).ok())
                else {
                    return;
                };
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let account_information = account_information.clone();
                    async move { listener.on_account_information_updated(&instance_index, &account_information).await }
                })
                .await;
            }
            event_type::POSITIONS => {
                let positions: Vec<Position> = packet
                    .get("positions")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or_default();
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let positions = positions.clone();
                    async move { listener.on_positions_replaced(&instance_index, &positions).await }
                })
                .await;
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let synchronization_id = synchronization_id.clone();
                    async move { listener.on_positions_synchronized(&instance_index, &synchronization_id).await }
                })
                .await;
            }
            event_type::ORDERS => {
                let orders: Vec<Order> = packet
                    .get("orders")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or_default();
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let orders = orders.clone();
                    async move { listener.on_pending_orders_replaced(&instance_index, &orders).await }
                })
                .await;
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let synchronization_id = synchronization_id.clone();
                    async move { listener.on_pending_orders_synchronized(&instance_index, &synchronization_id).await }
                })
                .await;
                self.set_state(&instance_index, InstanceState::Synchronized);
            }
            event_type::SPECIFICATIONS => {
                let updated: Vec<SymbolSpecification> = packet
                    .get("specifications")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or_default();
                let removed: Vec<String> = packet
                    .get("removedSymbols")
                    .and_then(Value::as_array)
                    .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let updated = updated.clone();
                    let removed = removed.clone();
                    async move { listener.on_symbol_specifications_updated(&instance_index, &updated, &removed).await }
                })
                .await;
            }
            event_type::UPDATE => self.dispatch_update(&instance_index, packet).await,
            event_type::PRICES => {
                let prices: Vec<SymbolPrice> = packet
                    .get("prices")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or_default();
                let update = PriceUpdate {
                    prices,
                    equity: packet.get("equity").and_then(Value::as_f64),
                    margin: packet.get("margin").and_then(Value::as_f64),
                    free_margin: packet.get("freeMargin").and_then(Value::as_f64),
                    margin_level: packet.get("marginLevel").and_then(Value::as_f64),
                };
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let update = update.clone();
                    async move { listener.on_symbol_prices_updated(&instance_index, &update).await }
                })
                .await;
            }
            event_type::DEAL_SYNCHRONIZATION_FINISHED => {
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let synchronization_id = synchronization_id.clone();
                    async move { listener.on_deals_synchronized(&instance_index, &synchronization_id).await }
                })
                .await;
            }
            event_type::ORDER_SYNCHRONIZATION_FINISHED => {
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let synchronization_id = synchronization_id.clone();
                    async move { listener.on_history_orders_synchronized(&instance_index, &synchronization_id).await }
                })
                .await;
            }
            event_type::HEALTH_STATUS => {
                let status = HealthStatus { raw: packet.clone() };
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let status = status.clone();
                    async move { listener.on_health_status(&instance_index, &status).await }
                })
                .await;
            }
            event_type::DOWNGRADE_SUBSCRIPTION => {
                let symbol = packet.get("symbol").and_then(Value::as_str).unwrap_or_default().to_string();
                let updates = parse_subscriptions(packet.get("updates"));
                let unsubscriptions = parse_subscriptions(packet.get("unsubscriptions"));
                self.fan_out(|listener| {
                    let instance_index = instance_index.clone();
                    let symbol = symbol.clone();
                    let updates = updates.clone();
                    let unsubscriptions = unsubscriptions.clone();
                    async move { listener.on_subscription_downgraded(&instance_index, &symbol, &updates, &unsubscriptions).await }
                })
                .await;
            }
            _ => {}
        }
    }

    async fn dispatch_update(&self, instance_index: &str, packet: &Value) {
        if let Some(positions) = packet.get("updatedPositions").and_then(Value::as_array) {
            for value in positions {
                if let Ok(position) = serde_json::from_value::<Position>(value.clone()) {
                    self.fan_out(|listener| {
                        let instance_index = instance_index.to_string();
                        let position = position.clone();
                        async move { listener.on_position_updated(&instance_index, &position).await }
                    })
                    .await;
                }
            }
        }
        if let Some(ids) = packet.get("removedPositionIds").and_then(Value::as_array) {
            for id in ids.iter().filter_map(Value::as_str) {
                self.fan_out(|listener| {
                    let instance_index = instance_index.to_string();
                    let id = id.to_string();
                    async move { listener.on_position_removed(&instance_index, &id).await }
                })
                .await;
            }
        }
        if let Some(orders) = packet.get("updatedOrders").and_then(Value::as_array) {
            for value in orders {
                if let Ok(order) = serde_json::from_value::<Order>(value.clone()) {
                    self.fan_out(|listener| {
                        let instance_index = instance_index.to_string();
                        let order = order.clone();
                        async move { listener.on_pending_order_updated(&instance_index, &order).await }
                    })
                    .await;
                }
            }
        }
        if let Some(ids) = packet.get("completedOrderIds").and_then(Value::as_array) {
            for id in ids.iter().filter_map(Value::as_str) {
                self.fan_out(|listener| {
                    let instance_index = instance_index.to_string();
                    let id = id.to_string();
                    async move { listener.on_pending_order_completed(&instance_index, &id).await }
                })
                .await;
            }
        }
        if let Some(specifications) = packet.get("updatedSpecifications").and_then(Value::as_array) {
            let updated: Vec<SymbolSpecification> = specifications
                .iter()
                .filter_map(|value| serde_json::from_value(value.clone()).ok())
                .collect();
            let removed: Vec<String> = packet
                .get("removedSpecificationSymbols")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            if !updated.is_empty() || !removed.is_empty() {
                self.fan_out(|listener| {
                    let instance_index = instance_index.to_string();
                    let updated = updated.clone();
                    let removed = removed.clone();
                    async move { listener.on_symbol_specifications_updated(&instance_index, &updated, &removed).await }
                })
                .await;
            }
        }
    }
}

fn parse_subscriptions(value: Option<&Value>) -> Vec<MarketDataSubscription> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("type").and_then(Value::as_str))
                .map(|subscription_type| MarketDataSubscription {
                    subscription_type: subscription_type.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::terminal_state::AccountType;

    fn connection() -> Arc<StreamingConnection> {
        let transport = Arc::new(TransportClient::new(TransportConfig::new("example.invalid", "tok")));
        let terminal_state = Arc::new(TerminalStateRegistry::new(AccountType::CloudG2));
        StreamingConnection::new(transport, "acct1", terminal_state)
    }

    #[test]
    fn fresh_instance_starts_in_created_state() {
        let connection = connection();
        assert_eq!(connection.state("0"), InstanceState::Created);
    }

    #[test]
    fn bump_generation_increments_monotonically() {
        let connection = connection();
        assert_eq!(connection.bump_generation("0"), 1);
        assert_eq!(connection.bump_generation("0"), 2);
        assert_eq!(connection.current_generation("0"), 2);
    }

    #[tokio::test]
    async fn wait_synchronized_times_out_when_nothing_ever_syncs() {
        let connection = connection();
        let options = WaitSynchronizedOptions {
            instance_index: Some("0".to_string()),
            timeout: Duration::from_millis(20),
            interval: Duration::from_millis(5),
            ..WaitSynchronizedOptions::default()
        };
        let result = connection.wait_synchronized(&options).await;
        assert!(matches!(result, Err(SdkError::Timeout { .. })));
    }

    #[tokio::test]
    async fn positions_packet_marks_positions_synchronized_via_registry() {
        let connection = connection();
        connection
            .dispatch_event(&json!({
                "type": "positions",
                "instanceIndex": "0",
                "synchronizationId": "sync-1",
                "positions": [],
            }))
            .await;
        assert!(!connection.terminal_state.is_synchronized("0"), "positions alone isn't full sync");

        connection
            .dispatch_event(&json!({
                "type": "orders",
                "instanceIndex": "0",
                "synchronizationId": "sync-1",
                "orders": [],
            }))
            .await;
        assert!(connection.terminal_state.is_synchronized("0"));
        assert_eq!(connection.state("0"), InstanceState::Synchronized);
    }

    #[tokio::test]
    async fn downgrade_subscription_parses_update_and_unsubscription_lists() {
        let connection = connection();
        connection
            .dispatch_event(&json!({
                "type": "downgradeSubscription",
                "instanceIndex": "0",
                "symbol": "EURUSD",
                "updates": [{"type": "quotes"}],
                "unsubscriptions": [{"type": "candles"}],
            }))
            .await;
        // No panic and no listener error is the behavior under test; the
        // registry does not track subscriptions itself.
    }

    #[tokio::test]
    async fn close_tears_down_every_tracked_instance() {
        let connection = connection();
        connection
            .dispatch_event(&json!({"type": "positions", "instanceIndex": "0", "positions": []}))
            .await;
        connection
            .dispatch_event(&json!({"type": "orders", "instanceIndex": "0", "orders": []}))
            .await;
        assert!(connection.terminal_state.is_synchronized("0"));

        connection.close().await;

        assert_eq!(connection.terminal_state.instance_count(), 0);
        assert!(connection.cancel.is_cancelled());
    }
}
