//! The observer contract every synchronization consumer implements (§4.3).
//!
//! Generalized into default *methods* on one trait rather than a
//! `Port`/`NoOpPort` pair, since §4.3 lists nineteen independent callbacks
//! and a caller typically only cares about a handful — overriding one
//! method must not force stub implementations of the other eighteen.

use async_trait::async_trait;

use crate::models::{AccountInformation, Order, SymbolPrice, SymbolSpecification, Position};

/// A symbol price update batch, as delivered to `onSymbolPricesUpdated`
/// (§4.3), bundled with the optional account-level fields the server may
/// supply alongside the tick.
#[derive(Debug, Clone, Default)]
pub struct PriceUpdate {
    /// The prices that ticked.
    pub prices: Vec<SymbolPrice>,
    /// Server-supplied equity, when present (otherwise the mirror
    /// recomputes it, §4.4 step 5).
    pub equity: Option<f64>,
    /// Server-supplied margin in use, when present.
    pub margin: Option<f64>,
    /// Server-supplied free margin, when present.
    pub free_margin: Option<f64>,
    /// Server-supplied margin level, when present.
    pub margin_level: Option<f64>,
}

/// Opaque transport/broker health report (§4.3 `onHealthStatus`). The wire
/// shape is broker-specific and open-ended; callers that need individual
/// fields can inspect `raw`.
#[derive(Debug, Clone, Default)]
pub struct HealthStatus {
    /// The as-received payload.
    pub raw: serde_json::Value,
}

/// One market data subscription entry, as carried by
/// `subscribeToMarketData`/`onSubscriptionDowngraded` (§4.5/§4.3). The
/// subscription vocabulary (`quotes`, `candles`, …) is broker-specific and
/// kept opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataSubscription {
    /// Subscription kind, e.g. `"quotes"`.
    pub subscription_type: String,
}

/// The full set of synchronization events a listener may observe (§4.3).
/// Every method has a no-op default, so implementors only override the
/// events they care about.
#[async_trait]
pub trait SynchronizationListener: Send + Sync {
    /// The transport (re)established a session for this instance; `replicas`
    /// lists the other replica `instanceIndex`es currently active for the
    /// account.
    async fn on_connected(&self, instance_index: &str, replicas: &[String]) {
        let _ = (instance_index, replicas);
    }

    /// The transport lost its session for this instance.
    async fn on_disconnected(&self, instance_index: &str) {
        let _ = instance_index;
    }

    /// The broker-side connection (as distinct from the transport socket)
    /// changed state.
    async fn on_broker_connection_status_changed(&self, instance_index: &str, connected: bool) {
        let _ = (instance_index, connected);
    }

    /// A synchronization round began; each flag indicates whether that
    /// collection is being refreshed in this round.
    async fn on_synchronization_started(
        &self,
        instance_index: &str,
        specifications_updated: bool,
        positions_updated: bool,
        orders_updated: bool,
    ) {
        let _ = (instance_index, specifications_updated, positions_updated, orders_updated);
    }

    /// A full or incremental account information snapshot arrived.
    async fn on_account_information_updated(&self, instance_index: &str, account_information: &AccountInformation) {
        let _ = (instance_index, account_information);
    }

    /// The full position set was replaced (initial sync snapshot).
    async fn on_positions_replaced(&self, instance_index: &str, positions: &[Position]) {
        let _ = (instance_index, positions);
    }

    /// A single position was created or updated.
    async fn on_position_updated(&self, instance_index: &str, position: &Position) {
        let _ = (instance_index, position);
    }

    /// A position was closed or otherwise removed.
    async fn on_position_removed(&self, instance_index: &str, position_id: &str) {
        let _ = (instance_index, position_id);
    }

    /// The initial position synchronization round completed.
    async fn on_positions_synchronized(&self, instance_index: &str, synchronization_id: &str) {
        let _ = (instance_index, synchronization_id);
    }

    /// The full pending order set was replaced (initial sync snapshot).
    async fn on_pending_orders_replaced(&self, instance_index: &str, orders: &[Order]) {
        let _ = (instance_index, orders);
    }

    /// A single pending order was created or updated.
    async fn on_pending_order_updated(&self, instance_index: &str, order: &Order) {
        let _ = (instance_index, order);
    }

    /// A pending order reached a terminal state (filled, cancelled, expired).
    async fn on_pending_order_completed(&self, instance_index: &str, order_id: &str) {
        let _ = (instance_index, order_id);
    }

    /// The initial pending order synchronization round completed. This is
    /// the only event that promotes an instance's view into the combined
    /// state (§4.4).
    async fn on_pending_orders_synchronized(&self, instance_index: &str, synchronization_id: &str) {
        let _ = (instance_index, synchronization_id);
    }

    /// Historical order synchronization completed.
    async fn on_history_orders_synchronized(&self, instance_index: &str, synchronization_id: &str) {
        let _ = (instance_index, synchronization_id);
    }

    /// Deal history synchronization completed.
    async fn on_deals_synchronized(&self, instance_index: &str, synchronization_id: &str) {
        let _ = (instance_index, synchronization_id);
    }

    /// Symbol specifications were added/updated or removed.
    async fn on_symbol_specifications_updated(
        &self,
        instance_index: &str,
        updated: &[SymbolSpecification],
        removed: &[String],
    ) {
        let _ = (instance_index, updated, removed);
    }

    /// One or more symbol prices ticked (§4.4's recomputation hot path).
    async fn on_symbol_prices_updated(&self, instance_index: &str, update: &PriceUpdate) {
        let _ = (instance_index, update);
    }

    /// A transport/broker health report arrived.
    async fn on_health_status(&self, instance_index: &str, status: &HealthStatus) {
        let _ = (instance_index, status);
    }

    /// The server downgraded a market data subscription, e.g. because a
    /// plan limit was reached.
    async fn on_subscription_downgraded(
        &self,
        instance_index: &str,
        symbol: &str,
        updates: &[MarketDataSubscription],
        unsubscriptions: &[MarketDataSubscription],
    ) {
        let _ = (instance_index, symbol, updates, unsubscriptions);
    }

    /// The server closed the stream for this instance; per-instance state
    /// should be torn down (§3 lifecycle).
    async fn on_stream_closed(&self, instance_index: &str) {
        let _ = instance_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mute;

    #[async_trait]
    impl SynchronizationListener for Mute {}

    #[tokio::test]
    async fn default_methods_are_all_no_ops() {
        let listener = Mute;
        listener.on_connected("0", &[]).await;
        listener.on_disconnected("0").await;
        listener.on_broker_connection_status_changed("0", true).await;
        listener.on_synchronization_started("0", true, true, true).await;
        listener.on_positions_synchronized("0", "sync-1").await;
        listener.on_pending_orders_synchronized("0", "sync-1").await;
        listener.on_stream_closed("0").await;
        // Reaching here without panicking demonstrates every default body
        // is a genuine no-op.
    }
}
