//! The in-memory terminal-state mirror (§3/§4.4) and its fan-out across
//! concurrently active replicas.
//!
//! [`TerminalState`] owns one replica's view; [`TerminalStateRegistry`]
//! creates one per `instanceIndex` on first packet, routes every
//! `SynchronizationListener` event to it, and is the sole place that
//! promotes an instance's view into the shared [`CombinedState`] — exactly
//! once, from `onPendingOrdersSynchronized` (§4.4, glossary "Promotion").

pub mod combined_state;
pub mod hashes;
pub mod state;
pub mod tombstone;

pub use combined_state::{CombinedState, SharedCombinedState};
pub use hashes::{AccountType, Hashes};
pub use state::TerminalState;
pub use tombstone::TombstoneMap;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::models::{AccountInformation, Order, Position, SymbolPrice, SymbolSpecification};
use crate::sync::listener::{PriceUpdate, SynchronizationListener};

/// Per-account registry of per-instance mirrors, fronted by one shared
/// combined view (§3 lifecycle).
#[derive(Debug)]
pub struct TerminalStateRegistry {
    account_type: AccountType,
    instances: RwLock<HashMap<String, TerminalState>>,
    combined: SharedCombinedState,
}

impl TerminalStateRegistry {
    /// A fresh registry with no instances and an empty combined state.
    #[must_use]
    pub fn new(account_type: AccountType) -> Self {
        Self {
            account_type,
            instances: RwLock::new(HashMap::new()),
            combined: CombinedState::shared(),
        }
    }

    /// A cloneable handle to the promoted combined view.
    #[must_use]
    pub fn combined_state(&self) -> SharedCombinedState {
        Arc::clone(&self.combined)
    }

    fn with_instance<R>(&self, instance_index: &str, f: impl FnOnce(&mut TerminalState) -> R) -> R {
        let mut instances = self.instances.write();
        let instance = instances
            .entry(instance_index.to_string())
            .or_insert_with(TerminalState::new);
        f(instance)
    }

    /// The three content hashes for `instance_index`'s current view
    /// (`getHashes`, §4.4), for use by `StreamingConnection::synchronize`.
    #[must_use]
    pub fn get_hashes(&self, instance_index: &str) -> Hashes {
        self.with_instance(instance_index, |instance| instance.get_hashes(self.account_type))
    }

    /// Whether `instance_index` has completed both position and order
    /// synchronization.
    #[must_use]
    pub fn is_synchronized(&self, instance_index: &str) -> bool {
        self.instances
            .read()
            .get(instance_index)
            .is_some_and(TerminalState::is_synchronized)
    }

    /// Number of instances currently tracked (mostly useful for tests and
    /// diagnostics).
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Register a one-shot waiter for `symbol`'s next price on `instance_index`,
    /// for `StreamingConnection::subscribe_to_market_data` (§4.5).
    pub fn register_price_waiter(&self, instance_index: &str, symbol: &str) -> oneshot::Receiver<SymbolPrice> {
        self.with_instance(instance_index, |instance| instance.register_price_waiter(symbol))
    }
}

#[async_trait]
impl SynchronizationListener for TerminalStateRegistry {
    async fn on_connected(&self, instance_index: &str, _replicas: &[String]) {
        self.with_instance(instance_index, |instance| instance.connected = true);
    }

    async fn on_disconnected(&self, instance_index: &str) {
        self.with_instance(instance_index, |instance| instance.connected = false);
    }

    async fn on_broker_connection_status_changed(&self, instance_index: &str, connected: bool) {
        self.with_instance(instance_index, |instance| instance.connected_to_broker = connected);
    }

    async fn on_synchronization_started(
        &self,
        instance_index: &str,
        specifications_updated: bool,
        positions_updated: bool,
        orders_updated: bool,
    ) {
        self.with_instance(instance_index, |instance| {
            instance.on_synchronization_started(specifications_updated, positions_updated, orders_updated);
        });
    }

    async fn on_account_information_updated(&self, instance_index: &str, account_information: &AccountInformation) {
        self.with_instance(instance_index, |instance| {
            instance.on_account_information_updated(account_information.clone());
        });
    }

    async fn on_positions_replaced(&self, instance_index: &str, positions: &[Position]) {
        self.with_instance(instance_index, |instance| {
            instance.on_positions_replaced(positions.to_vec());
        });
    }

    async fn on_position_updated(&self, instance_index: &str, position: &Position) {
        self.with_instance(instance_index, |instance| {
            instance.on_position_updated(position.clone());
        });
    }

    async fn on_position_removed(&self, instance_index: &str, position_id: &str) {
        let now = Instant::now();
        self.with_instance(instance_index, |instance| instance.on_position_removed(position_id, now));
    }

    async fn on_positions_synchronized(&self, instance_index: &str, _synchronization_id: &str) {
        self.with_instance(instance_index, TerminalState::on_positions_synchronized);
    }

    async fn on_pending_orders_replaced(&self, instance_index: &str, orders: &[Order]) {
        self.with_instance(instance_index, |instance| {
            instance.on_pending_orders_replaced(orders.to_vec());
        });
    }

    async fn on_pending_order_updated(&self, instance_index: &str, order: &Order) {
        self.with_instance(instance_index, |instance| {
            instance.on_pending_order_updated(order.clone());
        });
    }

    async fn on_pending_order_completed(&self, instance_index: &str, order_id: &str) {
        let now = Instant::now();
        self.with_instance(instance_index, |instance| instance.on_pending_order_completed(order_id, now));
    }

    async fn on_pending_orders_synchronized(&self, instance_index: &str, _synchronization_id: &str) {
        let mut instances = self.instances.write();
        let instance = instances
            .entry(instance_index.to_string())
            .or_insert_with(TerminalState::new);
        instance.on_pending_orders_synchronized();
        self.combined.write().promote_from(instance);
    }

    async fn on_symbol_specifications_updated(
        &self,
        instance_index: &str,
        updated: &[SymbolSpecification],
        removed: &[String],
    ) {
        self.with_instance(instance_index, |instance| {
            instance.on_symbol_specifications_updated(updated.to_vec(), removed);
        });
    }

    async fn on_symbol_prices_updated(&self, instance_index: &str, update: &PriceUpdate) {
        self.with_instance(instance_index, |instance| instance.on_symbol_prices_updated(update));
    }

    async fn on_stream_closed(&self, instance_index: &str) {
        self.instances.write().remove(instance_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn account_info(balance: f64) -> AccountInformation {
        AccountInformation {
            platform: Platform::Mt5,
            broker: "Broker".to_string(),
            currency: "USD".to_string(),
            server: "Server".to_string(),
            balance,
            equity: balance,
            margin: 0.0,
            free_margin: balance,
            leverage: 100.0,
            margin_level: 0.0,
        }
    }

    #[tokio::test]
    async fn last_promotion_wins_with_no_mixed_state() {
        let registry = TerminalStateRegistry::new(AccountType::CloudG2);

        registry.on_account_information_updated("0", &account_info(1000.0)).await;
        registry.on_pending_orders_synchronized("0", "sync-0").await;

        let combined = registry.combined_state();
        assert_eq!(combined.read().account_information.as_ref().unwrap().balance, 1000.0);

        registry.on_account_information_updated("1", &account_info(5000.0)).await;
        registry.on_pending_orders_synchronized("1", "sync-1").await;

        assert_eq!(combined.read().account_information.as_ref().unwrap().balance, 5000.0);
    }

    #[tokio::test]
    async fn stream_closed_destroys_instance_state() {
        let registry = TerminalStateRegistry::new(AccountType::CloudG2);
        registry.on_connected("0", &[]).await;
        assert_eq!(registry.instance_count(), 1);

        registry.on_stream_closed("0").await;
        assert_eq!(registry.instance_count(), 0);
    }

    #[tokio::test]
    async fn instances_are_created_lazily_on_first_event() {
        let registry = TerminalStateRegistry::new(AccountType::CloudG2);
        assert_eq!(registry.instance_count(), 0);
        assert!(!registry.is_synchronized("0"));

        registry.on_positions_synchronized("0", "sync-0").await;
        assert_eq!(registry.instance_count(), 1);
        assert!(!registry.is_synchronized("0"));

        registry.on_pending_orders_synchronized("0", "sync-0").await;
        assert!(registry.is_synchronized("0"));
    }
}
