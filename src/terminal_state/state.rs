//! Per-instance mirror of a remote terminal's account state (§3, §4.4).
//!
//! [`TerminalState`] owns exactly one server-side replica's view. It is
//! mutated only by the callback methods below, each a direct translation of
//! one `SynchronizationListener` event (§4.3) into the invariants of §3.
//! Fan-out across instances and promotion into the combined view live one
//! level up, in [`crate::terminal_state::TerminalStateRegistry`].

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::models::{AccountInformation, Order, Platform, Position, SymbolPrice, SymbolSpecification};
use crate::sync::listener::PriceUpdate;

use super::hashes::{self, AccountType, Hashes};
use super::tombstone::TombstoneMap;

fn round_to_digits(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
    (value * factor).round() / factor
}

/// The in-memory mirror for one server-side replica (§3 `TerminalState`).
#[derive(Debug)]
pub struct TerminalState {
    pub(crate) connected: bool,
    pub(crate) connected_to_broker: bool,
    pub(crate) account_information: Option<AccountInformation>,
    pub(crate) positions: HashMap<String, Position>,
    pub(crate) orders: HashMap<String, Order>,
    pub(crate) specifications: HashMap<String, SymbolSpecification>,
    pub(crate) prices_by_symbol: HashMap<String, SymbolPrice>,
    pub(crate) completed_orders: TombstoneMap,
    pub(crate) removed_positions: TombstoneMap,
    pub(crate) positions_initialized: bool,
    pub(crate) orders_initialized: bool,
    /// True once every position currently held has a known price (§4.4 step
    /// 4). Gates equity recomputation alongside `positions_initialized`.
    pub(crate) prices_initialized: bool,
    pub(crate) last_update_time: Option<DateTime<Utc>>,
    price_waiters: HashMap<String, Vec<oneshot::Sender<SymbolPrice>>>,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalState {
    /// A freshly created instance state, as when the first packet arrives
    /// from a given `instanceIndex` (§3 lifecycle).
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: false,
            connected_to_broker: false,
            account_information: None,
            positions: HashMap::new(),
            orders: HashMap::new(),
            specifications: HashMap::new(),
            prices_by_symbol: HashMap::new(),
            completed_orders: TombstoneMap::new(),
            removed_positions: TombstoneMap::new(),
            positions_initialized: false,
            orders_initialized: false,
            prices_initialized: false,
            last_update_time: None,
            price_waiters: HashMap::new(),
        }
    }

    /// Whether both positions and orders have completed their initial sync.
    #[must_use]
    pub const fn is_synchronized(&self) -> bool {
        self.positions_initialized && self.orders_initialized
    }

    /// `onSynchronizationStarted` (§4.4): clears `accountInformation` and
    /// `pricesBySymbol` unconditionally, and conditionally resets whichever
    /// of positions/orders/specifications this round is refreshing.
    pub fn on_synchronization_started(
        &mut self,
        specifications_updated: bool,
        positions_updated: bool,
        orders_updated: bool,
    ) {
        self.account_information = None;
        self.prices_by_symbol.clear();
        self.prices_initialized = false;

        if positions_updated {
            self.positions.clear();
            self.removed_positions.clear();
            self.positions_initialized = false;
        }
        if orders_updated {
            self.orders.clear();
            self.completed_orders.clear();
            self.orders_initialized = false;
        }
        if specifications_updated {
            self.specifications.clear();
        }
    }

    /// `onAccountInformationUpdated`.
    pub fn on_account_information_updated(&mut self, account_information: AccountInformation) {
        self.account_information = Some(account_information);
    }

    /// `onPositionsReplaced`: the initial positions snapshot.
    pub fn on_positions_replaced(&mut self, positions: Vec<Position>) {
        self.positions = positions.into_iter().map(|p| (p.id.clone(), p)).collect();
    }

    /// `onPositionUpdated`: upsert by id, unless the id carries a live
    /// tombstone (§4.4).
    pub fn on_position_updated(&mut self, position: Position) {
        if self.removed_positions.contains(&position.id) {
            return;
        }
        self.positions.insert(position.id.clone(), position);
    }

    /// `onPositionRemoved`: delete if present, otherwise tombstone (§4.4).
    pub fn on_position_removed(&mut self, position_id: &str, now: Instant) {
        if self.positions.remove(position_id).is_none() {
            self.removed_positions.insert(position_id, now);
        }
    }

    /// `onPositionsSynchronized`: clears tombstones, marks positions
    /// initialized.
    pub fn on_positions_synchronized(&mut self) {
        self.removed_positions.clear();
        self.positions_initialized = true;
    }

    /// `onPendingOrdersReplaced`: the initial pending order snapshot.
    pub fn on_pending_orders_replaced(&mut self, orders: Vec<Order>) {
        self.orders = orders.into_iter().map(|o| (o.id.clone(), o)).collect();
    }

    /// `onPendingOrderUpdated`: upsert by id, unless tombstoned — symmetric
    /// to [`Self::on_position_updated`].
    pub fn on_pending_order_updated(&mut self, order: Order) {
        if self.completed_orders.contains(&order.id) {
            return;
        }
        self.orders.insert(order.id.clone(), order);
    }

    /// `onPendingOrderCompleted`: delete if present, otherwise tombstone —
    /// symmetric to [`Self::on_position_removed`].
    pub fn on_pending_order_completed(&mut self, order_id: &str, now: Instant) {
        if self.orders.remove(order_id).is_none() {
            self.completed_orders.insert(order_id, now);
        }
    }

    /// `onPendingOrdersSynchronized`: clears order tombstones and marks
    /// both collections initialized. `positionsInitialized` is set
    /// unconditionally here too, even if positions were not part of this
    /// synchronization round, matching upstream terminal behavior.
    /// Promotion into the combined state is the caller's responsibility
    /// (performed by the registry, which has access to both this instance
    /// and the shared combined state).
    pub fn on_pending_orders_synchronized(&mut self) {
        self.completed_orders.clear();
        self.orders_initialized = true;
        self.positions_initialized = true;
    }

    /// `onSymbolSpecificationsUpdated`.
    pub fn on_symbol_specifications_updated(&mut self, updated: Vec<SymbolSpecification>, removed: &[String]) {
        for spec in updated {
            self.specifications.insert(spec.symbol.clone(), spec);
        }
        for symbol in removed {
            self.specifications.remove(symbol);
        }
    }

    /// Register interest in the next price tick for `symbol`
    /// (`waitForPrice`, §4.5/§5). The caller is responsible for applying its
    /// own timeout (default 30s) around the returned receiver; timing out
    /// without a price returns `None` rather than erroring (§5).
    pub fn register_price_waiter(&mut self, symbol: &str) -> oneshot::Receiver<SymbolPrice> {
        let (tx, rx) = oneshot::channel();
        self.price_waiters.entry(symbol.to_string()).or_default().push(tx);
        rx
    }

    /// `onSymbolPricesUpdated`, the recomputation hot path (§4.4 step 1-7).
    pub fn on_symbol_prices_updated(&mut self, update: &PriceUpdate) {
        let mut updated_symbols = Vec::with_capacity(update.prices.len());

        for price in &update.prices {
            self.prices_by_symbol.insert(price.symbol.clone(), price.clone());
            updated_symbols.push(price.symbol.clone());
            self.last_update_time = Some(match self.last_update_time {
                Some(existing) => existing.max(price.time),
                None => price.time,
            });
        }

        for price in &update.prices {
            let Some(spec) = self.specifications.get(&price.symbol).cloned() else {
                // No specification yet for this symbol, so only the price cache updates.
                continue;
            };

            for position in self.positions.values_mut() {
                if position.symbol != price.symbol {
                    continue;
                }
                let is_buy = position.position_type.is_buy();
                let new_price = if is_buy { price.bid } else { price.ask };
                let direction = if is_buy { 1.0 } else { -1.0 };
                let delta = direction * (new_price - position.open_price);
                let tick_value = if delta > 0.0 {
                    price.profit_tick_value
                } else {
                    price.loss_tick_value
                };
                let unrealized = delta * tick_value * position.volume / spec.tick_size;
                position.unrealized_profit = round_to_digits(unrealized, spec.digits);
                position.profit = round_to_digits(position.unrealized_profit + position.realized_profit, spec.digits);
                position.current_price = new_price;
                position.current_tick_value = tick_value;
            }

            for order in self.orders.values_mut() {
                if order.symbol != price.symbol {
                    continue;
                }
                order.current_price = if order.order_type.is_buy_variant() {
                    price.ask
                } else {
                    price.bid
                };
            }
        }

        self.prices_initialized = self
            .positions
            .values()
            .all(|position| self.prices_by_symbol.contains_key(&position.symbol));

        if let Some(account_information) = self.account_information.as_mut() {
            if self.positions_initialized && self.prices_initialized {
                let swap_total: f64 = self.positions.values().map(|p| round_to_digits(p.swap, 2)).sum();
                let unrealized_total: f64 = self
                    .positions
                    .values()
                    .map(|p| round_to_digits(p.unrealized_profit, 2))
                    .sum();

                account_information.equity = match account_information.platform {
                    Platform::Mt5 => account_information.balance + unrealized_total + swap_total,
                    Platform::Mt4 => {
                        let commission_total: f64 =
                            self.positions.values().map(|p| round_to_digits(p.commission, 2)).sum();
                        account_information.balance + swap_total + commission_total + unrealized_total
                    }
                };
            } else if let Some(equity) = update.equity {
                account_information.equity = equity;
            }

            if let Some(margin) = update.margin {
                account_information.margin = margin;
            }
            if let Some(free_margin) = update.free_margin {
                account_information.free_margin = free_margin;
                // §9 open-question resolution: the margin_level assignment is
                // gated on `free_margin` being present, not `margin_level`
                // itself — preserved as a documented quirk rather than
                // silently "corrected".
                if let Some(margin_level) = update.margin_level {
                    account_information.margin_level = margin_level;
                }
            }
        }

        for symbol in updated_symbols {
            if let Some(waiters) = self.price_waiters.remove(&symbol) {
                if let Some(price) = self.prices_by_symbol.get(&symbol) {
                    for waiter in waiters {
                        let _ = waiter.send(price.clone());
                    }
                }
            }
        }
    }

    /// `getHashes(accountType)` (§4.4).
    #[must_use]
    pub fn get_hashes(&self, account_type: AccountType) -> Hashes {
        let specifications: Vec<SymbolSpecification> = self.specifications.values().cloned().collect();
        let positions: Vec<Position> = self.positions.values().cloned().collect();
        let orders: Vec<Order> = self.orders.values().cloned().collect();

        Hashes {
            specifications_md5: hashes::specifications_md5(&specifications, account_type),
            positions_md5: hashes::positions_md5(&positions, self.positions_initialized, account_type),
            orders_md5: hashes::orders_md5(&orders, self.orders_initialized, account_type),
        }
    }

    /// Read access to the currently held positions.
    #[must_use]
    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    /// Read access to the currently held pending orders.
    #[must_use]
    pub fn orders(&self) -> &HashMap<String, Order> {
        &self.orders
    }

    /// Read access to the current account information, if known.
    #[must_use]
    pub const fn account_information(&self) -> Option<&AccountInformation> {
        self.account_information.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderType, PositionType};

    fn position(id: &str, symbol: &str, position_type: PositionType, open_price: f64) -> Position {
        Position {
            id: id.to_string(),
            position_type,
            symbol: symbol.to_string(),
            volume: 1.0,
            open_price,
            current_price: open_price,
            current_tick_value: 0.0,
            stop_loss: None,
            take_profit: None,
            swap: -1.0,
            commission: 0.0,
            profit: 0.0,
            unrealized_profit: 0.0,
            realized_profit: 0.0,
            magic: 0,
            time: Utc::now(),
            update_time: Utc::now(),
            comment: None,
            client_id: None,
        }
    }

    fn spec(symbol: &str, digits: u32, tick_size: f64) -> SymbolSpecification {
        SymbolSpecification {
            symbol: symbol.to_string(),
            digits,
            tick_size,
            execution_mode: None,
            filling_modes: Vec::new(),
            description: None,
        }
    }

    fn price(symbol: &str, bid: f64, ask: f64) -> SymbolPrice {
        SymbolPrice {
            symbol: symbol.to_string(),
            bid,
            ask,
            profit_tick_value: 1.0,
            loss_tick_value: 1.0,
            time: Utc::now(),
        }
    }

    fn account_info(platform: Platform, balance: f64) -> AccountInformation {
        AccountInformation {
            platform,
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

    #[test]
    fn tombstone_replay_is_a_no_op() {
        let mut state = TerminalState::new();
        let now = Instant::now();
        state.on_position_removed("42", now);
        assert!(state.positions.is_empty());
        assert!(state.removed_positions.contains("42"));

        state.on_position_updated(position("42", "EURUSD", PositionType::Buy, 1.1));
        assert!(!state.positions.contains_key("42"));
    }

    #[test]
    fn completed_orders_mirror_tombstone_behavior() {
        let mut state = TerminalState::new();
        let now = Instant::now();
        state.on_pending_order_completed("7", now);
        assert!(state.completed_orders.contains("7"));

        let mut order = Order {
            id: "7".to_string(),
            order_type: OrderType::BuyLimit,
            state: "PLACED".to_string(),
            symbol: "EURUSD".to_string(),
            open_price: 1.1,
            current_price: 1.1,
            volume: 1.0,
            current_volume: 1.0,
            position_id: None,
            done_time: None,
            platform: Platform::Mt5,
        };
        state.on_pending_order_updated(order.clone());
        assert!(!state.orders.contains_key("7"));

        order.id = "8".to_string();
        state.on_pending_order_updated(order);
        assert!(state.orders.contains_key("8"));
    }

    #[test]
    fn equity_recomputation_on_mt5() {
        let mut state = TerminalState::new();
        state.on_account_information_updated(account_info(Platform::Mt5, 10000.0));
        // digits=3, tick_size=1.0 so the per-position unrealized profit comes
        // out to round numbers before the 2-decimal rounding the equity
        // aggregation applies on top.
        state.specifications.insert("EURUSD".to_string(), spec("EURUSD", 3, 1.0));

        let mut position_a = position("1", "EURUSD", PositionType::Buy, 0.0);
        position_a.swap = -1.0;
        let mut position_b = position("2", "EURUSD", PositionType::Sell, 0.0);
        position_b.swap = -2.0;
        state.on_positions_replaced(vec![position_a, position_b]);
        state.on_positions_synchronized();
        state.on_pending_orders_synchronized();

        let mut tick = price("EURUSD", 25.123, 10.0);
        tick.profit_tick_value = 1.0;
        tick.loss_tick_value = 1.0;
        let update = PriceUpdate {
            prices: vec![tick],
            equity: None,
            margin: None,
            free_margin: None,
            margin_level: None,
        };
        state.on_symbol_prices_updated(&update);

        assert_eq!(state.positions["1"].unrealized_profit, 25.123);
        assert_eq!(state.positions["2"].unrealized_profit, -10.0);

        let equity = state.account_information.as_ref().unwrap().equity;
        assert!((equity - 10012.12).abs() < 1e-9, "equity was {equity}");
    }

    #[test]
    fn invariant_profit_equals_unrealized_plus_realized() {
        let mut state = TerminalState::new();
        state.specifications.insert("EURUSD".to_string(), spec("EURUSD", 2, 0.0001));
        let mut pos = position("1", "EURUSD", PositionType::Buy, 1.1000);
        pos.realized_profit = 5.0;
        state.on_position_updated(pos);

        let update = PriceUpdate {
            prices: vec![price("EURUSD", 1.2000, 1.2000)],
            ..Default::default()
        };
        state.on_symbol_prices_updated(&update);

        let p = &state.positions["1"];
        assert!((p.profit - (p.unrealized_profit + p.realized_profit)).abs() < 0.01);
    }

    #[test]
    fn missing_specification_updates_only_the_price_cache() {
        let mut state = TerminalState::new();
        state.on_position_updated(position("1", "EURUSD", PositionType::Buy, 1.1000));

        let update = PriceUpdate {
            prices: vec![price("EURUSD", 1.2000, 1.2000)],
            ..Default::default()
        };
        state.on_symbol_prices_updated(&update);

        assert!(state.prices_by_symbol.contains_key("EURUSD"));
        let p = &state.positions["1"];
        assert_eq!(p.current_price, 1.1000);
    }

    #[test]
    fn unpriced_other_symbol_flags_prices_uninitialized() {
        let mut state = TerminalState::new();
        state.specifications.insert("EURUSD".to_string(), spec("EURUSD", 2, 0.0001));
        state.on_position_updated(position("1", "EURUSD", PositionType::Buy, 1.1000));
        state.on_position_updated(position("2", "GBPUSD", PositionType::Buy, 1.3000));

        let update = PriceUpdate {
            prices: vec![price("EURUSD", 1.2000, 1.2000)],
            ..Default::default()
        };
        state.on_symbol_prices_updated(&update);
        assert!(!state.prices_initialized);
    }

    #[tokio::test]
    async fn register_price_waiter_resolves_on_matching_tick() {
        let mut state = TerminalState::new();
        let rx = state.register_price_waiter("EURUSD");

        let update = PriceUpdate {
            prices: vec![price("EURUSD", 1.2, 1.2001)],
            ..Default::default()
        };
        state.on_symbol_prices_updated(&update);

        let resolved = rx.await.expect("waiter should resolve");
        assert_eq!(resolved.symbol, "EURUSD");
    }

    #[test]
    fn get_hashes_null_before_sync() {
        let state = TerminalState::new();
        let hashes = state.get_hashes(AccountType::CloudG2);
        assert_eq!(hashes.specifications_md5, None);
        assert_eq!(hashes.positions_md5, None);
        assert_eq!(hashes.orders_md5, None);
    }
}
