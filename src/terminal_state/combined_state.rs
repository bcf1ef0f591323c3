//! The caller-visible promoted view (§3 `CombinedState`, glossary
//! "Combined state"/"Promotion").
//!
//! Exactly one promotion path exists:
//! [`crate::terminal_state::TerminalState::on_pending_orders_synchronized`]
//! copies its owning instance's view here field-by-field. Readers never see
//! a torn update because the copy happens inside the single lock
//! acquisition (§5 "Shared resources").

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::models::{AccountInformation, Order, Position, SymbolPrice, SymbolSpecification};

use super::state::TerminalState;
use super::tombstone::TombstoneMap;

/// Thread-shared handle to a [`CombinedState`], the shape every external
/// consumer actually reads from.
pub type SharedCombinedState = Arc<RwLock<CombinedState>>;

/// The account-level projection promoted from whichever instance most
/// recently completed synchronization (§3, §4.4).
#[derive(Debug, Clone, Default)]
pub struct CombinedState {
    /// Whether the promoting instance was connected at promotion time.
    pub connected: bool,
    /// Whether the promoting instance was connected to the broker.
    pub connected_to_broker: bool,
    /// Latest promoted account information.
    pub account_information: Option<AccountInformation>,
    /// Latest promoted positions, keyed by id.
    pub positions: HashMap<String, Position>,
    /// Latest promoted pending orders, keyed by id.
    pub orders: HashMap<String, Order>,
    /// Latest promoted symbol specifications, keyed by symbol.
    pub specifications: HashMap<String, SymbolSpecification>,
    /// Latest promoted symbol prices, keyed by symbol.
    pub prices_by_symbol: HashMap<String, SymbolPrice>,
    /// Whether positions had completed their initial sync at promotion time.
    pub positions_initialized: bool,
    /// Whether orders had completed their initial sync at promotion time.
    pub orders_initialized: bool,
    /// Last time any promoted instance observed a price tick.
    pub last_update_time: Option<DateTime<Utc>>,
}

impl CombinedState {
    /// An empty combined state, as created at startup (§3 "created at
    /// startup and mutated only when an instance declares synchronization
    /// complete").
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh [`CombinedState`] for sharing across tasks.
    #[must_use]
    pub fn shared() -> SharedCombinedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Copy `instance`'s view into `self` (§4.4 `onPendingOrdersSynchronized`:
    /// "promotes this instance's view into the combined state"). Tombstone
    /// maps are intentionally not carried over — the combined state starts
    /// each promotion with empty ones, matching the instance's own
    /// post-synchronization state.
    pub fn promote_from(&mut self, instance: &TerminalState) {
        self.connected = instance.connected;
        self.connected_to_broker = instance.connected_to_broker;
        self.account_information = instance.account_information.clone();
        self.positions = instance.positions.clone();
        self.orders = instance.orders.clone();
        self.specifications = instance.specifications.clone();
        self.prices_by_symbol = instance.prices_by_symbol.clone();
        self.positions_initialized = instance.positions_initialized;
        self.orders_initialized = instance.orders_initialized;
        self.last_update_time = instance.last_update_time;
    }

    /// Tombstone maps are always empty immediately after a promotion; this
    /// accessor exists purely to document that invariant for callers
    /// migrating instance-level code against the combined view.
    #[must_use]
    pub fn empty_tombstones() -> (TombstoneMap, TombstoneMap) {
        (TombstoneMap::new(), TombstoneMap::new())
    }
}
