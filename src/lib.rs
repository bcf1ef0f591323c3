// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! termsync
//!
//! A reconnecting RPC client SDK that mirrors a remote trading terminal's
//! account state — positions, pending orders, account information, symbol
//! specifications and prices — over a persistent authenticated socket, and
//! exposes a typed request/reply facade for reads and trade commands.
//!
//! ## Layout
//!
//! - [`transport`]: the reconnecting socket multiplexer and wire vocabulary.
//! - [`terminal_state`]: the in-memory mirror, one instance per replica, and
//!   the single promoted combined view.
//! - [`sync`]: the observer contract, the per-account connection state
//!   machine that drives it, the request/reply facade, and health tracking.
//! - [`http`]: the sibling REST surface for account provisioning calls that
//!   don't go over the socket.
//! - [`trade`]: the `trade` command payload and reply shape.
//! - [`history`]: an in-memory sink for completed orders and deals.
//! - [`models`]: the wire/domain types shared across the above.
//! - [`error`]: the typed error taxonomy every fallible call returns.
//! - [`config`]: per-subsystem configuration.
//! - [`logging`]: process-wide `tracing` initialization.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod logging;
pub mod models;
pub mod sync;
pub mod terminal_state;
pub mod trade;
pub mod transport;

pub use config::{HealthMonitorConfig, HttpClientConfig, ReconnectConfig, TransportConfig};
pub use error::SdkError;
pub use history::HistoryStorage;
pub use http::HttpClient;
pub use logging::{init_logging, LoggingConfig};
pub use sync::{ConnectionHealthMonitor, RpcConnection, StreamingConnection, SynchronizationListener};
pub use terminal_state::{CombinedState, TerminalStateRegistry};
pub use trade::{TradeReply, TradeRequest};
pub use transport::TransportClient;
