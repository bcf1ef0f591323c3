//! Synchronization orchestration: the observer contract, the connection
//! state machine that drives it, the request/reply facade, and connection
//! health tracking (§4.3/§4.5/§4.6/§4.7).

pub mod health_monitor;
pub mod listener;
pub mod rpc_connection;
pub mod streaming_connection;

pub use health_monitor::ConnectionHealthMonitor;
pub use listener::{HealthStatus, MarketDataSubscription, PriceUpdate, SynchronizationListener};
pub use rpc_connection::RpcConnection;
pub use streaming_connection::{InstanceState, StreamingConnection, WaitSynchronizedOptions};
