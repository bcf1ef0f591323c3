//! The reconnecting socket RPC multiplexer and its wire-level helpers
//! (§4.1, §6).

pub mod client;
pub mod codec;
pub mod packets;
pub mod reconnect;

pub use client::{InboundEvent, TransportClient};
pub use reconnect::ReconnectPolicy;
