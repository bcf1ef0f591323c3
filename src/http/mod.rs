//! Strongly-typed REST access with taxonomy-aware retry (§4.2).

pub mod client;

pub use client::HttpClient;
