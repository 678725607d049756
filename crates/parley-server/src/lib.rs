//! # Parley Server
//!
//! HTTP and WebSocket surface of the Parley chat gateway: configuration,
//! routes, the per-socket loop and Prometheus metrics.

pub mod config;
pub mod handlers;
pub mod metrics;
