//! Rust HFT TCP Client Library
//!
//! A low-latency client runtime that keeps one long-lived TCP connection to a
//! matching server, exchanges fixed-size binary frames from background tasks,
//! reconnects automatically after transient failures and measures round-trip
//! latency from echoed frame timestamps.
//!
//! # Modules
//!
//! - `config`: Configuration loading from .properties files
//! - `protocol`: Fixed-size frame wire format and order/market-data payloads
//! - `tracker`: Counters, latency aggregates and HdrHistogram percentiles
//! - `connection`: Connection state machine, tuned connect and auto-reconnect
//! - `sender`: Outbound queue and the single socket-writer task
//! - `receiver`: Poll- or event-driven receive loop and frame splitting
//! - `heartbeat`: Periodic keep-alive frames
//! - `handlers`: Callback registry for inbound frames
//! - `client`: The `HftClient` facade and task lifecycle

pub mod client;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod shutdown;
pub mod tracker;

// Re-export main types for convenience
pub use client::HftClient;
pub use config::{Config, ReceiveMode};
pub use connection::{ConnectError, ConnectionState};
pub use handlers::Handler;
pub use protocol::{Frame, MarketDataMessage, MessageStatus, MessageType, OrderMessage, Side, FRAME_SIZE};
pub use sender::SendError;
pub use tracker::{ClientStats, LatencyDistribution, StatsTracker, LATENCY_WINDOW_CAPACITY};
