//! OKX Market Relay Library
//!
//! Streams ticker prices for a fixed watch-set from the OKX public
//! WebSocket, keeps the latest price per symbol, and broadcasts a fixed-width
//! market report to Telegram chats on a schedule. Every long-running task
//! runs under a supervisor that restarts it until shutdown.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod format;
pub mod heartbeat;
pub mod metrics;
pub mod parser;
pub mod publisher;
pub mod rest;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod supervisor;
pub mod websocket;

pub use config::Config;
pub use error::{RelayError, Result};
pub use format::format_snapshot;
pub use metrics::Metrics;
pub use parser::{ParsedMessage, Tick};
pub use publisher::{BroadcastScheduler, Broadcaster, DeliveryReport, DestinationId, Destinations, MessageSink};
pub use service::{MarketRelay, RelayStatus};
pub use store::{PricePoint, PriceStore, Symbol};
pub use supervisor::Supervisor;
pub use websocket::{FeedConnector, FeedState};

/// Application state shared with the health server
pub struct AppState {
    pub relay: Arc<MarketRelay>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}
