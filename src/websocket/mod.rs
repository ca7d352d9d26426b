//! WebSocket module for the OKX ticker feed
//!
//! The connector drives the connection state machine over a transport seam
//! so it can run against the real exchange or a scripted session.

mod client;
mod manager;

pub use client::{OkxTransport, WebSocketClient};
pub use manager::{FeedConnector, FeedSettings, FeedState};

use async_trait::async_trait;

use crate::error::Result;

/// Frame received from a feed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Transport-level pong
    Pong,
    /// Ping or other control frame already handled by the session
    Control,
}

/// Opens feed sessions
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedSession>>;
}

/// One live connection
#[async_trait]
pub trait FeedSession: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a transport-level ping
    async fn ping(&mut self) -> Result<()>;

    /// Next frame; an error means the session is over
    async fn recv(&mut self) -> Result<Frame>;

    async fn close(&mut self);
}
