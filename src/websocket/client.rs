//! WebSocket client for the OKX public stream
//!
//! Handles connection, outgoing frames and message reception.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::{FeedSession, FeedTransport, Frame};
use crate::error::{RelayError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
}

impl WebSocketClient {
    /// Connect to the WebSocket endpoint
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!(url = %endpoint, "Connecting to OKX WebSocket");

        let (ws_stream, response) = connect_async(endpoint).await.map_err(|e| {
            RelayError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        Ok(Self {
            stream: Some(ws_stream),
        })
    }

    fn stream_mut(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| RelayError::WebSocketConnection("Not connected".to_string()))
    }
}

#[async_trait]
impl FeedSession for WebSocketClient {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream_mut()?
            .send(Message::Text(text))
            .await
            .map_err(|e| RelayError::WebSocketMessage(e.to_string()))
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream_mut()?
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| RelayError::WebSocketMessage(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Frame> {
        let stream = self.stream_mut()?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Frame::Text(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Frame::Text(text))
            }
            // tungstenite queues the pong reply itself
            Some(Ok(Message::Ping(_))) => Ok(Frame::Control),
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(Frame::Pong)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(RelayError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(Frame::Control),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(RelayError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(RelayError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}

/// Connects to the OKX public endpoint
#[derive(Debug, Clone)]
pub struct OkxTransport {
    endpoint: String,
}

impl OkxTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FeedTransport for OkxTransport {
    async fn connect(&self) -> Result<Box<dyn FeedSession>> {
        let client = WebSocketClient::connect(&self.endpoint).await?;
        Ok(Box::new(client))
    }
}
