//! Message sinks
//!
//! Delivers rendered snapshots to destinations. The Telegram sink talks to
//! the Bot API over HTTPS.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::DestinationId;
use crate::error::{RelayError, Result};

/// Where broadcast text goes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver text to one destination
    async fn deliver(&self, destination: &DestinationId, text: &str) -> Result<()>;

    /// Cheap liveness call against the messaging service
    async fn ping(&self) -> Result<()>;
}

/// Telegram Bot API sink
pub struct TelegramSink {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a DestinationId,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSink {
    pub fn new(api_base: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn check(&self, response: reqwest::Response, destination: &str) -> Result<()> {
        let status = response.status();
        let reply: ApiReply = response.json().await.map_err(|e| RelayError::Delivery {
            destination: destination.to_string(),
            reason: format!("HTTP {status}: {e}"),
        })?;

        if reply.ok {
            Ok(())
        } else {
            Err(RelayError::Delivery {
                destination: destination.to_string(),
                reason: reply
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            })
        }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn deliver(&self, destination: &DestinationId, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: destination,
            text: as_preformatted(text),
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Delivery {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;

        self.check(response, &destination.to_string()).await?;
        debug!(destination = %destination, "Message delivered");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/getMe", self.base_url))
            .send()
            .await?;
        self.check(response, "getMe").await
    }
}

/// Wrap text in a `<pre>` block so the fixed-width layout survives
pub fn as_preformatted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    out.push_str("<pre>");
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out.push_str("</pre>");
    out
}
