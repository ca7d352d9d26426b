//! Configuration module for the market relay

use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::publisher::DestinationId;

/// Watch-set used when `WATCH_SYMBOLS` is not set
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "BTC-USDT", "ETH-USDT", "DOGE-USDT", "SOL-USDT", "BNB-USDT", "XRP-USDT", "TRX-USDT",
    "USDC-USDT",
];

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Ordered watch-set in OKX instrument format (e.g., ["BTC-USDT", "ETH-USDT"])
    pub symbols: Vec<String>,

    /// OKX public WebSocket endpoint
    pub ws_endpoint: String,

    /// OKX REST API base (v5)
    pub rest_endpoint: String,

    /// Telegram Bot API base
    pub telegram_api: String,

    /// Telegram bot token
    pub bot_token: String,

    /// Destinations that receive the scheduled broadcast at startup
    pub destinations: Vec<String>,

    /// Feed settings
    pub reconnect_delay_ms: u64,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
    pub connect_timeout_secs: u64,

    /// Broadcast settings
    pub broadcast_interval_secs: u64,
    pub delivery_timeout_secs: u64,

    /// Supervision settings
    pub restart_delay_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub shutdown_grace_secs: u64,

    /// Bind address of the health/metrics server
    pub health_addr: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            symbols: env::var("WATCH_SYMBOLS")
                .map(|raw| split_list(&raw, true))
                .unwrap_or(defaults.symbols),
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            rest_endpoint: env::var("REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            telegram_api: env::var("TELEGRAM_API").unwrap_or(defaults.telegram_api),
            bot_token: env::var("BOT_TOKEN").unwrap_or_default(),
            destinations: env::var("BROADCAST_DESTINATIONS")
                .map(|raw| split_list(&raw, false))
                .unwrap_or_default(),
            reconnect_delay_ms: env_or("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            ping_interval_secs: env_or("PING_INTERVAL_SECS", defaults.ping_interval_secs),
            pong_timeout_secs: env_or("PONG_TIMEOUT_SECS", defaults.pong_timeout_secs),
            connect_timeout_secs: env_or("CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            broadcast_interval_secs: env_or(
                "BROADCAST_INTERVAL_SECS",
                defaults.broadcast_interval_secs,
            ),
            delivery_timeout_secs: env_or("DELIVERY_TIMEOUT_SECS", defaults.delivery_timeout_secs),
            restart_delay_ms: env_or("RESTART_DELAY_MS", defaults.restart_delay_ms),
            heartbeat_interval_secs: env_or(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            ),
            shutdown_grace_secs: env_or("SHUTDOWN_GRACE_SECS", defaults.shutdown_grace_secs),
            health_addr: env::var("HEALTH_ADDR").unwrap_or(defaults.health_addr),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(RelayError::ConfigError("watch-set is empty".to_string()));
        }
        if self.bot_token.trim().is_empty() {
            return Err(RelayError::ConfigError("BOT_TOKEN is not set".to_string()));
        }
        let zero = [
            ("RECONNECT_DELAY_MS", self.reconnect_delay_ms),
            ("PING_INTERVAL_SECS", self.ping_interval_secs),
            ("PONG_TIMEOUT_SECS", self.pong_timeout_secs),
            ("CONNECT_TIMEOUT_SECS", self.connect_timeout_secs),
            ("BROADCAST_INTERVAL_SECS", self.broadcast_interval_secs),
            ("DELIVERY_TIMEOUT_SECS", self.delivery_timeout_secs),
            ("RESTART_DELAY_MS", self.restart_delay_ms),
            ("HEARTBEAT_INTERVAL_SECS", self.heartbeat_interval_secs),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, value)| *value == 0) {
            return Err(RelayError::ConfigError(format!("{name} must be greater than zero")));
        }
        self.health_socket_addr()?;
        self.initial_destinations()?;
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn health_socket_addr(&self) -> Result<SocketAddr> {
        self.health_addr.parse().map_err(|e| {
            RelayError::ConfigError(format!("invalid HEALTH_ADDR {}: {}", self.health_addr, e))
        })
    }

    /// Parse the configured destination list
    pub fn initial_destinations(&self) -> Result<Vec<DestinationId>> {
        self.destinations
            .iter()
            .map(|raw| raw.parse::<DestinationId>())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            ws_endpoint: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            rest_endpoint: "https://www.okx.com/api/v5".to_string(),
            telegram_api: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            destinations: Vec::new(),
            reconnect_delay_ms: 5_000,
            ping_interval_secs: 20,
            pong_timeout_secs: 10,
            connect_timeout_secs: 10,
            broadcast_interval_secs: 600,
            delivery_timeout_secs: 10,
            restart_delay_ms: 5_000,
            heartbeat_interval_secs: 30,
            shutdown_grace_secs: 3,
            health_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma separated list, dropping blanks and repeats (first occurrence wins)
fn split_list(raw: &str, uppercase: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let item = if uppercase {
            item.to_uppercase()
        } else {
            item.to_string()
        };
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
