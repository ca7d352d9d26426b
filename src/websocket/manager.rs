//! Feed connector
//!
//! Owns the connection state machine: connect, subscribe the whole
//! watch-set, apply ticks to the price store, and back off for a fixed delay
//! after any disconnect. Runs until shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::{FeedSession, FeedTransport, Frame};
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::metrics::Metrics;
use crate::parser::{ParsedMessage, SubscribeRequest, Tick};
use crate::shutdown::Shutdown;
use crate::store::{PriceStore, Symbol};

/// Text keep-alive understood by OKX, answered with `pong`
const TEXT_PING: &str = "ping";

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    Backoff,
}

/// Timing of the feed connection
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    /// Fixed wait between a disconnect and the next attempt
    pub reconnect_delay: Duration,
    /// Keep-alive ping period
    pub ping_interval: Duration,
    /// Maximum wait for a pong after a ping
    pub pong_timeout: Duration,
    /// Maximum wait for the connection handshake
    pub connect_timeout: Duration,
}

impl From<&Config> for FeedSettings {
    fn from(config: &Config) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Keeps the price store fed from the ticker stream
pub struct FeedConnector {
    transport: Box<dyn FeedTransport>,
    store: Arc<PriceStore>,
    metrics: Arc<Metrics>,
    settings: FeedSettings,
    symbols: Vec<Symbol>,
    state: watch::Sender<FeedState>,
    connect_attempts: AtomicU64,
}

impl FeedConnector {
    /// Create a new feed connector
    pub fn new(
        transport: Box<dyn FeedTransport>,
        store: Arc<PriceStore>,
        metrics: Arc<Metrics>,
        settings: FeedSettings,
    ) -> Self {
        let symbols = store.symbols();
        let (state, _) = watch::channel(FeedState::Disconnected);

        Self {
            transport,
            store,
            metrics,
            settings,
            symbols,
            state,
            connect_attempts: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    /// Connection attempts since creation
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Run the connector - reconnects forever until shutdown
    pub async fn run(&self, shutdown: Shutdown) -> Result<()> {
        info!(
            symbols = self.symbols.len(),
            reconnect_delay_ms = self.settings.reconnect_delay.as_millis() as u64,
            "Starting feed connector"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }

            match self.connect_and_process(&shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    error!(error = %e, attempt = self.connect_attempts(), "Feed connection lost");
                }
            }

            self.transition(FeedState::Backoff);
            warn!(
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "Reconnecting after backoff..."
            );

            tokio::select! {
                _ = sleep(self.settings.reconnect_delay) => {}
                _ = shutdown.wait() => break,
            }
        }

        self.transition(FeedState::Disconnected);
        info!("Feed connector stopped");
        Ok(())
    }

    /// One session: connect, subscribe, process until it drops.
    ///
    /// Returns `Ok` only when shutdown interrupted it.
    async fn connect_and_process(&self, shutdown: &Shutdown) -> Result<()> {
        self.transition(FeedState::Connecting);
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        self.metrics.feed_connects.inc();

        let mut session = tokio::select! {
            session = timeout(self.settings.connect_timeout, self.transport.connect()) => {
                session.map_err(|_| RelayError::ConnectionTimeout)??
            }
            _ = shutdown.wait() => return Ok(()),
        };

        let result = self.process_session(session.as_mut(), shutdown).await;

        session.close().await;
        self.metrics.feed_connected.set(0);
        result
    }

    async fn process_session(
        &self,
        session: &mut dyn FeedSession,
        shutdown: &Shutdown,
    ) -> Result<()> {
        let request = SubscribeRequest::tickers(&self.symbols);
        session.send_text(request.to_json()).await?;

        self.transition(FeedState::Subscribed);
        self.metrics.feed_connected.set(1);
        info!(symbols = ?self.symbols, "Subscribed to tickers");

        let period = self.settings.ping_interval;
        let mut ping_timer = interval_at(Instant::now() + period, period);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown.wait() => return Ok(()),
                _ = ping_timer.tick() => {
                    session.ping().await?;
                    session.send_text(TEXT_PING.to_string()).await?;
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + self.settings.pong_timeout);
                    }
                    trace!("Keep-alive ping sent");
                }
                _ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    warn!(timeout_ms = self.settings.pong_timeout.as_millis() as u64, "No pong received, reconnecting");
                    return Err(RelayError::PongTimeout(self.settings.pong_timeout));
                }
                frame = session.recv() => match frame? {
                    Frame::Text(text) => {
                        if self.process_message(&text) {
                            pong_deadline = None;
                        }
                    }
                    Frame::Pong => pong_deadline = None,
                    Frame::Control => {}
                },
            }
        }
    }

    /// Process a single text frame; returns true for a keep-alive reply
    fn process_message(&self, raw: &str) -> bool {
        match ParsedMessage::parse(raw) {
            Ok(ParsedMessage::Tickers { ticks, skipped }) => {
                if skipped > 0 {
                    self.metrics.messages_skipped.inc_by(skipped as u64);
                    debug!(skipped, "Ticker entries without usable price skipped");
                }
                for tick in ticks {
                    self.apply_tick(tick);
                }
                false
            }
            Ok(ParsedMessage::Event(event)) => {
                if event.event == "error" {
                    warn!(code = ?event.code, msg = ?event.msg, "Feed rejected request");
                } else {
                    debug!(event = %event.event, arg = ?event.arg, "Feed event");
                }
                false
            }
            Ok(ParsedMessage::Pong) => true,
            Ok(ParsedMessage::Unknown(msg)) => {
                trace!(msg = %msg, "Unknown message type");
                false
            }
            Err(e) => {
                self.metrics.messages_skipped.inc();
                warn!(error = %e, "Failed to parse message");
                false
            }
        }
    }

    fn apply_tick(&self, tick: Tick) {
        if !self.store.contains(&tick.symbol) {
            trace!(symbol = %tick.symbol, "Tick for symbol outside watch-set");
            return;
        }

        match self.store.set(&tick.symbol, tick.point) {
            Ok(()) => {
                self.metrics
                    .ticks_applied
                    .with_label_values(&[tick.symbol.as_str()])
                    .inc();
                trace!(symbol = %tick.symbol, last = ?tick.point.last, "Tick applied");
            }
            Err(e) => error!(error = %e, "Failed to apply tick"),
        }
    }

    fn transition(&self, next: FeedState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Feed state changed");
        }
    }
}
