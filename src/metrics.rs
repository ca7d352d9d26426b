//! Prometheus metrics for the relay

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Counters and gauges owned by one registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Ticks written to the store, by symbol
    pub ticks_applied: IntCounterVec,
    /// Frames or entries that could not be used
    pub messages_skipped: IntCounter,
    /// Connection attempts to the feed
    pub feed_connects: IntCounter,
    /// 1 while the feed is subscribed
    pub feed_connected: IntGauge,
    /// Delivery attempts, by outcome
    pub deliveries: IntCounterVec,
    /// Broadcast cycles, by outcome
    pub broadcast_cycles: IntCounterVec,
    /// Supervised task restarts, by task
    pub task_restarts: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("market_relay".to_string()), None)?;

        let ticks_applied = IntCounterVec::new(
            Opts::new("ticks_applied_total", "Ticks written to the price store"),
            &["symbol"],
        )?;
        let messages_skipped = IntCounter::new(
            "messages_skipped_total",
            "Feed frames or entries that were malformed or not applicable",
        )?;
        let feed_connects =
            IntCounter::new("feed_connect_attempts_total", "Feed connection attempts")?;
        let feed_connected = IntGauge::new("feed_connected", "1 while the feed is subscribed")?;
        let deliveries = IntCounterVec::new(
            Opts::new("deliveries_total", "Snapshot deliveries by outcome"),
            &["outcome"],
        )?;
        let broadcast_cycles = IntCounterVec::new(
            Opts::new("broadcast_cycles_total", "Broadcast cycles by outcome"),
            &["outcome"],
        )?;
        let task_restarts = IntCounterVec::new(
            Opts::new("task_restarts_total", "Supervised task restarts"),
            &["task"],
        )?;

        registry.register(Box::new(ticks_applied.clone()))?;
        registry.register(Box::new(messages_skipped.clone()))?;
        registry.register(Box::new(feed_connects.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(broadcast_cycles.clone()))?;
        registry.register(Box::new(task_restarts.clone()))?;

        Ok(Self {
            registry,
            ticks_applied,
            messages_skipped,
            feed_connects,
            feed_connected,
            deliveries,
            broadcast_cycles,
            task_restarts,
        })
    }

    /// Prometheus text exposition of every metric
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
