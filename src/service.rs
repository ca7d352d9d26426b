//! Relay facade
//!
//! The operations a chat command layer calls: show the market, manage the
//! destination list, push now, refresh over REST and report status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::publisher::{Broadcaster, DeliveryReport, DestinationId, Destinations};
use crate::rest::RestClient;
use crate::store::{PriceStore, Symbol};

/// Shared handle over the store, destinations and broadcaster
pub struct MarketRelay {
    store: Arc<PriceStore>,
    destinations: Arc<Destinations>,
    broadcaster: Arc<Broadcaster>,
    rest: Option<RestClient>,
    started_at: DateTime<Utc>,
}

/// Process status for operators
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub uptime_secs: u64,
    pub symbols: Vec<Symbol>,
    pub known_prices: usize,
    pub destinations: usize,
    /// Worker threads of the current tokio runtime, 0 outside one
    pub runtime_workers: usize,
}

impl MarketRelay {
    pub fn new(
        store: Arc<PriceStore>,
        destinations: Arc<Destinations>,
        broadcaster: Arc<Broadcaster>,
        rest: Option<RestClient>,
    ) -> Self {
        Self {
            store,
            destinations,
            broadcaster,
            rest,
            started_at: Utc::now(),
        }
    }

    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Report for an on-demand "show market" request
    pub fn get_formatted_snapshot(&self) -> String {
        self.broadcaster.render()
    }

    pub fn add_destination(&self, id: DestinationId) -> bool {
        let added = self.destinations.add(id.clone());
        info!(destination = %id, added, "Destination added");
        added
    }

    pub fn remove_destination(&self, id: &DestinationId) -> bool {
        let removed = self.destinations.remove(id);
        info!(destination = %id, removed, "Destination removed");
        removed
    }

    pub fn list_destinations(&self) -> Vec<DestinationId> {
        self.destinations.list()
    }

    /// Run one broadcast cycle outside the schedule
    pub async fn force_push_now(&self) -> DeliveryReport {
        info!("Forced broadcast requested");
        self.broadcaster.push_now().await
    }

    /// Refresh the store over REST; returns how many symbols were updated
    pub async fn refresh_from_rest(&self) -> usize {
        match &self.rest {
            Some(rest) => rest.refresh(&self.store).await,
            None => 0,
        }
    }

    pub fn status(&self) -> RelayStatus {
        let uptime = Utc::now() - self.started_at;
        RelayStatus {
            uptime_secs: uptime.num_seconds().max(0) as u64,
            symbols: self.store.symbols(),
            known_prices: self.store.known_count(),
            destinations: self.destinations.len(),
            runtime_workers: tokio::runtime::Handle::try_current()
                .map(|handle| handle.metrics().num_workers())
                .unwrap_or(0),
        }
    }
}

impl RelayStatus {
    /// Operator-facing status text
    pub fn render(&self) -> String {
        let symbols: Vec<&str> = self.symbols.iter().map(Symbol::as_str).collect();
        format!(
            "Running\nUptime: {}\nRuntime workers: {}\nKnown prices: {}/{}\nDestinations: {}\nWatch symbols: {}",
            format_uptime(self.uptime_secs),
            self.runtime_workers,
            self.known_prices,
            self.symbols.len(),
            self.destinations,
            symbols.join(", ")
        )
    }
}

/// `{d}d {h}h {m}m {s}s`
pub fn format_uptime(total_secs: u64) -> String {
    let (minutes, s) = (total_secs / 60, total_secs % 60);
    let (hours, m) = (minutes / 60, minutes % 60);
    let (d, h) = (hours / 24, hours % 24);
    format!("{d}d {h}h {m}m {s}s")
}
