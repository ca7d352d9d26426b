//! Broadcast destinations

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::error::{RelayError, Result};

/// Chat that receives broadcasts: numeric chat ID or `@channel` name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestinationId {
    Chat(i64),
    Channel(String),
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationId::Chat(id) => write!(f, "{id}"),
            DestinationId::Channel(name) => f.write_str(name),
        }
    }
}

impl FromStr for DestinationId {
    type Err = RelayError;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::ConfigError("empty destination".to_string()));
        }
        Ok(raw
            .parse::<i64>()
            .map(DestinationId::Chat)
            .unwrap_or_else(|_| DestinationId::Channel(raw.to_string())))
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        DestinationId::Chat(id)
    }
}

/// In-memory destination set, safe to change during a broadcast
#[derive(Debug, Default)]
pub struct Destinations {
    inner: RwLock<BTreeSet<DestinationId>>,
}

impl Destinations {
    pub fn new<I: IntoIterator<Item = DestinationId>>(initial: I) -> Self {
        Self {
            inner: RwLock::new(initial.into_iter().collect()),
        }
    }

    /// Add a destination; false if it was already present
    pub fn add(&self, id: DestinationId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    /// Remove a destination; false if it was not present
    pub fn remove(&self, id: &DestinationId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Copy of the current set
    pub fn list(&self) -> Vec<DestinationId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
