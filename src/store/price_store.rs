//! Price store
//!
//! Keys are fixed at construction; each value is replaced as a whole under
//! its own lock so readers never observe a half-written point.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{PricePoint, Symbol};
use crate::error::{RelayError, Result};

/// Latest price per symbol of the watch-set
#[derive(Debug)]
pub struct PriceStore {
    /// Watch-set in display order with one slot per symbol
    slots: Vec<(Symbol, RwLock<PricePoint>)>,
    /// Symbol to slot position
    index: HashMap<Symbol, usize>,
}

impl PriceStore {
    /// Create a store holding an unknown point for every symbol.
    ///
    /// Repeated symbols keep their first position.
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut slots = Vec::new();
        let mut index = HashMap::new();

        for symbol in symbols {
            let symbol = symbol.into();
            if index.contains_key(&symbol) {
                continue;
            }
            index.insert(symbol.clone(), slots.len());
            slots.push((symbol, RwLock::new(PricePoint::unknown())));
        }

        Self { slots, index }
    }

    /// Get the latest point for a symbol
    pub fn get(&self, symbol: &Symbol) -> Result<PricePoint> {
        let slot = self.slot(symbol)?;
        let point = *slot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(point)
    }

    /// Replace the point for a symbol
    pub fn set(&self, symbol: &Symbol, point: PricePoint) -> Result<()> {
        let slot = self.slot(symbol)?;
        *slot.write().unwrap_or_else(PoisonError::into_inner) = point;
        Ok(())
    }

    /// Read every symbol in watch-set order.
    ///
    /// Each entry is read under its own lock, so entries may reflect
    /// different moments when writes are concurrent.
    pub fn snapshot_all(&self) -> Vec<(Symbol, PricePoint)> {
        self.slots
            .iter()
            .map(|(symbol, slot)| {
                let point = *slot.read().unwrap_or_else(PoisonError::into_inner);
                (symbol.clone(), point)
            })
            .collect()
    }

    /// Watch-set in display order
    pub fn symbols(&self) -> Vec<Symbol> {
        self.slots.iter().map(|(symbol, _)| symbol.clone()).collect()
    }

    /// Check if a symbol is part of the watch-set
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.index.contains_key(symbol)
    }

    /// Number of symbols in the watch-set
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of symbols with a known last price
    pub fn known_count(&self) -> usize {
        self.snapshot_all()
            .iter()
            .filter(|(_, point)| point.is_known())
            .count()
    }

    fn slot(&self, symbol: &Symbol) -> Result<&RwLock<PricePoint>> {
        self.index
            .get(symbol)
            .map(|&i| &self.slots[i].1)
            .ok_or_else(|| RelayError::UnknownSymbol(symbol.to_string()))
    }
}
