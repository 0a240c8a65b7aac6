use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::generate_id;

/// A persisted stock observation. Append-only; logically keyed by (sku, location_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventorySnapshot {
    pub id: String,
    pub entry_id: String,
    pub sku: String,
    pub location_id: String,
    pub quantity: u32,
    pub price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
    pub new_find: bool,
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub entry_id: String,
    pub sku: String,
    pub location_id: String,
    pub quantity: u32,
    pub price: Option<Decimal>,
}

impl InventorySnapshot {
    pub fn new(new_snapshot: NewSnapshot) -> Self {
        Self::observed_at(new_snapshot, Utc::now())
    }

    pub fn observed_at(new_snapshot: NewSnapshot, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            entry_id: new_snapshot.entry_id,
            sku: new_snapshot.sku,
            location_id: new_snapshot.location_id,
            quantity: new_snapshot.quantity,
            price: new_snapshot.price,
            observed_at,
            new_find: false,
        }
    }

    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }
}

/// How an observation relates to the latest known state for its (sku, location).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StockChange {
    FirstSeen,
    Restocked,
    QuantityChanged,
    SoldOut,
    Unchanged,
}

impl StockChange {
    pub fn classify(previous: Option<&InventorySnapshot>, quantity: u32) -> Self {
        match previous {
            None => StockChange::FirstSeen,
            Some(prev) if prev.quantity == quantity => StockChange::Unchanged,
            Some(prev) if prev.quantity == 0 => StockChange::Restocked,
            Some(_) if quantity == 0 => StockChange::SoldOut,
            Some(_) => StockChange::QuantityChanged,
        }
    }

    /// A new find is stock appearing where there was none: an unseen combination
    /// or a zero to nonzero transition.
    pub fn is_new_find(self, quantity: u32) -> bool {
        quantity > 0 && matches!(self, StockChange::FirstSeen | StockChange::Restocked)
    }
}

/// Result of recording one observation against the snapshot store.
#[derive(Debug, Clone)]
pub struct Observation {
    pub snapshot: InventorySnapshot,
    pub change: StockChange,
}

impl Observation {
    pub fn is_new_find(&self) -> bool {
        self.snapshot.new_find
    }
}
