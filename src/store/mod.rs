//! Persistence seams for the scanner and dispatcher.
//!
//! Each concern gets its own trait so callers depend only on what they use.
//! [`MemoryStore`] and [`SqliteStore`] implement all of them.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::collections::HashMap;

use crate::models::{
    AlertRecord, Channel, InventorySnapshot, NewSnapshot, Observation, ScanRun, StockChange,
};
use crate::utils::error::Result;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recent snapshot for a (sku, location), if any.
    async fn latest(&self, sku: &str, location_id: &str) -> Result<Option<InventorySnapshot>>;

    async fn append(&self, snapshot: &InventorySnapshot) -> Result<()>;

    /// Read the latest snapshot, classify the new observation against it and
    /// append it, as one unit. Concurrent observers cannot both see the same
    /// previous state.
    async fn observe(&self, snapshot: NewSnapshot) -> Result<Observation>;

    /// Snapshots classified as new finds, newest first.
    async fn recent_finds(&self, limit: usize) -> Result<Vec<InventorySnapshot>>;
}

#[async_trait]
pub trait AlertRecordStore: Send + Sync {
    /// Records for one (entry, location, channel) at or after `since`, newest first.
    async fn recent(
        &self,
        entry_id: &str,
        location_id: &str,
        channel: Channel,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>>;

    async fn append(&self, record: &AlertRecord) -> Result<()>;
}

#[async_trait]
pub trait ScanRunStore: Send + Sync {
    /// Insert or update a run by id.
    async fn save(&self, run: &ScanRun) -> Result<()>;

    /// Runs newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ScanRun>>;
}

/// Runtime key/value overrides edited from outside the scanner.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn settings(&self) -> Result<HashMap<String, String>>;

    async fn put_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Classify `snapshot` against `previous` and stamp it.
///
/// Observation times are kept strictly increasing per (sku, location) so the
/// latest snapshot is always unambiguous. They are truncated to milliseconds,
/// the precision the sqlite store persists.
pub fn classify(previous: Option<&InventorySnapshot>, snapshot: NewSnapshot) -> Observation {
    let change = StockChange::classify(previous, snapshot.quantity);
    let mut snapshot = InventorySnapshot::new(snapshot);
    snapshot.observed_at = snapshot.observed_at.trunc_subsecs(3);

    if let Some(prev) = previous {
        if snapshot.observed_at <= prev.observed_at {
            snapshot.observed_at = prev.observed_at + Duration::milliseconds(1);
        }
    }
    snapshot.new_find = change.is_new_find(snapshot.quantity);

    Observation { snapshot, change }
}
