//! In-memory store for tests and throwaway runs.
//!
//! All state sits behind a single `std::sync::Mutex`, which also makes
//! `observe` trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{classify, AlertRecordStore, ScanRunStore, SettingsStore, SnapshotStore};
use crate::models::{AlertRecord, Channel, InventorySnapshot, NewSnapshot, Observation, ScanRun};
use crate::utils::error::{AppError, Result};

#[derive(Default)]
struct State {
    snapshots: Vec<InventorySnapshot>,
    alerts: Vec<AlertRecord>,
    runs: Vec<ScanRun>,
    settings: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::Storage("memory store lock poisoned".to_string()))
    }

    /// Every snapshot in insertion order.
    pub fn snapshots(&self) -> Vec<InventorySnapshot> {
        self.lock().map(|s| s.snapshots.clone()).unwrap_or_default()
    }

    /// Every alert record in insertion order.
    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.lock().map(|s| s.alerts.clone()).unwrap_or_default()
    }
}

fn latest_of<'a>(snapshots: &'a [InventorySnapshot], sku: &str, location_id: &str) -> Option<&'a InventorySnapshot> {
    snapshots
        .iter()
        .filter(|s| s.sku == sku && s.location_id == location_id)
        .max_by_key(|s| s.observed_at)
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest(&self, sku: &str, location_id: &str) -> Result<Option<InventorySnapshot>> {
        let state = self.lock()?;
        Ok(latest_of(&state.snapshots, sku, location_id).cloned())
    }

    async fn append(&self, snapshot: &InventorySnapshot) -> Result<()> {
        let mut state = self.lock()?;
        let duplicate = state.snapshots.iter().any(|s| {
            s.sku == snapshot.sku && s.location_id == snapshot.location_id && s.observed_at == snapshot.observed_at
        });
        if duplicate {
            return Err(AppError::Storage(format!(
                "snapshot for {}@{} at {} already exists",
                snapshot.sku, snapshot.location_id, snapshot.observed_at
            )));
        }
        state.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn observe(&self, snapshot: NewSnapshot) -> Result<Observation> {
        let mut state = self.lock()?;
        let previous = latest_of(&state.snapshots, &snapshot.sku, &snapshot.location_id).cloned();
        let observation = classify(previous.as_ref(), snapshot);
        state.snapshots.push(observation.snapshot.clone());
        Ok(observation)
    }

    async fn recent_finds(&self, limit: usize) -> Result<Vec<InventorySnapshot>> {
        let state = self.lock()?;
        let mut finds: Vec<_> = state.snapshots.iter().filter(|s| s.new_find).cloned().collect();
        finds.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        finds.truncate(limit);
        Ok(finds)
    }
}

#[async_trait]
impl AlertRecordStore for MemoryStore {
    async fn recent(
        &self,
        entry_id: &str,
        location_id: &str,
        channel: Channel,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>> {
        let state = self.lock()?;
        let mut records: Vec<_> = state
            .alerts
            .iter()
            .filter(|r| {
                r.entry_id == entry_id && r.location_id == location_id && r.channel == channel && r.sent_at >= since
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(records)
    }

    async fn append(&self, record: &AlertRecord) -> Result<()> {
        self.lock()?.alerts.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ScanRunStore for MemoryStore {
    async fn save(&self, run: &ScanRun) -> Result<()> {
        let mut state = self.lock()?;
        match state.runs.iter().position(|r| r.id == run.id) {
            Some(index) => state.runs[index] = run.clone(),
            None => state.runs.push(run.clone()),
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ScanRun>> {
        let state = self.lock()?;
        let mut runs = state.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn settings(&self) -> Result<HashMap<String, String>> {
        Ok(self.lock()?.settings.clone())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
