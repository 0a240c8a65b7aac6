//! SQLite-backed stores.
//!
//! Timestamps are stored as Unix milliseconds and prices as decimal text.
//! `observe` runs in a transaction and is additionally serialized in-process,
//! so the read-classify-write sequence is a single unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::Mutex;

use super::{classify, AlertRecordStore, ScanRunStore, SettingsStore, SnapshotStore};
use crate::config::DatabaseConfig;
use crate::models::{
    AlertOutcome, AlertRecord, Channel, InventorySnapshot, NewSnapshot, Observation, ScanRun, ScanScope,
    ScanStatus, ScanSummary,
};
use crate::utils::error::{AppError, Result};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS inventory_snapshots (
        id TEXT PRIMARY KEY,
        entry_id TEXT NOT NULL,
        sku TEXT NOT NULL,
        location_id TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        price TEXT,
        observed_at INTEGER NOT NULL,
        new_find INTEGER NOT NULL DEFAULT 0,
        UNIQUE (sku, location_id, observed_at)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_latest ON inventory_snapshots (sku, location_id, observed_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_finds ON inventory_snapshots (new_find, observed_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS alert_records (
        id TEXT PRIMARY KEY,
        entry_id TEXT NOT NULL,
        location_id TEXT NOT NULL,
        channel TEXT NOT NULL,
        sent_at INTEGER NOT NULL,
        outcome TEXT NOT NULL,
        detail TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_alerts_key ON alert_records (entry_id, location_id, channel, sent_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS scan_runs (
        id TEXT PRIMARY KEY,
        scan_type TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        completed_at INTEGER,
        summary TEXT NOT NULL,
        error TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
];

const SELECT_LATEST: &str = r#"
    SELECT id, entry_id, sku, location_id, quantity, price, observed_at, new_find
    FROM inventory_snapshots
    WHERE sku = ? AND location_id = ?
    ORDER BY observed_at DESC
    LIMIT 1
"#;

pub struct SqliteStore {
    pool: SqlitePool,
    observe_lock: Mutex<()>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            observe_lock: Mutex::new(()),
        }
    }

    /// Open (creating if needed) the configured database and apply the schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");

        // Ensure parent directory exists
        if !in_memory {
            let path = config
                .url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every connection to :memory: is its own database
        let max_connections = if in_memory { 1 } else { config.max_connections.max(1) };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        let store = Self::new(pool);
        store.init_schema().await?;
        tracing::info!("Connected to database {}", config.url);
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| AppError::Storage(format!("invalid timestamp {}", ms)))
}

fn snapshot_from_row(row: &SqliteRow) -> Result<InventorySnapshot> {
    let quantity: i64 = row.try_get("quantity")?;
    let price = row
        .try_get::<Option<String>, _>("price")?
        .map(|p| Decimal::from_str(&p).map_err(|e| AppError::Storage(format!("invalid price '{}': {}", p, e))))
        .transpose()?;

    Ok(InventorySnapshot {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        sku: row.try_get("sku")?,
        location_id: row.try_get("location_id")?,
        quantity: u32::try_from(quantity).map_err(|_| AppError::Storage(format!("invalid quantity {}", quantity)))?,
        price,
        observed_at: from_millis(row.try_get("observed_at")?)?,
        new_find: row.try_get("new_find")?,
    })
}

fn alert_from_row(row: &SqliteRow) -> Result<AlertRecord> {
    let channel: String = row.try_get("channel")?;
    let outcome: String = row.try_get("outcome")?;

    Ok(AlertRecord {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        location_id: row.try_get("location_id")?,
        channel: Channel::from_str(&channel).map_err(AppError::Storage)?,
        sent_at: from_millis(row.try_get("sent_at")?)?,
        outcome: AlertOutcome::from_str(&outcome).map_err(AppError::Storage)?,
        detail: row.try_get("detail")?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<ScanRun> {
    let scan_type: String = row.try_get("scan_type")?;
    let status: String = row.try_get("status")?;
    let summary: String = row.try_get("summary")?;

    Ok(ScanRun {
        id: row.try_get("id")?,
        scope: ScanScope::from_str(&scan_type).map_err(AppError::Storage)?,
        status: ScanStatus::from_str(&status).map_err(AppError::Storage)?,
        started_at: from_millis(row.try_get("started_at")?)?,
        completed_at: row
            .try_get::<Option<i64>, _>("completed_at")?
            .map(from_millis)
            .transpose()?,
        summary: serde_json::from_str::<ScanSummary>(&summary)?,
        error: row.try_get("error")?,
    })
}

async fn insert_snapshot<'e, E>(executor: E, snapshot: &InventorySnapshot) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO inventory_snapshots (id, entry_id, sku, location_id, quantity, price, observed_at, new_find)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&snapshot.id)
    .bind(&snapshot.entry_id)
    .bind(&snapshot.sku)
    .bind(&snapshot.location_id)
    .bind(snapshot.quantity as i64)
    .bind(snapshot.price.map(|p| p.to_string()))
    .bind(to_millis(snapshot.observed_at))
    .bind(snapshot.new_find)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn latest(&self, sku: &str, location_id: &str) -> Result<Option<InventorySnapshot>> {
        let row = sqlx::query(SELECT_LATEST)
            .bind(sku)
            .bind(location_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn append(&self, snapshot: &InventorySnapshot) -> Result<()> {
        insert_snapshot(&self.pool, snapshot).await
    }

    async fn observe(&self, snapshot: NewSnapshot) -> Result<Observation> {
        let _guard = self.observe_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query(SELECT_LATEST)
            .bind(&snapshot.sku)
            .bind(&snapshot.location_id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(snapshot_from_row)
            .transpose()?;

        let observation = classify(previous.as_ref(), snapshot);
        insert_snapshot(&mut *tx, &observation.snapshot).await?;

        tx.commit().await?;
        Ok(observation)
    }

    async fn recent_finds(&self, limit: usize) -> Result<Vec<InventorySnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entry_id, sku, location_id, quantity, price, observed_at, new_find
            FROM inventory_snapshots
            WHERE new_find = 1
            ORDER BY observed_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }
}

#[async_trait]
impl AlertRecordStore for SqliteStore {
    async fn recent(
        &self,
        entry_id: &str,
        location_id: &str,
        channel: Channel,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entry_id, location_id, channel, sent_at, outcome, detail
            FROM alert_records
            WHERE entry_id = ? AND location_id = ? AND channel = ? AND sent_at >= ?
            ORDER BY sent_at DESC
            "#,
        )
        .bind(entry_id)
        .bind(location_id)
        .bind(channel.as_str())
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn append(&self, record: &AlertRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_records (id, entry_id, location_id, channel, sent_at, outcome, detail)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.entry_id)
        .bind(&record.location_id)
        .bind(record.channel.as_str())
        .bind(to_millis(record.sent_at))
        .bind(record.outcome.as_str())
        .bind(&record.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ScanRunStore for SqliteStore {
    async fn save(&self, run: &ScanRun) -> Result<()> {
        let summary = serde_json::to_string(&run.summary)?;

        sqlx::query(
            r#"
            INSERT INTO scan_runs (id, scan_type, status, started_at, completed_at, summary, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                summary = excluded.summary,
                error = excluded.error
            "#,
        )
        .bind(&run.id)
        .bind(run.scope.to_string())
        .bind(run.status.as_str())
        .bind(to_millis(run.started_at))
        .bind(run.completed_at.map(to_millis))
        .bind(summary)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ScanRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, scan_type, status, started_at, completed_at, summary, error
            FROM scan_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn settings(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM user_settings")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, String)> { Ok((row.try_get("key")?, row.try_get("value")?)) })
            .collect()
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
