//! The service surface a dashboard or CLI drives.

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::knowledge::KnowledgeBase;
use crate::models::{Channel, InventorySnapshot, KnowledgeEntry, ScanRun, ScanScope};
use crate::plugins::{ChannelRegistry, DeliveryReceipt};
use crate::scanner::{ScanOrchestrator, ScanProgress, SearchHit};
use crate::scraper::Upstream;
use crate::settings::{NotificationSettings, SettingsProvider};
use crate::store::{AlertRecordStore, ScanRunStore, SettingsStore, SnapshotStore, SqliteStore};
use crate::utils::error::Result;

/// A recorded new find with its catalog entry, when still known.
#[derive(Debug, Clone)]
pub struct RecentFind {
    pub snapshot: InventorySnapshot,
    pub entry: Option<Arc<KnowledgeEntry>>,
}

#[derive(Clone)]
pub struct BourbonHunter {
    orchestrator: Arc<ScanOrchestrator>,
    dispatcher: Arc<NotificationDispatcher>,
    settings: Arc<SettingsProvider>,
    snapshots: Arc<dyn SnapshotStore>,
    runs: Arc<dyn ScanRunStore>,
}

impl BourbonHunter {
    /// Wire the service around one store backing every persistence concern.
    pub fn new<S>(
        kb: KnowledgeBase,
        upstream: Upstream,
        store: Arc<S>,
        registry: ChannelRegistry,
        baseline: NotificationSettings,
    ) -> Self
    where
        S: SnapshotStore + AlertRecordStore + ScanRunStore + SettingsStore + 'static,
    {
        let snapshots: Arc<dyn SnapshotStore> = store.clone();
        let runs: Arc<dyn ScanRunStore> = store.clone();
        let alerts: Arc<dyn AlertRecordStore> = store.clone();
        let user_settings: Arc<dyn SettingsStore> = store;

        let dispatcher = Arc::new(NotificationDispatcher::new(registry, alerts));
        let settings = Arc::new(SettingsProvider::new(baseline, user_settings));
        let orchestrator = Arc::new(ScanOrchestrator::new(
            Arc::new(kb),
            Arc::new(upstream),
            snapshots.clone(),
            runs.clone(),
            dispatcher.clone(),
            settings.clone(),
        ));

        Self {
            orchestrator,
            dispatcher,
            settings,
            snapshots,
            runs,
        }
    }

    /// Build the production service: SQLite store, HTTP upstream and the
    /// channel adapters the configuration allows.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let kb = match &config.scanner.knowledge_base_path {
            Some(path) => KnowledgeBase::load(Path::new(path))?,
            None => KnowledgeBase::builtin()?,
        };
        tracing::info!("Knowledge base ready with {} entries", kb.len());

        let store = Arc::new(SqliteStore::connect(&config.database).await?);
        let upstream = Upstream::from_config(&config.upstream, &config.scanner)?;
        let registry = ChannelRegistry::from_config(&config.notifications);
        let baseline = NotificationSettings::from_config(config)?;

        Ok(Self::new(kb, upstream, store, registry, baseline))
    }

    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator> {
        &self.orchestrator
    }

    /// Claim the run slot and execute on a background task. Returns the run id.
    pub fn start_scan(&self, scope: ScanScope) -> Result<String> {
        let ticket = self.orchestrator.claim(scope)?;
        let run_id = ticket.run_id().to_string();

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.execute(ticket).await;
        });

        Ok(run_id)
    }

    /// Run a scan and wait for it to finish.
    pub async fn run_scan(&self, scope: ScanScope) -> Result<ScanRun> {
        self.orchestrator.run(scope).await
    }

    pub fn status(&self) -> ScanProgress {
        self.orchestrator.progress()
    }

    pub async fn recent_finds(&self, limit: usize) -> Result<Vec<RecentFind>> {
        let kb = self.orchestrator.knowledge_base();
        Ok(self
            .snapshots
            .recent_finds(limit)
            .await?
            .into_iter()
            .map(|snapshot| RecentFind {
                entry: kb.get(&snapshot.entry_id).cloned(),
                snapshot,
            })
            .collect())
    }

    pub async fn scan_history(&self, limit: usize) -> Result<Vec<ScanRun>> {
        self.runs.recent(limit).await
    }

    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.orchestrator.search(term).await
    }

    pub fn cancel_scan(&self) -> bool {
        self.orchestrator.cancel()
    }

    /// Send a sample alert on every channel currently enabled.
    pub async fn test_notifications(&self) -> Vec<(Channel, Result<DeliveryReceipt>)> {
        let settings = self.settings.current().await;
        self.dispatcher.send_test(&settings).await
    }
}
