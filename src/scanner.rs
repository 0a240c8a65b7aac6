//! The two-phase scan: catalog search and matching per entry, then stock
//! lookup for the matched SKU, then new-find detection and dispatch.
//!
//! Only one run may be active. [`ScanOrchestrator::claim`] reserves the run
//! slot synchronously and hands back a [`RunTicket`]; the slot is released
//! when the ticket is dropped, whichever way execution ends.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatcher::{NewFind, NotificationDispatcher};
use crate::knowledge::KnowledgeBase;
use crate::matcher::{self, normalize, EntryMatch, MatchResult, Matcher};
use crate::models::{
    EntryFailure, InventorySnapshot, KnowledgeEntry, NewSnapshot, ScanRun, ScanScope, ScrapedListing,
};
use crate::scraper::Upstream;
use crate::settings::SettingsProvider;
use crate::store::{ScanRunStore, SnapshotStore};
use crate::utils::error::{AppError, Result};

/// Number of recent per-entry durations averaged for the ETA.
const ETA_WINDOW: usize = 5;

/// Point-in-time view of the active (or last) run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScanProgress {
    pub running: bool,
    pub run_id: Option<String>,
    pub scope: Option<ScanScope>,
    pub started_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub total: usize,
    pub current_entry: Option<String>,
    pub eta: Option<Duration>,
}

#[derive(Debug, Default)]
struct ProgressTracker {
    progress: ScanProgress,
    recent: VecDeque<Duration>,
}

impl ProgressTracker {
    fn begin(&mut self, run: &ScanRun, total: usize) {
        self.recent.clear();
        self.progress = ScanProgress {
            running: true,
            run_id: Some(run.id.clone()),
            scope: Some(run.scope),
            started_at: Some(run.started_at),
            processed: 0,
            total,
            current_entry: None,
            eta: None,
        };
    }

    fn entry_started(&mut self, name: &str) {
        self.progress.current_entry = Some(name.to_string());
    }

    fn entry_finished(&mut self, elapsed: Duration) {
        self.progress.processed += 1;
        if self.recent.len() == ETA_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(elapsed);

        let remaining = self.progress.total.saturating_sub(self.progress.processed);
        let average = self.recent.iter().sum::<Duration>() / self.recent.len() as u32;
        self.progress.eta = Some(average * remaining as u32);
    }

    fn finish(&mut self) {
        self.progress.running = false;
        self.progress.current_entry = None;
        self.progress.eta = None;
    }
}

#[derive(Debug, Default)]
struct RunSlot {
    active: Mutex<Option<String>>,
}

impl RunSlot {
    fn try_claim(&self, run_id: &str) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = active.as_ref() {
            return Err(AppError::ScanAlreadyRunning {
                run_id: current.clone(),
            });
        }
        *active = Some(run_id.to_string());
        Ok(())
    }

    fn release(&self, run_id: &str) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_deref() == Some(run_id) {
            *active = None;
        }
    }

    fn current(&self) -> Option<String> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Exclusive right to execute one run. Dropping it frees the run slot.
#[derive(Debug)]
pub struct RunTicket {
    run: ScanRun,
    slot: Arc<RunSlot>,
}

impl RunTicket {
    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    pub fn scope(&self) -> ScanScope {
        self.run.scope
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.slot.release(&self.run.id);
    }
}

/// A catalog listing annotated with what the matcher made of it.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub listing: ScrapedListing,
    pub result: MatchResult,
}

struct PendingFind {
    entry: Arc<KnowledgeEntry>,
    listing: ScrapedListing,
    snapshot: InventorySnapshot,
}

enum EntryOutcome {
    Unmatched { listings: usize },
    Matched { listings: usize },
}

enum Termination {
    Completed,
    Cancelled,
    Failed(String),
}

pub struct ScanOrchestrator {
    kb: Arc<KnowledgeBase>,
    matcher: Matcher,
    upstream: Arc<Upstream>,
    snapshots: Arc<dyn SnapshotStore>,
    runs: Arc<dyn ScanRunStore>,
    dispatcher: Arc<NotificationDispatcher>,
    settings: Arc<SettingsProvider>,
    slot: Arc<RunSlot>,
    cancel_requested: AtomicBool,
    progress: RwLock<ProgressTracker>,
}

impl ScanOrchestrator {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        upstream: Arc<Upstream>,
        snapshots: Arc<dyn SnapshotStore>,
        runs: Arc<dyn ScanRunStore>,
        dispatcher: Arc<NotificationDispatcher>,
        settings: Arc<SettingsProvider>,
    ) -> Self {
        Self {
            matcher: Matcher::new(&kb),
            kb,
            upstream,
            snapshots,
            runs,
            dispatcher,
            settings,
            slot: Arc::new(RunSlot::default()),
            cancel_requested: AtomicBool::new(false),
            progress: RwLock::new(ProgressTracker::default()),
        }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Reserve the run slot. Fails with `ScanAlreadyRunning` if a run holds it.
    pub fn claim(&self, scope: ScanScope) -> Result<RunTicket> {
        let run = ScanRun::new(scope);
        self.slot.try_claim(&run.id)?;
        self.cancel_requested.store(false, Ordering::SeqCst);

        Ok(RunTicket {
            run,
            slot: self.slot.clone(),
        })
    }

    /// Claim and execute in one step.
    pub async fn run(&self, scope: ScanScope) -> Result<ScanRun> {
        let ticket = self.claim(scope)?;
        Ok(self.execute(ticket).await)
    }

    pub fn active_run(&self) -> Option<String> {
        self.slot.current()
    }

    pub fn progress(&self) -> ScanProgress {
        self.progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .progress
            .clone()
    }

    /// Ask the active run to stop before its next entry. Returns whether a run was active.
    pub fn cancel(&self) -> bool {
        match self.slot.current() {
            Some(run_id) => {
                tracing::info!(run_id = %run_id, "Cancellation requested");
                self.cancel_requested.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Manual search passthrough; one paced catalog call.
    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        let listings = self.upstream.catalog.search(term).await?;
        Ok(listings
            .into_iter()
            .map(|listing| SearchHit {
                result: self.matcher.match_listing(&listing),
                listing,
            })
            .collect())
    }

    fn track<T>(&self, f: impl FnOnce(&mut ProgressTracker) -> T) -> T {
        let mut tracker = self.progress.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracker)
    }

    /// Execute a claimed run to a terminal state.
    pub async fn execute(&self, ticket: RunTicket) -> ScanRun {
        let mut run = ticket.run.clone();
        run.start();

        let entries = self.kb.in_scope(run.scope);
        run.summary.entries_total = entries.len();
        self.track(|t| t.begin(&run, entries.len()));

        tracing::info!(run_id = %run.id, scope = %run.scope, entries = entries.len(), "Scan started");

        let mut finds = Vec::new();
        let termination = match self.runs.save(&run).await {
            Ok(()) => self.scan_entries(&mut run, &entries, &mut finds).await,
            Err(e) => Termination::Failed(format!("could not record scan start: {}", e)),
        };

        let termination = match self.dispatch_finds(&mut run, finds).await {
            Ok(()) => termination,
            Err(e) => match termination {
                Termination::Failed(reason) => Termination::Failed(reason),
                _ => Termination::Failed(format!("alert dispatch failed: {}", e)),
            },
        };

        match termination {
            Termination::Completed => run.complete(),
            Termination::Cancelled => run.cancel(),
            Termination::Failed(reason) => {
                tracing::error!(run_id = %run.id, "Scan failed: {}", reason);
                run.fail(reason);
            }
        }

        if let Err(e) = self.runs.save(&run).await {
            tracing::error!(run_id = %run.id, "Could not record scan result: {}", e);
        }
        self.track(ProgressTracker::finish);

        tracing::info!(
            run_id = %run.id,
            status = run.status.as_str(),
            processed = run.summary.entries_processed,
            matched = run.summary.entries_matched,
            errored = run.summary.entries_errored,
            new_finds = run.summary.new_finds,
            alerts_sent = run.summary.alerts_sent,
            "Scan finished"
        );

        drop(ticket);
        run
    }

    async fn scan_entries(
        &self,
        run: &mut ScanRun,
        entries: &[Arc<KnowledgeEntry>],
        finds: &mut Vec<PendingFind>,
    ) -> Termination {
        let mut search_cache: HashMap<String, Vec<ScrapedListing>> = HashMap::new();

        for entry in entries {
            if self.cancel_requested.load(Ordering::SeqCst) {
                tracing::info!(run_id = %run.id, "Scan cancelled");
                return Termination::Cancelled;
            }

            self.track(|t| t.entry_started(&entry.name));
            let started = Instant::now();

            match self.scan_entry(entry, &mut search_cache, finds, &mut run.summary.failures).await {
                Ok(outcome) => {
                    let listings = match outcome {
                        EntryOutcome::Matched { listings } => {
                            run.summary.entries_matched += 1;
                            listings
                        }
                        EntryOutcome::Unmatched { listings } => listings,
                    };
                    run.summary.products_found += listings;
                }
                Err(e) if e.is_fatal_to_scan() => {
                    return Termination::Failed(format!("store failure while scanning {}: {}", entry.id, e));
                }
                Err(e) => {
                    tracing::warn!(entry_id = %entry.id, "Entry failed: {}", e);
                    run.summary.entries_errored += 1;
                    run.summary.failures.push(EntryFailure {
                        entry_id: entry.id.clone(),
                        message: e.to_string(),
                    });
                }
            }

            run.summary.entries_processed += 1;
            self.track(|t| t.entry_finished(started.elapsed()));
        }

        Termination::Completed
    }

    /// Merge the listings of every term. Failed terms are pushed onto
    /// `partial`, except that when every term fails the last error is
    /// returned instead.
    async fn search_terms(
        &self,
        entry: &KnowledgeEntry,
        cache: &mut HashMap<String, Vec<ScrapedListing>>,
        partial: &mut Vec<EntryFailure>,
    ) -> Result<Vec<ScrapedListing>> {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        let mut any_ok = false;

        for term in &entry.search_terms {
            let key = normalize(term);
            if !cache.contains_key(&key) {
                match self.upstream.catalog.search(term).await {
                    Ok(listings) => {
                        tracing::debug!(entry_id = %entry.id, term = %term, listings = listings.len(), "Searched");
                        cache.insert(key.clone(), listings);
                    }
                    Err(e) => {
                        tracing::warn!(entry_id = %entry.id, term = %term, "Search failed: {}", e);
                        errors.push((term.as_str(), e));
                        continue;
                    }
                }
            }

            any_ok = true;
            for listing in cache.get(&key).into_iter().flatten() {
                if seen.insert(listing.sku.clone()) {
                    merged.push(listing.clone());
                }
            }
        }

        let fatal = if any_ok { None } else { errors.pop() };
        partial.extend(errors.into_iter().map(|(term, e)| EntryFailure {
            entry_id: entry.id.clone(),
            message: format!("search for '{}' failed: {}", term, e),
        }));

        match fatal {
            Some((_, e)) => Err(e),
            None => Ok(merged),
        }
    }

    fn best_listing(&self, entry: &KnowledgeEntry, listings: &[ScrapedListing]) -> Option<(ScrapedListing, EntryMatch)> {
        listings
            .iter()
            .filter_map(|listing| match self.matcher.match_listing(listing) {
                MatchResult::Matched(m) if m.entry.id == entry.id => Some((listing, m)),
                _ => None,
            })
            .min_by(|(_, a), (_, b)| matcher::rank(a, b).then_with(|| b.token_ratio.total_cmp(&a.token_ratio)))
            .map(|(listing, m)| (listing.clone(), m))
    }

    async fn scan_entry(
        &self,
        entry: &Arc<KnowledgeEntry>,
        cache: &mut HashMap<String, Vec<ScrapedListing>>,
        finds: &mut Vec<PendingFind>,
        partial: &mut Vec<EntryFailure>,
    ) -> Result<EntryOutcome> {
        let listings = self.search_terms(entry, cache, partial).await?;
        let found = listings.len();

        let Some((listing, matched)) = self.best_listing(entry, &listings) else {
            tracing::debug!(entry_id = %entry.id, listings = found, "No matching listing");
            return Ok(EntryOutcome::Unmatched { listings: found });
        };

        tracing::info!(
            entry_id = %entry.id,
            sku = %listing.sku,
            confidence = matched.confidence.as_str(),
            "Matched {}", listing.name
        );

        let levels = self.upstream.stock.stock(&listing.sku).await?;
        for level in levels {
            let observation = self
                .snapshots
                .observe(NewSnapshot {
                    entry_id: entry.id.clone(),
                    sku: listing.sku.clone(),
                    location_id: level.location_id,
                    quantity: level.quantity,
                    price: level.price.or(listing.price),
                })
                .await?;

            if observation.is_new_find() {
                tracing::info!(
                    entry_id = %entry.id,
                    sku = %listing.sku,
                    location_id = %observation.snapshot.location_id,
                    quantity = observation.snapshot.quantity,
                    "New find"
                );
                finds.push(PendingFind {
                    entry: entry.clone(),
                    listing: listing.clone(),
                    snapshot: observation.snapshot,
                });
            }
        }

        Ok(EntryOutcome::Matched { listings: found })
    }

    async fn dispatch_finds(&self, run: &mut ScanRun, pending: Vec<PendingFind>) -> Result<()> {
        run.summary.new_finds = pending.len();
        if pending.is_empty() {
            return Ok(());
        }

        self.upstream.locations.ensure_loaded().await;
        let mut finds = Vec::with_capacity(pending.len());
        for p in pending {
            let location = self.upstream.locations.get(&p.snapshot.location_id).await;
            finds.push(NewFind {
                entry: p.entry,
                listing: Some(p.listing),
                snapshot: p.snapshot,
                location,
            });
        }

        let settings = self.settings.current().await;
        let records = self.dispatcher.dispatch(&finds, &settings).await?;
        run.summary.tally_alerts(&records);
        Ok(())
    }
}
