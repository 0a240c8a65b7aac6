use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{generate_id, AlertOutcome, AlertRecord, Tier};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ScanScope {
    Full,
    /// Entries whose rarity tier is at most `tier`.
    Quick { tier: Tier },
}

impl ScanScope {
    pub fn includes(&self, tier: Tier) -> bool {
        match self {
            ScanScope::Full => true,
            ScanScope::Quick { tier: max } => tier <= *max,
        }
    }
}

impl fmt::Display for ScanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanScope::Full => f.write_str("full_scan"),
            ScanScope::Quick { tier } => write!(f, "quick_scan_tier_{}", tier),
        }
    }
}

impl FromStr for ScanScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "full_scan" {
            return Ok(ScanScope::Full);
        }
        s.strip_prefix("quick_scan_tier_")
            .and_then(|t| t.parse::<u8>().ok())
            .and_then(Tier::new)
            .map(|tier| ScanScope::Quick { tier })
            .ok_or_else(|| format!("unknown scan type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled)
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            "cancelled" => Ok(ScanStatus::Cancelled),
            other => Err(format!("unknown scan status '{}'", other)),
        }
    }
}

/// A per-entry failure that was contained and did not abort the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryFailure {
    pub entry_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanSummary {
    pub entries_total: usize,
    pub entries_processed: usize,
    pub entries_matched: usize,
    pub entries_errored: usize,
    pub products_found: usize,
    pub new_finds: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub alerts_suppressed: usize,
    pub alerts_misconfigured: usize,
    pub failures: Vec<EntryFailure>,
}

impl ScanSummary {
    pub fn tally_alerts(&mut self, records: &[AlertRecord]) {
        for record in records {
            match record.outcome {
                AlertOutcome::Sent => self.alerts_sent += 1,
                AlertOutcome::Failed => self.alerts_failed += 1,
                AlertOutcome::Suppressed => self.alerts_suppressed += 1,
                AlertOutcome::Misconfigured => self.alerts_misconfigured += 1,
            }
        }
    }
}

/// One execution of the scan orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRun {
    pub id: String,
    pub scope: ScanScope,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: ScanSummary,
    pub error: Option<String>,
}

impl ScanRun {
    pub fn new(scope: ScanScope) -> Self {
        Self {
            id: generate_id(),
            scope,
            status: ScanStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            summary: ScanSummary::default(),
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ScanStatus::Running;
        self.started_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.finish(ScanStatus::Completed, None);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.finish(ScanStatus::Failed, Some(error.into()));
    }

    pub fn cancel(&mut self) {
        self.finish(ScanStatus::Cancelled, None);
    }

    fn finish(&mut self, status: ScanStatus, error: Option<String>) {
        // Terminal states are final
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}
