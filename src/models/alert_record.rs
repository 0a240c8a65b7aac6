use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{generate_id, Channel};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertOutcome {
    Sent,
    Failed,
    Suppressed,
    Misconfigured,
}

impl AlertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertOutcome::Sent => "sent",
            AlertOutcome::Failed => "failed",
            AlertOutcome::Suppressed => "suppressed",
            AlertOutcome::Misconfigured => "misconfigured",
        }
    }

    /// Outcomes that count as a delivery attempt and therefore start a cooldown.
    pub fn is_attempt(&self) -> bool {
        matches!(self, AlertOutcome::Sent | AlertOutcome::Failed)
    }
}

impl fmt::Display for AlertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(AlertOutcome::Sent),
            "failed" => Ok(AlertOutcome::Failed),
            "suppressed" => Ok(AlertOutcome::Suppressed),
            "misconfigured" => Ok(AlertOutcome::Misconfigured),
            other => Err(format!("unknown alert outcome '{}'", other)),
        }
    }
}

/// One dispatched or suppressed notification attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    pub id: String,
    pub entry_id: String,
    pub location_id: String,
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
    pub outcome: AlertOutcome,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAlertRecord {
    pub entry_id: String,
    pub location_id: String,
    pub channel: Channel,
    pub outcome: AlertOutcome,
    pub detail: Option<String>,
}

impl AlertRecord {
    pub fn new(new_record: NewAlertRecord) -> Self {
        Self::at(new_record, Utc::now())
    }

    pub fn at(new_record: NewAlertRecord, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            entry_id: new_record.entry_id,
            location_id: new_record.location_id,
            channel: new_record.channel,
            sent_at,
            outcome: new_record.outcome,
            detail: new_record.detail,
        }
    }
}
