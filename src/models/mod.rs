use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod alert_record;
pub mod inventory_snapshot;
pub mod knowledge_entry;
pub mod listing;
pub mod scan_run;

// Re-exports for convenience
pub use alert_record::*;
pub use inventory_snapshot::*;
pub use knowledge_entry::*;
pub use listing::*;
pub use scan_run::*;

/// Rarity classification. 1 is the rarest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tier(u8);

impl Tier {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub const UNICORN: Tier = Tier(1);
    pub const HIGHLY_ALLOCATED: Tier = Tier(2);
    pub const ALLOCATED: Tier = Tier(3);
    pub const WORTH_TRACKING: Tier = Tier(4);

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Tier(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Unicorn",
            2 => "Highly Allocated",
            3 => "Allocated",
            _ => "Worth Tracking",
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Tier::new(value).ok_or_else(|| format!("rarity tier must be 1-4, got {}", value))
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.0
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification medium. `Dashboard` has no adapter; the UI reads finds directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Discord,
    Slack,
    Dashboard,
}

impl Channel {
    pub const DELIVERABLE: [Channel; 4] = [Channel::Email, Channel::Sms, Channel::Discord, Channel::Slack];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Discord => "discord",
            Channel::Slack => "slack",
            Channel::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "discord" => Ok(Channel::Discord),
            "slack" => Ok(Channel::Slack),
            "dashboard" => Ok(Channel::Dashboard),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
