//! Alert routing and cooldown settings, resolved once per scan run.
//!
//! The configured values are the baseline. Rows in the `user_settings` table
//! override them on every run, so edits take effect without a restart.

use chrono::Duration;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::config::{AlertsConfig, AppConfig};
use crate::models::{Channel, Tier};
use crate::store::SettingsStore;
use crate::utils::error::{AppError, Result};

pub const TIER_MAP_KEY: &str = "tier_notification_map";
pub const COOLDOWN_KEY: &str = "alert_cooldown_hours";

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSettings {
    routing: BTreeMap<Tier, Vec<Channel>>,
    enabled: HashSet<Channel>,
    default_cooldown: Duration,
    channel_cooldowns: BTreeMap<Channel, Duration>,
}

impl NotificationSettings {
    /// Routing only; no channel enabled and a 24 hour cooldown.
    pub fn new(routing: BTreeMap<Tier, Vec<Channel>>) -> Self {
        Self {
            routing,
            enabled: HashSet::new(),
            default_cooldown: Duration::hours(24),
            channel_cooldowns: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let routing = config
            .alerts
            .parsed_tier_channels()
            .map_err(AppError::Configuration)?;
        let channel_cooldowns = config
            .alerts
            .parsed_channel_cooldowns()
            .map_err(AppError::Configuration)?
            .into_iter()
            .map(|(channel, hours)| (channel, hours_to_duration(hours)))
            .collect();
        let enabled = Channel::DELIVERABLE
            .into_iter()
            .filter(|c| config.notifications.enabled(*c))
            .collect();

        Ok(Self {
            routing,
            enabled,
            default_cooldown: hours_to_duration(config.alerts.cooldown_hours),
            channel_cooldowns,
        })
    }

    pub fn enable(mut self, channel: Channel) -> Self {
        self.enabled.insert(channel);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    pub fn with_channel_cooldown(mut self, channel: Channel, cooldown: Duration) -> Self {
        self.channel_cooldowns.insert(channel, cooldown);
        self
    }

    /// Apply `user_settings` overrides. Unknown keys are ignored; invalid
    /// values are logged and leave the current value in place.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        if let Some(raw) = overrides.get(TIER_MAP_KEY) {
            match parse_tier_map(raw) {
                Ok(routing) => self.routing = routing,
                Err(e) => tracing::warn!(key = TIER_MAP_KEY, "Ignoring invalid setting: {}", e),
            }
        }

        if let Some(raw) = overrides.get(COOLDOWN_KEY) {
            match raw.trim().parse::<u64>() {
                Ok(hours) => self.default_cooldown = hours_to_duration(hours),
                Err(e) => tracing::warn!(key = COOLDOWN_KEY, "Ignoring invalid setting '{}': {}", raw, e),
            }
        }

        for channel in Channel::DELIVERABLE {
            let key = format!("{}_enabled", channel);
            let Some(raw) = overrides.get(&key) else {
                continue;
            };
            match parse_flag(raw) {
                Some(true) => {
                    self.enabled.insert(channel);
                }
                Some(false) => {
                    self.enabled.remove(&channel);
                }
                None => tracing::warn!(key = %key, "Ignoring invalid setting '{}'", raw),
            }
        }

        self
    }

    /// Channels routed for `tier`, in configured order. Unrouted tiers get none.
    pub fn channels_for(&self, tier: Tier) -> &[Channel] {
        self.routing.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        channel == Channel::Dashboard || self.enabled.contains(&channel)
    }

    pub fn enabled_channels(&self) -> Vec<Channel> {
        Channel::DELIVERABLE
            .into_iter()
            .filter(|c| self.enabled.contains(c))
            .collect()
    }

    pub fn cooldown_for(&self, channel: Channel) -> Duration {
        self.channel_cooldowns
            .get(&channel)
            .copied()
            .unwrap_or(self.default_cooldown)
    }
}

// Upper bound on any configured cooldown
const MAX_COOLDOWN_HOURS: u64 = 24 * 365 * 100;

fn hours_to_duration(hours: u64) -> Duration {
    Duration::hours(hours.min(MAX_COOLDOWN_HOURS) as i64)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_tier_map(raw: &str) -> std::result::Result<BTreeMap<Tier, Vec<Channel>>, String> {
    let tier_channels: BTreeMap<String, Vec<String>> =
        serde_json::from_str(raw).map_err(|e| format!("not a tier to channel map: {}", e))?;
    let routing = AlertsConfig {
        tier_channels,
        ..AlertsConfig::default()
    }
    .parsed_tier_channels()?;

    if routing.is_empty() {
        return Err("tier map routes no tiers".to_string());
    }
    Ok(routing)
}

/// Resolves [`NotificationSettings`] for a run: baseline plus stored overrides.
pub struct SettingsProvider {
    baseline: NotificationSettings,
    store: Arc<dyn SettingsStore>,
}

impl SettingsProvider {
    pub fn new(baseline: NotificationSettings, store: Arc<dyn SettingsStore>) -> Self {
        Self { baseline, store }
    }

    pub fn baseline(&self) -> &NotificationSettings {
        &self.baseline
    }

    /// Current settings. An unreadable settings table falls back to the baseline.
    pub async fn current(&self) -> NotificationSettings {
        match self.store.settings().await {
            Ok(overrides) => self.baseline.clone().with_overrides(&overrides),
            Err(e) => {
                tracing::warn!("Could not read user settings, using configured defaults: {}", e);
                self.baseline.clone()
            }
        }
    }
}
