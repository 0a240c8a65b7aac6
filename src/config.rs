use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use url::Url;

use crate::models::{Channel, Tier};

pub const DEFAULT_BASE_URL: &str = "https://www.finewineandgoodspirits.com";
pub const DEFAULT_USER_AGENT: &str = "PA-Bourbon-Hunter/1.0 (Personal Use; Inventory Tracker)";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub scanner: ScannerConfig,
    pub alerts: AlertsConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/bourbon_hunter.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Restrict stock lookups to these locations. Empty means all locations.
    pub location_ids: Vec<String>,
    pub location_page_size: u32,
    pub location_pages: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            location_ids: Vec::new(),
            location_page_size: 250,
            location_pages: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub request_delay_ms: u64,
    /// Catalog file to load instead of the built-in one.
    pub knowledge_base_path: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 2500,
            knowledge_base_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub cooldown_hours: u64,
    /// Per-channel overrides of `cooldown_hours`, keyed by channel name.
    pub channel_cooldown_hours: BTreeMap<String, u64>,
    /// Rarity tier ("1".."4") to channel names.
    pub tier_channels: BTreeMap<String, Vec<String>>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let all = vec!["email", "sms", "discord", "slack", "dashboard"];
        let mut tier_channels = BTreeMap::new();
        tier_channels.insert("1".to_string(), all.iter().map(|c| c.to_string()).collect());
        tier_channels.insert("2".to_string(), all.iter().map(|c| c.to_string()).collect());
        tier_channels.insert(
            "3".to_string(),
            vec!["email".to_string(), "discord".to_string(), "dashboard".to_string()],
        );
        tier_channels.insert("4".to_string(), vec!["dashboard".to_string()]);

        Self {
            cooldown_hours: 24,
            channel_cooldown_hours: BTreeMap::new(),
            tier_channels,
        }
    }
}

impl AlertsConfig {
    pub fn parsed_tier_channels(&self) -> Result<BTreeMap<Tier, Vec<Channel>>, String> {
        let mut routing = BTreeMap::new();
        for (key, names) in &self.tier_channels {
            let tier = key
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(Tier::new)
                .ok_or_else(|| format!("invalid rarity tier '{}' in tier_channels", key))?;
            let channels = names
                .iter()
                .map(|n| n.parse::<Channel>())
                .collect::<Result<Vec<_>, _>>()?;
            routing.insert(tier, channels);
        }
        Ok(routing)
    }

    pub fn parsed_channel_cooldowns(&self) -> Result<BTreeMap<Channel, u64>, String> {
        self.channel_cooldown_hours
            .iter()
            .map(|(name, hours)| name.parse::<Channel>().map(|c| (c, *hours)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationsConfig {
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub discord: DiscordConfig,
    pub slack: SlackConfig,
}

impl NotificationsConfig {
    pub fn enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email.enabled,
            Channel::Sms => self.sms.enabled,
            Channel::Discord => self.discord.enabled,
            Channel::Slack => self.slack.enabled,
            Channel::Dashboard => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub to_addresses: Vec<String>,
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: None,
            password: None,
            from_address: None,
            from_name: "PA Bourbon Hunter".to_string(),
            to_addresses: Vec::new(),
            use_tls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub enabled: bool,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub to_numbers: Vec<String>,
    pub api_base: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_sid: None,
            auth_token: None,
            from_number: None,
            to_numbers: Vec::new(),
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            username: "PA Bourbon Hunter".to_string(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily-rolling log file. No file logging when unset.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "bourbon-hunter.log".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "HUNTER__"
            .add_source(Environment::with_prefix("HUNTER").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate upstream configuration
        if Url::parse(&self.upstream.base_url).is_err() {
            return Err(ConfigError::Message("Invalid upstream base URL format".into()));
        }

        if self.upstream.request_timeout_secs == 0 {
            return Err(ConfigError::Message("Upstream request_timeout_secs must be greater than 0".into()));
        }

        if self.upstream.location_page_size == 0 {
            return Err(ConfigError::Message("Upstream location_page_size must be greater than 0".into()));
        }

        // Validate alert routing
        let routing = self.alerts.parsed_tier_channels().map_err(ConfigError::Message)?;
        if routing.is_empty() {
            return Err(ConfigError::Message("Alerts tier_channels must route at least one tier".into()));
        }

        self.alerts.parsed_channel_cooldowns().map_err(ConfigError::Message)?;

        // Validate enabled channels
        if self.notifications.email.enabled && self.notifications.email.smtp_port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if let Some(webhook) = &self.notifications.discord.webhook_url {
            if Url::parse(webhook).is_err() {
                return Err(ConfigError::Message("Invalid Discord webhook URL".into()));
            }
        }

        if let Some(webhook) = &self.notifications.slack.webhook_url {
            if Url::parse(webhook).is_err() {
                return Err(ConfigError::Message("Invalid Slack webhook URL".into()));
            }
        }

        Ok(())
    }
}
