use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::notifiers::{DiscordNotifier, EmailNotifier, SlackNotifier, SmsNotifier};
use super::traits::NotifierPlugin;
use crate::config::NotificationsConfig;
use crate::models::Channel;

pub type NotifierPluginArc = Arc<dyn NotifierPlugin>;

/// Why a channel has no adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Unavailable {
    /// Configured but unusable, e.g. missing credentials.
    Misconfigured(String),
    NotRegistered,
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::Misconfigured(reason) => f.write_str(reason),
            Unavailable::NotRegistered => f.write_str("no adapter registered"),
        }
    }
}

/// Adapters by channel, plus the reason for every channel that could not be built.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: Arc<RwLock<HashMap<Channel, NotifierPluginArc>>>,
    misconfigured: Arc<RwLock<HashMap<Channel, String>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every adapter the notification config allows. Whether a channel
    /// is enabled is decided per run, so adapters are built regardless.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let mut adapters: HashMap<Channel, NotifierPluginArc> = HashMap::new();
        let mut misconfigured = HashMap::new();

        let mut install = |channel: Channel, built: Result<NotifierPluginArc, String>| match built {
            Ok(adapter) => {
                adapters.insert(channel, adapter);
            }
            Err(reason) => {
                if config.enabled(channel) {
                    tracing::warn!(channel = %channel, "Channel enabled but not usable: {}", reason);
                }
                misconfigured.insert(channel, reason);
            }
        };

        install(
            Channel::Email,
            EmailNotifier::from_config(&config.email).map(|n| Arc::new(n) as NotifierPluginArc),
        );
        install(
            Channel::Sms,
            SmsNotifier::from_config(&config.sms).map(|n| Arc::new(n) as NotifierPluginArc),
        );
        install(
            Channel::Discord,
            DiscordNotifier::from_config(&config.discord).map(|n| Arc::new(n) as NotifierPluginArc),
        );
        install(
            Channel::Slack,
            SlackNotifier::from_config(&config.slack).map(|n| Arc::new(n) as NotifierPluginArc),
        );

        Self {
            adapters: Arc::new(RwLock::new(adapters)),
            misconfigured: Arc::new(RwLock::new(misconfigured)),
        }
    }

    /// Register (or replace) the adapter for its channel.
    pub async fn register(&self, adapter: NotifierPluginArc) {
        let channel = adapter.channel();
        tracing::debug!(channel = %channel, "Registering {}", adapter.name());

        self.misconfigured.write().await.remove(&channel);
        self.adapters.write().await.insert(channel, adapter);
    }

    pub async fn mark_misconfigured(&self, channel: Channel, reason: impl Into<String>) {
        self.adapters.write().await.remove(&channel);
        self.misconfigured.write().await.insert(channel, reason.into());
    }

    pub async fn adapter(&self, channel: Channel) -> Result<NotifierPluginArc, Unavailable> {
        if let Some(adapter) = self.adapters.read().await.get(&channel) {
            return Ok(adapter.clone());
        }
        match self.misconfigured.read().await.get(&channel) {
            Some(reason) => Err(Unavailable::Misconfigured(reason.clone())),
            None => Err(Unavailable::NotRegistered),
        }
    }

    pub async fn has_adapter(&self, channel: Channel) -> bool {
        self.adapters.read().await.contains_key(&channel)
    }

    pub async fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.adapters.read().await.keys().copied().collect();
        channels.sort();
        channels
    }
}
