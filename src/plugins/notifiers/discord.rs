use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::config::DiscordConfig;
use crate::models::Channel;
use crate::plugins::traits::{AlertPayload, DeliveryReceipt, NotifierPlugin};
use crate::utils::error::{AppError, Result};

fn embed_color(payload: &AlertPayload) -> u32 {
    match payload.tier.value() {
        1 => 0xFF0000,
        2 => 0xFF6600,
        3 => 0xFFAA00,
        _ => 0x00AA00,
    }
}

pub fn create_embed(payload: &AlertPayload) -> serde_json::Value {
    let mut embed = json!({
        "title": payload.name,
        "description": format!(
            "**{}** - Tier {}\n{}",
            payload.tier_label(),
            payload.tier,
            payload.distillery.as_deref().unwrap_or("Unknown Distillery")
        ),
        "color": embed_color(payload),
        "timestamp": payload.observed_at.to_rfc3339(),
        "fields": [
            {"name": "Store", "value": payload.store_text(), "inline": true},
            {"name": "Quantity", "value": payload.quantity.to_string(), "inline": true},
            {"name": "Price", "value": payload.price_text(), "inline": true},
            {"name": "Rating", "value": payload.rating_text(), "inline": true},
            {"name": "Proof", "value": payload.proof.map_or_else(|| "N/A".to_string(), |p| p.to_string()), "inline": true},
            {"name": "Age", "value": payload.age.as_deref().unwrap_or("NAS"), "inline": true},
            {"name": "Address", "value": payload.address_text(), "inline": false},
        ],
        "footer": {"text": "PA Bourbon Hunter"},
    });

    if let Some(url) = &payload.product_url {
        embed["url"] = json!(url);
    }

    embed
}

pub struct DiscordNotifier {
    client: Client,
    webhook_url: Url,
    username: String,
    avatar_url: Option<String>,
}

impl DiscordNotifier {
    pub fn from_config(config: &DiscordConfig) -> std::result::Result<Self, String> {
        let webhook = config
            .webhook_url
            .as_deref()
            .filter(|w| !w.is_empty())
            .ok_or("Missing webhook_url")?;
        let webhook_url = Url::parse(webhook).map_err(|e| format!("Invalid Discord webhook URL: {}", e))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            webhook_url,
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
        })
    }

    pub fn create_webhook_payload(&self, payload: &AlertPayload) -> serde_json::Value {
        let mut body = json!({
            "username": self.username,
            "embeds": [create_embed(payload)],
        });

        if let Some(avatar_url) = &self.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }

        body
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn channel(&self) -> Channel {
        Channel::Discord
    }

    async fn send(&self, payload: &AlertPayload) -> Result<DeliveryReceipt> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&self.create_webhook_payload(payload))
            .send()
            .await
            .map_err(|e| AppError::delivery(Channel::Discord, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::delivery(
                Channel::Discord,
                format!("webhook returned {}", status),
            ));
        }

        tracing::info!(channel = "discord", entry_id = %payload.entry_id, "Discord alert sent");
        Ok(DeliveryReceipt {
            channel: Channel::Discord,
            message_id: None,
            detail: format!("Discord: {}", payload.name),
        })
    }
}
