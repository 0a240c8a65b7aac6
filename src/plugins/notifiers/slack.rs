use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::config::SlackConfig;
use crate::models::Channel;
use crate::plugins::traits::{AlertPayload, DeliveryReceipt, NotifierPlugin};
use crate::utils::error::{AppError, Result};

fn tier_emoji(payload: &AlertPayload) -> &'static str {
    match payload.tier.value() {
        1 => ":unicorn_face:",
        2 => ":fire:",
        3 => ":mag:",
        _ => ":white_check_mark:",
    }
}

pub fn create_blocks(payload: &AlertPayload) -> serde_json::Value {
    let field = |label: &str, value: &str| json!({"type": "mrkdwn", "text": format!("*{}:*\n{}", label, value)});

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {"type": "plain_text", "text": payload.name},
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "{} *{}* - Tier {}\n_{}_",
                    tier_emoji(payload),
                    payload.tier_label(),
                    payload.tier,
                    payload.distillery.as_deref().unwrap_or("Unknown")
                ),
            },
        }),
        json!({
            "type": "section",
            "fields": [
                field("Store", &payload.store_text()),
                field("Qty", &payload.quantity.to_string()),
                field("Price", &payload.price_text()),
                field("Rating", &payload.rating_text()),
                field("Proof", &payload.proof.map_or_else(|| "N/A".to_string(), |p| p.to_string())),
                field("Address", payload.address_text()),
            ],
        }),
    ];

    if let Some(url) = &payload.product_url {
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("<{}|View product>", url)},
        }));
    }
    blocks.push(json!({"type": "divider"}));

    json!(blocks)
}

pub struct SlackNotifier {
    client: Client,
    webhook_url: Url,
}

impl SlackNotifier {
    pub fn from_config(config: &SlackConfig) -> std::result::Result<Self, String> {
        let webhook = config
            .webhook_url
            .as_deref()
            .filter(|w| !w.is_empty())
            .ok_or("Missing webhook_url")?;
        let webhook_url = Url::parse(webhook).map_err(|e| format!("Invalid Slack webhook URL: {}", e))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self { client, webhook_url })
    }
}

#[async_trait]
impl NotifierPlugin for SlackNotifier {
    fn name(&self) -> &str {
        "Slack Notifier"
    }

    fn channel(&self) -> Channel {
        Channel::Slack
    }

    async fn send(&self, payload: &AlertPayload) -> Result<DeliveryReceipt> {
        let body = json!({
            "text": format!("{}: {} in stock", payload.tier_label(), payload.name),
            "blocks": create_blocks(payload),
        });

        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::delivery(Channel::Slack, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::delivery(Channel::Slack, format!("webhook returned {}", status)));
        }

        tracing::info!(channel = "slack", entry_id = %payload.entry_id, "Slack alert sent");
        Ok(DeliveryReceipt {
            channel: Channel::Slack,
            message_id: None,
            detail: format!("Slack: {}", payload.name),
        })
    }
}
