use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SmsConfig;
use crate::models::Channel;
use crate::plugins::traits::{AlertPayload, DeliveryReceipt, NotifierPlugin};
use crate::utils::error::{AppError, Result};

// Texts use shorter labels than the other channels
fn sms_tier_label(payload: &AlertPayload) -> &'static str {
    match payload.tier.value() {
        1 => "UNICORN",
        2 => "ALLOCATED",
        3 => "FOUND",
        _ => "TRACKED",
    }
}

pub fn format_message(payload: &AlertPayload) -> String {
    format!(
        "[{}] {}\n{} @ {}\nQty: {} | Rating: {}",
        sms_tier_label(payload),
        payload.name,
        payload.price_text(),
        payload.store_text(),
        payload.quantity,
        payload.rating_text(),
    )
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: Option<String>,
}

pub struct SmsNotifier {
    client: Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_numbers: Vec<String>,
}

impl SmsNotifier {
    pub fn from_config(config: &SmsConfig) -> std::result::Result<Self, String> {
        let required = |value: &Option<String>, what: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| format!("Missing Twilio {}", what))
        };

        let account_sid = required(&config.account_sid, "account_sid")?;
        let auth_token = required(&config.auth_token, "auth_token")?;
        let from_number = required(&config.from_number, "from_number")?;
        if config.to_numbers.is_empty() {
            return Err("No SMS recipients configured".to_string());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            messages_url: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                config.api_base.trim_end_matches('/'),
                account_sid
            ),
            account_sid,
            auth_token,
            from_number,
            to_numbers: config.to_numbers.clone(),
        })
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<Option<String>> {
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| AppError::delivery(Channel::Sms, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::delivery(
                Channel::Sms,
                format!("Twilio returned {}: {}", status, text.trim()),
            ));
        }

        let message: TwilioMessage = response
            .json()
            .await
            .unwrap_or(TwilioMessage { sid: None });
        Ok(message.sid)
    }
}

#[async_trait]
impl NotifierPlugin for SmsNotifier {
    fn name(&self) -> &str {
        "SMS Notifier"
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, payload: &AlertPayload) -> Result<DeliveryReceipt> {
        let body = format_message(payload);
        let mut message_ids = Vec::new();

        for to in &self.to_numbers {
            if let Some(sid) = self.send_one(to, &body).await? {
                message_ids.push(sid);
            }
        }

        tracing::info!(channel = "sms", entry_id = %payload.entry_id, recipients = self.to_numbers.len(), "SMS sent");
        Ok(DeliveryReceipt {
            channel: Channel::Sms,
            message_id: (!message_ids.is_empty()).then(|| message_ids.join(",")),
            detail: body,
        })
    }
}
