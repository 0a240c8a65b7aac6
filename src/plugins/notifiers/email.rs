use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::models::Channel;
use crate::plugins::traits::{AlertPayload, DeliveryReceipt, NotifierPlugin};
use crate::utils::error::{AppError, Result};

fn tier_color(payload: &AlertPayload) -> &'static str {
    match payload.tier.value() {
        1 => "#ff0000",
        2 => "#ff6600",
        3 => "#ffaa00",
        _ => "#00aa00",
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn format_subject(payload: &AlertPayload) -> String {
    format!("[Bourbon Hunter] {}: {} in stock!", payload.tier_label(), payload.name)
}

pub fn format_text_body(payload: &AlertPayload) -> String {
    let mut text = String::new();

    text.push_str("PA BOURBON HUNTER ALERT\n\n");
    text.push_str(&format!("TIER {} - {}\n", payload.tier, payload.tier_label()));
    text.push_str(&format!("{}\n", payload.name));
    text.push_str(&format!(
        "{}\n\n",
        payload.distillery.as_deref().unwrap_or("Unknown Distillery")
    ));
    text.push_str(&format!("Price: {}\n", payload.price_text()));
    text.push_str(&format!("Store: {}\n", payload.store_text()));
    text.push_str(&format!("Address: {}\n", payload.address_text()));
    text.push_str(&format!("Quantity: {} units\n", payload.quantity));
    text.push_str(&format!("Rating: {}\n", payload.rating_text()));

    if let Some(proof) = payload.proof {
        text.push_str(&format!("Proof: {}\n", proof));
    }
    if let Some(url) = &payload.product_url {
        text.push_str(&format!("\nView product: {}\n", url));
    }

    text
}

pub fn format_html_body(payload: &AlertPayload) -> String {
    let row = |label: &str, value: &str| {
        format!(
            r#"<tr><td style="padding: 8px; border-bottom: 1px solid #333; color: #888;">{}</td><td style="padding: 8px; border-bottom: 1px solid #333;">{}</td></tr>"#,
            label,
            escape_html(value)
        )
    };

    let mut rows = vec![
        row("Price", &payload.price_text()),
        row("Store", &payload.store_text()),
        row("Address", payload.address_text()),
        row("Quantity", &format!("{} units", payload.quantity)),
        row("Rating", &payload.rating_text()),
    ];
    if let Some(proof) = payload.proof {
        rows.push(row("Proof", &proof.to_string()));
    }
    if let Some(age) = &payload.age {
        rows.push(row("Age", age));
    }

    let link = payload
        .product_url
        .as_ref()
        .map(|url| format!(r#"<p><a href="{}" style="color: #d4a574;">View product</a></p>"#, escape_html(url)))
        .unwrap_or_default();

    format!(
        r#"<div style="font-family: Georgia, serif; max-width: 600px; margin: 0 auto; background: #1a1a2e; color: #eee; padding: 20px; border-radius: 8px;">
    <h1 style="color: #d4a574; margin: 0 0 10px;">PA Bourbon Hunter</h1>
    <div style="background: {color}; color: white; display: inline-block; padding: 4px 12px; border-radius: 4px; font-weight: bold; font-size: 12px;">TIER {tier} - {label}</div>
    <h2 style="color: #fff; margin: 10px 0;">{name}</h2>
    <p style="color: #aaa;">{distillery}</p>
    <table style="width: 100%; border-collapse: collapse; margin: 15px 0;">{rows}</table>
    {link}
</div>"#,
        color = tier_color(payload),
        tier = payload.tier,
        label = payload.tier_label(),
        name = escape_html(&payload.name),
        distillery = escape_html(payload.distillery.as_deref().unwrap_or("Unknown Distillery")),
        rows = rows.join(""),
        link = link,
    )
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build from the `notifications.email` section. Errors name what is missing.
    pub fn from_config(config: &EmailConfig) -> std::result::Result<Self, String> {
        let username = config
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or("Missing SMTP username")?;
        let password = config
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or("Missing SMTP password")?;
        if config.to_addresses.is_empty() {
            return Err("No email recipients configured".to_string());
        }

        let from_address = config.from_address.as_deref().unwrap_or(username);
        let from = format!("{} <{}>", config.from_name, from_address)
            .parse::<Mailbox>()
            .map_err(|e| format!("Invalid from address '{}': {}", from_address, e))?;
        let to = config
            .to_addresses
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| format!("Invalid recipient '{}': {}", addr, e))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| format!("Invalid SMTP host '{}': {}", config.smtp_host, e))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        Ok(Self { transport, from, to })
    }

    pub fn build_message(&self, payload: &AlertPayload) -> Result<Message> {
        let builder = self
            .to
            .iter()
            .fold(Message::builder().from(self.from.clone()), |b, to| b.to(to.clone()));

        builder
            .subject(format_subject(payload))
            .multipart(MultiPart::alternative_plain_html(
                format_text_body(payload),
                format_html_body(payload),
            ))
            .map_err(|e| AppError::delivery(Channel::Email, format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, payload: &AlertPayload) -> Result<DeliveryReceipt> {
        let message = self.build_message(payload)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| AppError::delivery(Channel::Email, e.to_string()))?;

        tracing::info!(channel = "email", entry_id = %payload.entry_id, "Email sent");
        Ok(DeliveryReceipt {
            channel: Channel::Email,
            message_id: response.message().next().map(|m| m.to_string()),
            detail: format_subject(payload),
        })
    }
}
