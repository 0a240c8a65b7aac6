use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Channel, InventorySnapshot, KnowledgeEntry, LocationInfo, ScrapedListing, Tier};
use crate::utils::error::Result;

/// Channel-agnostic description of one new find.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPayload {
    pub entry_id: String,
    pub name: String,
    pub distillery: Option<String>,
    pub tier: Tier,
    pub proof: Option<f64>,
    pub age: Option<String>,
    pub msrp: Option<Decimal>,
    pub average_rating: Option<f64>,
    pub sku: String,
    pub price: Option<Decimal>,
    pub product_url: Option<String>,
    pub location: LocationInfo,
    pub quantity: u32,
    pub observed_at: DateTime<Utc>,
}

impl AlertPayload {
    pub fn new(
        entry: &KnowledgeEntry,
        listing: Option<&ScrapedListing>,
        snapshot: &InventorySnapshot,
        location: LocationInfo,
    ) -> Self {
        Self {
            entry_id: entry.id.clone(),
            name: entry.name.clone(),
            distillery: entry.distillery.clone(),
            tier: entry.tier,
            proof: entry.proof,
            age: entry.age.clone(),
            msrp: entry.msrp,
            average_rating: entry.average_rating,
            sku: snapshot.sku.clone(),
            price: snapshot.price.or_else(|| listing.and_then(|l| l.price)),
            product_url: listing.and_then(|l| l.url.clone()),
            location,
            quantity: snapshot.quantity,
            observed_at: snapshot.observed_at,
        }
    }

    /// A fixed, obviously fake find used by `test_notifications`.
    pub fn sample() -> Self {
        Self {
            entry_id: "test".to_string(),
            name: "Test Bourbon (Not Real)".to_string(),
            distillery: Some("Test Distillery".to_string()),
            tier: Tier::ALLOCATED,
            proof: Some(100.0),
            age: Some("10 years".to_string()),
            msrp: Some(Decimal::new(4999, 2)),
            average_rating: Some(8.0),
            sku: "99999".to_string(),
            price: Some(Decimal::new(4999, 2)),
            product_url: None,
            location: LocationInfo {
                location_id: "0000".to_string(),
                name: "Test Store".to_string(),
                address: "123 Test St, Philadelphia, PA 19103".to_string(),
                county: None,
            },
            quantity: 3,
            observed_at: Utc::now(),
        }
    }

    pub fn tier_label(&self) -> String {
        self.tier.label().to_uppercase()
    }

    pub fn price_text(&self) -> String {
        self.price.map_or_else(|| "N/A".to_string(), |p| format!("${:.2}", p))
    }

    pub fn rating_text(&self) -> String {
        self.average_rating
            .map_or_else(|| "N/A".to_string(), |r| format!("{}/10", r))
    }

    pub fn store_text(&self) -> String {
        format!("{} (#{})", self.location.name, self.location.location_id)
    }

    pub fn address_text(&self) -> &str {
        if self.location.address.is_empty() {
            "N/A"
        } else {
            &self.location.address
        }
    }
}

/// What an adapter reports after a successful hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub channel: Channel,
    pub message_id: Option<String>,
    pub detail: String,
}

/// One notification medium.
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn channel(&self) -> Channel;

    /// Deliver `payload`. Failures are `ChannelDelivery` errors carrying the reason.
    async fn send(&self, payload: &AlertPayload) -> Result<DeliveryReceipt>;
}
