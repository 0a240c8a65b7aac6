use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product tile returned by the upstream catalog search. Lives for one scan pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedListing {
    pub sku: String,
    pub name: String,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub size: Option<String>,
    pub search_term: String,
}

impl ScrapedListing {
    pub fn new(sku: &str, name: &str, search_term: &str) -> Self {
        Self {
            sku: sku.to_string(),
            name: name.to_string(),
            price: None,
            image_url: None,
            url: None,
            size: None,
            search_term: search_term.to_string(),
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }
}

/// One row of a per-location stock lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub location_id: String,
    pub quantity: u32,
    pub price: Option<Decimal>,
}

/// Name and address of a retail location, used to enrich alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LocationInfo {
    pub location_id: String,
    pub name: String,
    pub address: String,
    pub county: Option<String>,
}

impl LocationInfo {
    /// Placeholder used when the directory has no entry for a location.
    pub fn unknown(location_id: &str) -> Self {
        Self {
            location_id: location_id.to_string(),
            name: format!("Store #{}", location_id),
            address: String::new(),
            county: None,
        }
    }
}
