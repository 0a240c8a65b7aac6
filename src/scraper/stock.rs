use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use super::catalog::extract_price;
use super::endpoint;
use super::pacer::RequestPacer;
use super::transport::HttpTransport;
use crate::models::StockLevel;
use crate::utils::error::{AppError, Result};

/// Location ids per request, to keep the query string bounded.
pub const LOCATION_BATCH_SIZE: usize = 100;

const IN_STOCK: &str = "IN_STOCK";

#[derive(Debug, Deserialize)]
struct StockStatusResponse {
    items: Vec<StockStatusItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockStatusItem {
    #[serde(default)]
    location_id: Option<Value>,
    #[serde(default)]
    stock_status: Option<String>,
    #[serde(default)]
    product_sku_inventory_status: HashMap<String, Value>,
    #[serde(default)]
    sale_price: Option<Value>,
    #[serde(default)]
    list_price: Option<Value>,
}

impl StockStatusItem {
    fn into_level(self, sku: &str) -> Option<StockLevel> {
        let location_id = match self.location_id? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let in_stock = self.stock_status.as_deref() == Some(IN_STOCK);
        let quantity = if in_stock {
            self.product_sku_inventory_status
                .get(sku)
                .and_then(quantity_of)
                .unwrap_or(0)
        } else {
            0
        };

        let price = self
            .sale_price
            .or(self.list_price)
            .and_then(|v| match v {
                Value::Number(n) => extract_price(&n.to_string()),
                Value::String(s) => extract_price(&s),
                _ => None,
            });

        Some(StockLevel {
            location_id,
            quantity,
            price,
        })
    }
}

fn quantity_of(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|q| q.min(u32::MAX as u64) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a stock status body for `sku`. An empty item list is a valid answer.
pub fn parse_stock_status(body: &str, sku: &str, url: &Url) -> Result<Vec<StockLevel>> {
    let response: StockStatusResponse = serde_json::from_str(body)
        .map_err(|e| AppError::parse(url.as_str(), format!("unexpected stock status body: {}", e)))?;

    Ok(response
        .items
        .into_iter()
        .filter_map(|item| item.into_level(sku))
        .collect())
}

/// Per-location stock lookup for one SKU.
pub struct StockClient {
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<RequestPacer>,
    base_url: Url,
    location_ids: Vec<String>,
}

impl StockClient {
    pub fn new(transport: Arc<dyn HttpTransport>, pacer: Arc<RequestPacer>, base_url: Url) -> Self {
        Self {
            transport,
            pacer,
            base_url,
            location_ids: Vec::new(),
        }
    }

    /// Restrict lookups to these locations.
    pub fn with_locations(mut self, location_ids: Vec<String>) -> Self {
        self.location_ids = location_ids;
        self
    }

    pub fn stock_url(&self, sku: &str, locations: Option<&[String]>) -> Url {
        let mut url = endpoint(&self.base_url, "ccstore/v1/stockStatus");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("products", sku);
            if let Some(ids) = locations {
                query.append_pair("locationIds", &ids.join(","));
            }
            query.append_pair("actualStockStatus", "true");
        }
        url
    }

    pub async fn stock(&self, sku: &str) -> Result<Vec<StockLevel>> {
        if self.location_ids.is_empty() {
            return self.fetch(sku, None).await;
        }

        let mut levels = Vec::new();
        for batch in self.location_ids.chunks(LOCATION_BATCH_SIZE) {
            levels.extend(self.fetch(sku, Some(batch)).await?);
        }
        Ok(levels)
    }

    async fn fetch(&self, sku: &str, locations: Option<&[String]>) -> Result<Vec<StockLevel>> {
        let url = self.stock_url(sku, locations);

        self.pacer.wait().await;
        let response = self.transport.get(&url).await?;

        if !response.is_success() {
            return Err(AppError::unavailable(
                url.as_str(),
                format!("stock status returned HTTP {}", response.status),
            ));
        }

        let levels = parse_stock_status(&response.body, sku, &url)?;
        tracing::debug!(sku, locations = levels.len(), "Fetched stock status");
        Ok(levels)
    }
}
