use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use super::endpoint;
use super::pacer::RequestPacer;
use super::transport::HttpTransport;
use crate::models::LocationInfo;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct LocationsPage {
    #[serde(default)]
    items: Vec<LocationItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationItem {
    location_id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address1: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    county: Option<String>,
}

impl LocationItem {
    fn into_info(self) -> Option<LocationInfo> {
        let location_id = match self.location_id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let mut address = self.address1.unwrap_or_default();
        if let Some(city) = self.city.filter(|c| !c.is_empty()) {
            address = format!("{}, {}", address, city);
        }
        if let Some(zip) = self.postal_code.filter(|z| !z.is_empty()) {
            address = format!("{} {}", address, zip);
        }

        Some(LocationInfo {
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Store #{}", location_id)),
            location_id,
            address: address.trim_start_matches(", ").to_string(),
            county: self.county.filter(|c| !c.is_empty()),
        })
    }
}

/// Retail location directory, fetched lazily and cached for the process lifetime.
///
/// Only used to decorate alerts; a failed fetch degrades to placeholder names.
pub struct LocationDirectory {
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<RequestPacer>,
    base_url: Url,
    page_size: u32,
    pages: u32,
    cache: RwLock<Option<HashMap<String, LocationInfo>>>,
}

impl LocationDirectory {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        pacer: Arc<RequestPacer>,
        base_url: Url,
        page_size: u32,
        pages: u32,
    ) -> Self {
        Self {
            transport,
            pacer,
            base_url,
            page_size,
            pages,
            cache: RwLock::new(None),
        }
    }

    fn page_url(&self, offset: u32) -> Url {
        let mut url = endpoint(&self.base_url, "ccstore/v1/locations");
        url.query_pairs_mut()
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("offset", &offset.to_string());
        url
    }

    async fn fetch_page(&self, offset: u32) -> Result<Vec<LocationInfo>> {
        let url = self.page_url(offset);

        self.pacer.wait().await;
        let response = self.transport.get(&url).await?;
        if !response.is_success() {
            return Err(AppError::unavailable(
                url.as_str(),
                format!("locations returned HTTP {}", response.status),
            ));
        }

        let page: LocationsPage = serde_json::from_str(&response.body)
            .map_err(|e| AppError::parse(url.as_str(), format!("unexpected locations body: {}", e)))?;
        Ok(page.items.into_iter().filter_map(LocationItem::into_info).collect())
    }

    /// Fetch every page and replace the cache. Individual page failures are
    /// logged; the refresh fails only if no page could be read.
    pub async fn refresh(&self) -> Result<usize> {
        let mut locations = HashMap::new();
        let mut last_error = None;
        let mut any_page = false;

        for page in 0..self.pages {
            let offset = page * self.page_size;
            match self.fetch_page(offset).await {
                Ok(items) => {
                    any_page = true;
                    let count = items.len();
                    for info in items {
                        locations.insert(info.location_id.clone(), info);
                    }
                    if (count as u32) < self.page_size {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(offset, "Failed to fetch locations page: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if !any_page {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let count = locations.len();
        *self.cache.write().await = Some(locations);
        tracing::info!("Loaded {} store locations", count);
        Ok(count)
    }

    /// Load the directory once. Failures are logged and retried on the next call.
    pub async fn ensure_loaded(&self) {
        if self.cache.read().await.is_some() {
            return;
        }
        if let Err(e) = self.refresh().await {
            tracing::warn!("Store directory unavailable, alerts will use placeholder names: {}", e);
        }
    }

    /// Cached info for `location_id`, or a placeholder when unknown.
    pub async fn get(&self, location_id: &str) -> LocationInfo {
        self.cache
            .read()
            .await
            .as_ref()
            .and_then(|locations| locations.get(location_id).cloned())
            .unwrap_or_else(|| LocationInfo::unknown(location_id))
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.as_ref().map_or(0, HashMap::len)
    }
}
