//! Upstream retailer clients.
//!
//! Everything here goes through one [`HttpTransport`] and one [`RequestPacer`],
//! so the inter-request delay holds across search, stock and directory calls.

pub mod catalog;
pub mod locations;
pub mod pacer;
pub mod stock;
pub mod transport;

pub use catalog::{CatalogClient, ListingParser};
pub use locations::LocationDirectory;
pub use pacer::RequestPacer;
pub use stock::StockClient;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

use std::sync::Arc;
use url::Url;

use crate::config::{ScannerConfig, UpstreamConfig};
use crate::utils::error::{AppError, Result};

/// `base` with `path` appended to whatever path it already has.
pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url
}

/// The three upstream clients sharing one transport and pacer.
pub struct Upstream {
    pub catalog: CatalogClient,
    pub stock: StockClient,
    pub locations: LocationDirectory,
    pub pacer: Arc<RequestPacer>,
}

impl Upstream {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        upstream: &UpstreamConfig,
        scanner: &ScannerConfig,
    ) -> Result<Self> {
        let base_url = Url::parse(&upstream.base_url)
            .map_err(|e| AppError::Configuration(format!("invalid upstream base URL: {}", e)))?;
        let pacer = Arc::new(RequestPacer::from_millis(scanner.request_delay_ms));

        Ok(Self {
            catalog: CatalogClient::new(transport.clone(), pacer.clone(), base_url.clone()),
            stock: StockClient::new(transport.clone(), pacer.clone(), base_url.clone())
                .with_locations(upstream.location_ids.clone()),
            locations: LocationDirectory::new(
                transport,
                pacer.clone(),
                base_url,
                upstream.location_page_size,
                upstream.location_pages,
            ),
            pacer,
        })
    }

    /// Clients backed by a real HTTP client.
    pub fn from_config(upstream: &UpstreamConfig, scanner: &ScannerConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(upstream)?);
        Self::new(transport, upstream, scanner)
    }
}
