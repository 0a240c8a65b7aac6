// Shared fixtures for the end-to-end tests: a scripted retailer behind the
// HttpTransport seam, recording notifiers and a small knowledge base.

pub mod dispatch_tests;
pub mod scan_workflow_tests;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

use bourbon_hunter::config::{ScannerConfig, UpstreamConfig};
use bourbon_hunter::knowledge::KnowledgeBase;
use bourbon_hunter::models::{
    AlertRecord, Channel, InventorySnapshot, KnowledgeEntry, NewSnapshot, Observation, ScanRun, Tier,
};
use bourbon_hunter::plugins::{AlertPayload, ChannelRegistry, DeliveryReceipt, NotifierPlugin};
use bourbon_hunter::scraper::{HttpResponse, HttpTransport, Upstream};
use bourbon_hunter::settings::NotificationSettings;
use bourbon_hunter::store::{AlertRecordStore, MemoryStore, ScanRunStore, SettingsStore, SnapshotStore};
use bourbon_hunter::{AppError, BourbonHunter};

pub const BASE_URL: &str = "https://retailer.test";
pub const CENTER_CITY: &str = "5102";
pub const MAIN_LINE: &str = "4401";

pub const BLANTONS_SKU: &str = "000012345";
pub const BLANTONS_LISTING: &str = "Blanton's Original Single Barrel Bourbon Whiskey 750ml";
pub const WELLER_12_SKU: &str = "000054321";
pub const WELLER_SR_SKU: &str = "000054000";

type RequestHook = Box<dyn Fn(&Url) + Send + Sync>;

/// Retailer double answering search, stock and location requests from
/// scripted bodies. Unscripted searches get a zero-results page and
/// unscripted stock lookups an empty item list.
#[derive(Default)]
pub struct FakeRetailer {
    searches: Mutex<HashMap<String, HttpResponse>>,
    stock: Mutex<HashMap<String, HttpResponse>>,
    locations: Mutex<Option<HttpResponse>>,
    requests: Mutex<Vec<Url>>,
    hook: Mutex<Option<RequestHook>>,
}

impl FakeRetailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_search(&self, term: &str, response: HttpResponse) {
        self.searches.lock().unwrap().insert(term.to_string(), response);
    }

    pub fn on_stock(&self, sku: &str, response: HttpResponse) {
        self.stock.lock().unwrap().insert(sku.to_string(), response);
    }

    pub fn on_locations(&self, response: HttpResponse) {
        *self.locations.lock().unwrap() = Some(response);
    }

    /// Run `hook` on every request, before it is answered.
    pub fn on_request(&self, hook: impl Fn(&Url) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().clone()
    }

    /// Search terms requested so far, in order.
    pub fn searched_terms(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|url| url.path().ends_with("/search"))
            .filter_map(|url| query_value(url, "Ntt"))
            .collect()
    }

    pub fn stock_requests(&self, sku: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.path().ends_with("/stockStatus"))
            .filter(|url| query_value(url, "products").as_deref() == Some(sku))
            .count()
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl HttpTransport for FakeRetailer {
    async fn get(&self, url: &Url) -> bourbon_hunter::Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.clone());
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(url);
        }

        let path = url.path();
        let response = if path.ends_with("/search") {
            let term = query_value(url, "Ntt").unwrap_or_default();
            self.searches
                .lock()
                .unwrap()
                .get(&term)
                .cloned()
                .unwrap_or_else(|| HttpResponse::ok(empty_search_page()))
        } else if path.ends_with("/ccstore/v1/stockStatus") {
            let sku = query_value(url, "products").unwrap_or_default();
            self.stock
                .lock()
                .unwrap()
                .get(&sku)
                .cloned()
                .unwrap_or_else(|| HttpResponse::ok(r#"{"items": []}"#))
        } else if path.ends_with("/ccstore/v1/locations") {
            self.locations
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| HttpResponse::ok(r#"{"items": []}"#))
        } else {
            HttpResponse {
                status: 404,
                body: String::new(),
            }
        };

        Ok(response)
    }
}

/// Search page carrying its results as a schema.org `ItemList`.
pub fn search_page(products: &[(&str, &str, &str)]) -> HttpResponse {
    let elements: Vec<_> = products
        .iter()
        .enumerate()
        .map(|(i, (sku, name, price))| {
            serde_json::json!({
                "@type": "ListItem",
                "position": i + 1,
                "item": {
                    "@type": "Product",
                    "name": name,
                    "sku": sku,
                    "url": format!("/en/product/{}", sku.trim_start_matches('0')),
                    "offers": {"@type": "Offer", "price": price, "priceCurrency": "USD"}
                }
            })
        })
        .collect();
    let list = serde_json::json!({"@context": "https://schema.org", "@type": "ItemList", "itemListElement": elements});

    HttpResponse::ok(format!(
        r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
        list
    ))
}

pub fn empty_search_page() -> String {
    r#"<html><body><div class="search-no-results">No results found</div></body></html>"#.to_string()
}

/// Stock status body for `sku` with one row per (location, quantity).
pub fn stock_body(sku: &str, levels: &[(&str, u32)]) -> HttpResponse {
    let items: Vec<_> = levels
        .iter()
        .map(|(location_id, quantity)| {
            serde_json::json!({
                "locationId": location_id,
                "stockStatus": if *quantity > 0 { "IN_STOCK" } else { "OUT_OF_STOCK" },
                "productSkuInventoryStatus": {sku: quantity}
            })
        })
        .collect();
    HttpResponse::ok(serde_json::json!({ "items": items }).to_string())
}

pub fn locations_body() -> HttpResponse {
    HttpResponse::ok(
        serde_json::json!({
            "items": [
                {"locationId": CENTER_CITY, "name": "Philadelphia - Center City", "address1": "1218 Chestnut St", "city": "Philadelphia", "postalCode": "19107", "county": "Philadelphia"},
                {"locationId": MAIN_LINE, "name": "Ardmore", "address1": "48 Coulter Ave", "city": "Ardmore", "postalCode": "19003", "county": "Montgomery"}
            ]
        })
        .to_string(),
    )
}

pub fn test_knowledge_base() -> KnowledgeBase {
    KnowledgeBase::new(vec![
        KnowledgeEntry::new(
            "blantons-original",
            "Blanton's Original Single Barrel",
            Tier::HIGHLY_ALLOCATED,
            &["blantons"],
            &["blantons"],
        )
        .with_distillery("Buffalo Trace"),
        KnowledgeEntry::new("weller-12", "Weller 12 Year", Tier::ALLOCATED, &["weller"], &["weller"]),
        KnowledgeEntry::new(
            "weller-special-reserve",
            "Weller Special Reserve",
            Tier::WORTH_TRACKING,
            &["weller"],
            &["special reserve"],
        ),
    ])
    .unwrap()
}

/// Every tier routed to every channel; all deliverable channels enabled.
pub fn all_channels_settings() -> NotificationSettings {
    let everything = vec![
        Channel::Email,
        Channel::Sms,
        Channel::Discord,
        Channel::Slack,
        Channel::Dashboard,
    ];
    let routing = (1..=4)
        .map(|t| (Tier::new(t).unwrap(), everything.clone()))
        .collect();

    Channel::DELIVERABLE
        .into_iter()
        .fold(NotificationSettings::new(routing), NotificationSettings::enable)
}

/// Notifier that records every payload, optionally failing each send.
pub struct RecordingNotifier {
    channel: Channel,
    fail: bool,
    sent: Mutex<Vec<AlertPayload>>,
}

impl RecordingNotifier {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail: false,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail: true,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<AlertPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, payload: &AlertPayload) -> bourbon_hunter::Result<DeliveryReceipt> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(AppError::delivery(self.channel, "upstream rejected the message"));
        }
        Ok(DeliveryReceipt {
            channel: self.channel,
            message_id: None,
            detail: format!("delivered to {} test sink", self.channel),
        })
    }
}

/// One recording notifier per deliverable channel.
pub struct Notifiers {
    pub email: Arc<RecordingNotifier>,
    pub sms: Arc<RecordingNotifier>,
    pub discord: Arc<RecordingNotifier>,
    pub slack: Arc<RecordingNotifier>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self {
            email: RecordingNotifier::new(Channel::Email),
            sms: RecordingNotifier::new(Channel::Sms),
            discord: RecordingNotifier::new(Channel::Discord),
            slack: RecordingNotifier::new(Channel::Slack),
        }
    }

    pub async fn registry(&self) -> ChannelRegistry {
        let registry = ChannelRegistry::new();
        registry.register(self.email.clone()).await;
        registry.register(self.sms.clone()).await;
        registry.register(self.discord.clone()).await;
        registry.register(self.slack.clone()).await;
        registry
    }

    pub fn total_sent(&self) -> usize {
        [&self.email, &self.sms, &self.discord, &self.slack]
            .iter()
            .map(|n| n.sent().len())
            .sum()
    }
}

pub fn upstream(retailer: &Arc<FakeRetailer>) -> Upstream {
    let upstream_config = UpstreamConfig {
        base_url: BASE_URL.to_string(),
        location_pages: 1,
        ..UpstreamConfig::default()
    };
    let scanner_config = ScannerConfig {
        request_delay_ms: 0,
        knowledge_base_path: None,
    };
    let transport: Arc<dyn HttpTransport> = retailer.clone();
    Upstream::new(transport, &upstream_config, &scanner_config).unwrap()
}

/// A retailer carrying Blanton's at Center City only, plus both Wellers out of stock.
pub fn stocked_retailer() -> Arc<FakeRetailer> {
    let retailer = FakeRetailer::new();
    retailer.on_search(
        "blantons",
        search_page(&[
            (BLANTONS_SKU, BLANTONS_LISTING, "64.99"),
            ("000099999", "Kentucky Straight Bourbon Whiskey 90pf", "19.99"),
        ]),
    );
    retailer.on_search(
        "weller",
        search_page(&[
            (WELLER_12_SKU, "Weller 12 Year Old Wheated Bourbon", "39.99"),
            (WELLER_SR_SKU, "W.L. Weller Special Reserve Bourbon", "29.99"),
        ]),
    );
    retailer.on_stock(BLANTONS_SKU, stock_body(BLANTONS_SKU, &[(CENTER_CITY, 3), (MAIN_LINE, 0)]));
    retailer.on_locations(locations_body());
    retailer
}

/// Everything a test needs to drive and inspect one service instance.
pub struct TestHarness {
    pub hunter: BourbonHunter,
    pub retailer: Arc<FakeRetailer>,
    pub store: Arc<MemoryStore>,
    pub notifiers: Notifiers,
}

pub async fn create_test_hunter(retailer: Arc<FakeRetailer>, settings: NotificationSettings) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let notifiers = Notifiers::new();
    let registry = notifiers.registry().await;

    let hunter = BourbonHunter::new(
        test_knowledge_base(),
        upstream(&retailer),
        store.clone(),
        registry,
        settings,
    );

    TestHarness {
        hunter,
        retailer,
        store,
        notifiers,
    }
}

/// Memory store whose snapshot writes fail, for store-failure paths.
#[derive(Default)]
pub struct BrokenSnapshotStore {
    inner: MemoryStore,
}

#[async_trait]
impl SnapshotStore for BrokenSnapshotStore {
    async fn latest(&self, sku: &str, location_id: &str) -> bourbon_hunter::Result<Option<InventorySnapshot>> {
        self.inner.latest(sku, location_id).await
    }

    async fn append(&self, _snapshot: &InventorySnapshot) -> bourbon_hunter::Result<()> {
        Err(AppError::Storage("disk I/O error".to_string()))
    }

    async fn observe(&self, _snapshot: NewSnapshot) -> bourbon_hunter::Result<Observation> {
        Err(AppError::Storage("disk I/O error".to_string()))
    }

    async fn recent_finds(&self, limit: usize) -> bourbon_hunter::Result<Vec<InventorySnapshot>> {
        self.inner.recent_finds(limit).await
    }
}

#[async_trait]
impl AlertRecordStore for BrokenSnapshotStore {
    async fn recent(
        &self,
        entry_id: &str,
        location_id: &str,
        channel: Channel,
        since: chrono::DateTime<chrono::Utc>,
    ) -> bourbon_hunter::Result<Vec<AlertRecord>> {
        AlertRecordStore::recent(&self.inner, entry_id, location_id, channel, since).await
    }

    async fn append(&self, record: &AlertRecord) -> bourbon_hunter::Result<()> {
        AlertRecordStore::append(&self.inner, record).await
    }
}

#[async_trait]
impl ScanRunStore for BrokenSnapshotStore {
    async fn save(&self, run: &ScanRun) -> bourbon_hunter::Result<()> {
        self.inner.save(run).await
    }

    async fn recent(&self, limit: usize) -> bourbon_hunter::Result<Vec<ScanRun>> {
        ScanRunStore::recent(&self.inner, limit).await
    }
}

#[async_trait]
impl SettingsStore for BrokenSnapshotStore {
    async fn settings(&self) -> bourbon_hunter::Result<HashMap<String, String>> {
        self.inner.settings().await
    }

    async fn put_setting(&self, key: &str, value: &str) -> bourbon_hunter::Result<()> {
        self.inner.put_setting(key, value).await
    }
}

/// Poll `condition` every 10ms until it holds or `timeout_ms` elapses.
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    false
}
