use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use url::Url;

use super::pacer::RequestPacer;
use super::transport::HttpTransport;
use super::endpoint;
use crate::models::ScrapedListing;
use crate::utils::error::{AppError, Result};

// Match integers and decimals, with optional thousand separators
static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)").expect("price pattern"));

static PRODUCT_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/product/(?:[^/?#]+/)*?(\d{3,})|cdeNo=(\d+))").expect("product code pattern"));

const TILE_SELECTOR: &str = "[data-product-id], .product-card, .card, .product-card-link";
const NAME_SELECTOR: &str = ".card__title, .product-title, .product-name, h2, h3";
const PRICE_SELECTOR: &str = ".card__price-amount, .product-price, .price";
const SIZE_SELECTOR: &str = ".card__size, .product-size";
const NO_RESULTS_SELECTOR: &str = ".no-results, .search-no-results, [data-no-results]";
const NO_RESULTS_PHRASES: &[&str] = &["no results found", "did not match any products", "0 results for"];

pub fn extract_price(text: &str) -> Option<Decimal> {
    let captures = PRICE_PATTERN.captures(text)?;
    let number = captures.get(1)?.as_str().replace(',', "");
    Decimal::from_str(&number).ok()
}

/// Numeric product code from a product URL (`/product/<digits>` or `cdeNo=<digits>`).
pub fn extract_product_code(href: &str) -> Option<String> {
    let captures = PRODUCT_CODE_PATTERN.captures(href)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

/// One way of reading listings out of a search page.
///
/// `None` means the parser did not recognize the page. `Some` with an empty
/// list means the page was recognized and confirms zero results.
pub trait ListingParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, document: &Html, base: &Url, term: &str) -> Option<Vec<ScrapedListing>>;
}

/// schema.org `ItemList` / `Product` blobs in `application/ld+json` scripts.
pub struct EmbeddedDataParser;

impl EmbeddedDataParser {
    fn product(value: &Value, base: &Url, term: &str) -> Option<ScrapedListing> {
        let name = json_text(value.get("name")?)?;
        let url = value
            .get("url")
            .and_then(json_text)
            .and_then(|href| base.join(&href).ok())
            .map(String::from);

        let sku = ["sku", "productID", "mpn"]
            .iter()
            .find_map(|k| value.get(*k).and_then(json_text))
            .or_else(|| url.as_deref().and_then(extract_product_code))?;

        let mut listing = ScrapedListing::new(&sku, name.trim(), term);
        listing.price = value.get("offers").and_then(offer_price);
        listing.image_url = value.get("image").and_then(image_url);
        listing.url = url;
        listing.size = value.get("size").and_then(json_text);
        Some(listing)
    }

    fn collect(value: &Value, base: &Url, term: &str, found: &mut Option<Vec<ScrapedListing>>) {
        match value {
            Value::Array(items) => {
                for item in items {
                    Self::collect(item, base, term, found);
                }
            }
            Value::Object(map) => {
                if let Some(graph) = map.get("@graph") {
                    Self::collect(graph, base, term, found);
                }
                match map.get("@type").and_then(Value::as_str) {
                    Some("ItemList") => {
                        let elements = map
                            .get("itemListElement")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        let listings = found.get_or_insert_with(Vec::new);
                        for element in &elements {
                            let product = element.get("item").unwrap_or(element);
                            if let Some(listing) = Self::product(product, base, term) {
                                listings.push(listing);
                            }
                        }
                        if !elements.is_empty() && listings.is_empty() {
                            // Elements we could not read are not a confirmed empty page
                            *found = None;
                        }
                    }
                    Some("Product") => {
                        if let Some(listing) = Self::product(value, base, term) {
                            found.get_or_insert_with(Vec::new).push(listing);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

impl ListingParser for EmbeddedDataParser {
    fn name(&self) -> &'static str {
        "embedded-data"
    }

    fn parse(&self, document: &Html, base: &Url, term: &str) -> Option<Vec<ScrapedListing>> {
        let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
        let mut found = None;

        for script in document.select(&selector) {
            let text = script.text().collect::<String>();
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => Self::collect(&value, base, term, &mut found),
                Err(e) => tracing::debug!("Skipping unreadable ld+json block: {}", e),
            }
        }

        found
    }
}

/// Product tiles in the rendered markup.
pub struct ProductTileParser;

impl ProductTileParser {
    fn tile(tile: ElementRef<'_>, base: &Url, term: &str) -> Option<ScrapedListing> {
        let name = select_text(tile, NAME_SELECTOR)?;

        let href = if tile.value().name() == "a" {
            tile.value().attr("href").map(str::to_string)
        } else {
            select_first(tile, "a[href]").and_then(|a| a.value().attr("href").map(str::to_string))
        };
        let url = href.as_deref().and_then(|h| base.join(h).ok()).map(String::from);

        let sku = ["data-product-id", "data-sku"]
            .iter()
            .find_map(|attr| tile.value().attr(attr))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| href.as_deref().and_then(extract_product_code))?;

        let mut listing = ScrapedListing::new(&sku, &name, term);
        listing.price = select_text(tile, PRICE_SELECTOR).as_deref().and_then(extract_price);
        listing.size = select_text(tile, SIZE_SELECTOR);
        listing.image_url = select_first(tile, "img")
            .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .and_then(|src| base.join(src).ok())
            .map(String::from);
        listing.url = url;
        Some(listing)
    }

    fn has_no_results_marker(document: &Html) -> bool {
        if let Ok(selector) = Selector::parse(NO_RESULTS_SELECTOR) {
            if document.select(&selector).next().is_some() {
                return true;
            }
        }
        let text = document.root_element().text().collect::<String>().to_lowercase();
        NO_RESULTS_PHRASES.iter().any(|phrase| text.contains(phrase))
    }
}

impl ListingParser for ProductTileParser {
    fn name(&self) -> &'static str {
        "product-tiles"
    }

    fn parse(&self, document: &Html, base: &Url, term: &str) -> Option<Vec<ScrapedListing>> {
        let selector = Selector::parse(TILE_SELECTOR).ok()?;
        let mut seen = HashSet::new();
        let listings: Vec<_> = document
            .select(&selector)
            .filter_map(|tile| Self::tile(tile, base, term))
            .filter(|listing| seen.insert(listing.sku.clone()))
            .collect();

        if !listings.is_empty() {
            return Some(listings);
        }
        if Self::has_no_results_marker(document) {
            return Some(Vec::new());
        }
        None
    }
}

pub fn default_parsers() -> Vec<Box<dyn ListingParser>> {
    vec![Box::new(EmbeddedDataParser), Box::new(ProductTileParser)]
}

/// Run the parsers in order; the first that finds listings wins.
///
/// A parser confirming zero results only settles the page once every later
/// parser has also come up empty.
pub fn parse_search_page(
    parsers: &[Box<dyn ListingParser>],
    body: &str,
    url: &Url,
    term: &str,
) -> Result<Vec<ScrapedListing>> {
    let document = Html::parse_document(body);
    let mut confirmed_empty = None;

    for parser in parsers {
        match parser.parse(&document, url, term) {
            Some(listings) if !listings.is_empty() => {
                tracing::debug!(term, parser = parser.name(), count = listings.len(), "Parsed search page");
                return Ok(listings);
            }
            Some(_) => {
                confirmed_empty.get_or_insert(parser.name());
            }
            None => {}
        }
    }

    if let Some(parser) = confirmed_empty {
        tracing::debug!(term, parser, "Search page confirms zero results");
        return Ok(Vec::new());
    }

    Err(AppError::parse(
        url.as_str(),
        "no listings and no zero-results marker on search page",
    ))
}

/// Catalog search: one paced GET per term.
pub struct CatalogClient {
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<RequestPacer>,
    base_url: Url,
    parsers: Vec<Box<dyn ListingParser>>,
}

impl CatalogClient {
    pub fn new(transport: Arc<dyn HttpTransport>, pacer: Arc<RequestPacer>, base_url: Url) -> Self {
        Self {
            transport,
            pacer,
            base_url,
            parsers: default_parsers(),
        }
    }

    pub fn with_parsers(mut self, parsers: Vec<Box<dyn ListingParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn search_url(&self, term: &str) -> Url {
        let mut url = endpoint(&self.base_url, "search");
        url.query_pairs_mut().append_pair("Ntt", term);
        url
    }

    pub async fn search(&self, term: &str) -> Result<Vec<ScrapedListing>> {
        let url = self.search_url(term);

        self.pacer.wait().await;
        let response = self.transport.get(&url).await?;

        if !response.is_success() {
            return Err(AppError::unavailable(
                url.as_str(),
                format!("search returned HTTP {}", response.status),
            ));
        }

        parse_search_page(&self.parsers, &response.body, &url, term)
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn offer_price(offers: &Value) -> Option<Decimal> {
    match offers {
        Value::Array(items) => items.iter().find_map(offer_price),
        Value::Object(map) => ["price", "lowPrice"]
            .iter()
            .find_map(|k| map.get(*k).and_then(json_text))
            .and_then(|text| extract_price(&text)),
        _ => None,
    }
}

fn image_url(image: &Value) -> Option<String> {
    match image {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(image_url),
        Value::Object(map) => map.get("url").and_then(json_text),
        _ => None,
    }
}

fn select_first<'a>(element: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    element.select(&selector).next()
}

fn select_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let text = select_first(element, css)?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}
