use crate::models::Tier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One tracked product in the curated catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub distillery: Option<String>,
    #[serde(rename = "rarity_tier")]
    pub tier: Tier,
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub distinctive_words: Vec<String>,

    // Catalog metadata shown in alerts
    #[serde(default)]
    pub proof: Option<f64>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub msrp: Option<Decimal>,
    #[serde(default)]
    pub average_rating: Option<f64>,
}

impl KnowledgeEntry {
    pub fn new(id: &str, name: &str, tier: Tier, search_terms: &[&str], distinctive_words: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            distillery: None,
            tier,
            search_terms: search_terms.iter().map(|s| s.to_string()).collect(),
            distinctive_words: distinctive_words.iter().map(|s| s.to_string()).collect(),
            proof: None,
            age: None,
            msrp: None,
            average_rating: None,
        }
    }

    pub fn with_distillery(mut self, distillery: &str) -> Self {
        self.distillery = Some(distillery.to_string());
        self
    }
}
