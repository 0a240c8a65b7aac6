//! Curated catalog of tracked products.
//!
//! Loaded once at startup, either from the catalog embedded in the binary or
//! from a JSON/TOML file, and never mutated afterwards. Loading enforces the
//! invariants the matcher depends on.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::matcher::{normalize, tokenize};
use crate::models::{KnowledgeEntry, ScanScope, Tier};
use crate::utils::error::{AppError, Result};

const BUILTIN_CATALOG: &str = include_str!("../data/knowledge_base.json");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    entries: Vec<KnowledgeEntry>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<Arc<KnowledgeEntry>>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Result<Self> {
        validate(&entries)?;
        Ok(Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let catalog: CatalogFile = serde_json::from_str(text)
            .map_err(|e| AppError::KnowledgeBase(format!("invalid catalog JSON: {}", e)))?;
        Self::new(catalog.entries)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let catalog: CatalogFile = toml::from_str(text)
            .map_err(|e| AppError::KnowledgeBase(format!("invalid catalog TOML: {}", e)))?;
        Self::new(catalog.entries)
    }

    /// Load a catalog file; the format is picked from the extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let kb = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&text)?,
            _ => Self::from_json(&text)?,
        };
        tracing::info!("Loaded {} knowledge base entries from {}", kb.len(), path.display());
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<KnowledgeEntry>] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&Arc<KnowledgeEntry>> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Entries selected by `scope`, ordered by tier then name.
    pub fn in_scope(&self, scope: ScanScope) -> Vec<Arc<KnowledgeEntry>> {
        let mut selected: Vec<_> = self
            .entries
            .iter()
            .filter(|e| scope.includes(e.tier))
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });
        selected
    }

    pub fn by_tier(&self, tier: Tier) -> Vec<Arc<KnowledgeEntry>> {
        self.entries.iter().filter(|e| e.tier == tier).cloned().collect()
    }
}

fn validate(entries: &[KnowledgeEntry]) -> Result<()> {
    let mut ids = HashSet::new();

    for entry in entries {
        if entry.id.trim().is_empty() {
            return Err(AppError::KnowledgeBase(format!("entry '{}' has an empty id", entry.name)));
        }
        if !ids.insert(entry.id.as_str()) {
            return Err(AppError::KnowledgeBase(format!("duplicate entry id '{}'", entry.id)));
        }

        let name_tokens = tokenize(&entry.name);
        if name_tokens.is_empty() {
            return Err(AppError::KnowledgeBase(format!("entry '{}' has an empty name", entry.id)));
        }
        if entry.search_terms.iter().all(|t| t.trim().is_empty()) {
            return Err(AppError::KnowledgeBase(format!("entry '{}' has no search terms", entry.id)));
        }
        if entry.distinctive_words.iter().any(|w| normalize(w).is_empty()) {
            return Err(AppError::KnowledgeBase(format!(
                "entry '{}' has a blank distinctive word",
                entry.id
            )));
        }
        // A one-word name like "Stagg" would otherwise match any listing containing it
        if name_tokens.len() == 1 && entry.distinctive_words.is_empty() {
            return Err(AppError::KnowledgeBase(format!(
                "entry '{}' has a single-word name and needs distinctive words",
                entry.id
            )));
        }
    }

    Ok(())
}
