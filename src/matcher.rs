//! Fuzzy matching of scraped listing names against the knowledge base.
//!
//! Three confidence tiers are tried from strongest to weakest. Every tier is
//! gated by the entry's distinctive words, so a generic listing sharing only
//! words like "kentucky straight bourbon" never matches a specific product.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::knowledge::KnowledgeBase;
use crate::models::{KnowledgeEntry, ScrapedListing};

/// Minimum share of canonical tokens present in the listing for a word-set match.
pub const WORD_SET_THRESHOLD: f64 = 0.8;
/// A word-ratio match needs strictly more than this share.
pub const WORD_RATIO_THRESHOLD: f64 = 0.6;
/// Candidates this short may match when the canonical name contains them.
const SHORT_LISTING_TOKENS: usize = 2;

/// Vocabulary ignored when an entry has no distinctive words of its own.
const GENERIC_WORDS: &[&str] = &[
    "aged", "american", "and", "barrel", "batch", "bottle", "bourbon", "cask", "co", "company",
    "distillery", "edition", "kentucky", "limited", "ml", "of", "old", "original", "proof",
    "release", "reserve", "rye", "select", "single", "small", "special", "straight", "strength",
    "tennessee", "the", "whiskey", "whisky", "year", "years",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchConfidence {
    WordRatio,
    WordSet,
    Substring,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::Substring => "substring",
            MatchConfidence::WordSet => "word_set",
            MatchConfidence::WordRatio => "word_ratio",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryMatch {
    pub entry: Arc<KnowledgeEntry>,
    pub confidence: MatchConfidence,
    /// Number of the entry's distinctive words found in the listing.
    pub distinctive_overlap: usize,
    /// Share of canonical tokens present in the listing.
    pub token_ratio: f64,
}

#[derive(Debug, Clone)]
pub enum MatchResult {
    NoMatch,
    Matched(EntryMatch),
}

impl MatchResult {
    pub fn entry(&self) -> Option<&Arc<KnowledgeEntry>> {
        match self {
            MatchResult::Matched(m) => Some(&m.entry),
            MatchResult::NoMatch => None,
        }
    }

    pub fn confidence(&self) -> Option<MatchConfidence> {
        match self {
            MatchResult::Matched(m) => Some(m.confidence),
            MatchResult::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

/// Lowercase, drop apostrophes, turn other punctuation into spaces, and
/// collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' | '\u{2019}' | '\u{2018}' => {}
            c if c.is_alphanumeric() => cleaned.extend(c.to_lowercase()),
            _ => cleaned.push(' '),
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokenize(text: &str) -> BTreeSet<String> {
    normalize(text).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Whole-word containment of `needle` in `haystack`, both already normalized.
fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

#[derive(Debug, Clone)]
enum Guard {
    Word(String),
    Phrase(String),
}

impl Guard {
    fn hit(&self, listing: &str, tokens: &BTreeSet<String>) -> bool {
        match self {
            Guard::Word(w) => tokens.contains(w),
            Guard::Phrase(p) => contains_words(listing, p),
        }
    }
}

#[derive(Debug, Clone)]
struct PreparedEntry {
    entry: Arc<KnowledgeEntry>,
    canonical: String,
    tokens: BTreeSet<String>,
    guards: Vec<Guard>,
}

impl PreparedEntry {
    fn new(entry: Arc<KnowledgeEntry>) -> Self {
        let canonical = normalize(&entry.name);
        let tokens = tokenize(&entry.name);

        let guards = if entry.distinctive_words.is_empty() {
            tokens
                .iter()
                .filter(|t| !GENERIC_WORDS.contains(&t.as_str()))
                .map(|t| Guard::Word(t.clone()))
                .collect()
        } else {
            entry
                .distinctive_words
                .iter()
                .map(|w| normalize(w))
                .filter(|w| !w.is_empty())
                .map(|w| if w.contains(' ') { Guard::Phrase(w) } else { Guard::Word(w) })
                .collect()
        };

        Self {
            entry,
            canonical,
            tokens,
            guards,
        }
    }

    fn evaluate(&self, listing: &str, listing_tokens: &BTreeSet<String>) -> Option<EntryMatch> {
        let overlap = self.guards.iter().filter(|g| g.hit(listing, listing_tokens)).count();
        if overlap == 0 {
            return None;
        }

        let shared = self.tokens.intersection(listing_tokens).count();
        let ratio = shared as f64 / self.tokens.len().max(1) as f64;

        let substring = contains_words(listing, &self.canonical)
            || (listing_tokens.len() <= SHORT_LISTING_TOKENS && contains_words(&self.canonical, listing));

        let confidence = if substring {
            MatchConfidence::Substring
        } else if shared == self.tokens.len() || ratio >= WORD_SET_THRESHOLD {
            MatchConfidence::WordSet
        } else if ratio > WORD_RATIO_THRESHOLD {
            MatchConfidence::WordRatio
        } else {
            return None;
        };

        Some(EntryMatch {
            entry: self.entry.clone(),
            confidence,
            distinctive_overlap: overlap,
            token_ratio: ratio,
        })
    }
}

/// Higher confidence, then more distinctive words, then fewer search terms,
/// then the longer canonical name, then entry id.
pub(crate) fn rank(a: &EntryMatch, b: &EntryMatch) -> Ordering {
    b.confidence
        .cmp(&a.confidence)
        .then_with(|| b.distinctive_overlap.cmp(&a.distinctive_overlap))
        .then_with(|| a.entry.search_terms.len().cmp(&b.entry.search_terms.len()))
        .then_with(|| tokenize(&b.entry.name).len().cmp(&tokenize(&a.entry.name).len()))
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}

/// Matcher with the knowledge base pre-normalized. Pure and cheap to share.
#[derive(Debug, Clone)]
pub struct Matcher {
    entries: Vec<PreparedEntry>,
}

impl Matcher {
    pub fn new(kb: &KnowledgeBase) -> Self {
        Self {
            entries: kb.entries().iter().cloned().map(PreparedEntry::new).collect(),
        }
    }

    /// Best matching entry for a listing name.
    pub fn match_name(&self, name: &str) -> MatchResult {
        let listing = normalize(name);
        if listing.is_empty() {
            return MatchResult::NoMatch;
        }
        let tokens = tokenize(name);

        self.entries
            .iter()
            .filter_map(|e| e.evaluate(&listing, &tokens))
            .min_by(rank)
            .map(MatchResult::Matched)
            .unwrap_or(MatchResult::NoMatch)
    }

    pub fn match_listing(&self, listing: &ScrapedListing) -> MatchResult {
        self.match_name(&listing.name)
    }

    /// Whether `listing` resolves to `entry_id`. A listing found while searching
    /// for one entry may belong to a different one.
    pub fn belongs_to(&self, listing: &ScrapedListing, entry_id: &str) -> bool {
        self.match_listing(listing)
            .entry()
            .is_some_and(|e| e.id == entry_id)
    }
}

/// One-shot convenience over [`Matcher`].
pub fn match_listing(listing: &ScrapedListing, kb: &KnowledgeBase) -> MatchResult {
    Matcher::new(kb).match_listing(listing)
}
