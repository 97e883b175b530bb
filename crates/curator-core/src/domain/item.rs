//! Candidate content items as produced by the ingestion collaborator.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::digest::ContentDigest;
use crate::domain::error::{CuratorError, Result};

/// Stable identity of an item: SHA-256 of its source locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Derive the id from the item's source locator (normally its URL).
    pub fn from_locator(locator: &str) -> Self {
        Self(ContentDigest::from_bytes(locator.trim().as_bytes()).as_str().to_string())
    }

    /// Wrap an already-computed id (e.g. echoed back by the completion service).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provenance of an item relative to the event it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAuthority {
    /// Official announcement, paper, release notes, engineering blog.
    Primary,
    /// Coverage of someone else's announcement.
    Secondary,
    #[default]
    Unknown,
}

impl SourceAuthority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Unknown => "unknown",
        }
    }
}

/// Discussion-site signal attached by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrendingSignal {
    pub on_discussion_site: bool,
    pub comment_count: u32,
}

impl TrendingSignal {
    /// Comment threshold above which the trending signal counts as verified.
    pub const VERIFIED_COMMENT_THRESHOLD: u32 = 15;

    pub fn is_verified(&self) -> bool {
        self.on_discussion_site && self.comment_count > Self::VERIFIED_COMMENT_THRESHOLD
    }
}

/// An immutable unit of candidate content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    /// Original locator. Empty when ingestion could not resolve one.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub raw_content: String,
    pub source: String,
    #[serde(default)]
    pub authority: SourceAuthority,
    pub published_at: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    pub trending: Option<TrendingSignal>,
}

impl Item {
    /// Create an item, deriving its id from `url` (or from `title` when no URL exists).
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
        category: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        let title = title.into();
        let locator = if url.trim().is_empty() { &title } else { &url };
        Self {
            id: ItemId::from_locator(locator),
            title,
            url,
            description: String::new(),
            raw_content: String::new(),
            source: source.into(),
            authority: SourceAuthority::Unknown,
            published_at,
            category: category.into(),
            trending: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_raw_content(mut self, raw: impl Into<String>) -> Self {
        self.raw_content = raw.into();
        self
    }

    pub fn with_authority(mut self, authority: SourceAuthority) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_trending(mut self, signal: TrendingSignal) -> Self {
        self.trending = Some(signal);
        self
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Best available body text: raw content, then description.
    pub fn body_text(&self) -> &str {
        if self.raw_content.trim().is_empty() {
            &self.description
        } else {
            &self.raw_content
        }
    }

    pub fn word_count(&self) -> usize {
        self.body_text().split_whitespace().count()
    }
}

/// The raw item pool handed over by ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPool {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    pub items: Vec<Item>,
}

impl ItemPool {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            generated_at: None,
            items,
        }
        .deduplicated()
    }

    /// Load a pool from JSON. A missing file is a fatal configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CuratorError::InvalidItem(format!("cannot read item pool {}: {e}", path.display()))
        })?;
        let pool: ItemPool = serde_json::from_str(&json)?;
        Ok(pool.deduplicated())
    }

    /// Drop repeated ids, keeping the first occurrence, so re-ingested items are
    /// processed once.
    fn deduplicated(mut self) -> Self {
        let mut seen = HashSet::new();
        self.items.retain(|item| seen.insert(item.id.clone()));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T06:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn test_item_id_is_stable_over_locator() {
        let a = Item::new("https://example.com/a", "A", "Blog", "ai", ts());
        let b = Item::new("https://example.com/a", "Different title", "Blog", "ai", ts());
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_item_without_url_hashes_title() {
        let item = Item::new("", "Untitled launch", "Blog", "ai", ts());
        assert_eq!(item.id, ItemId::from_locator("Untitled launch"));
        assert!(!item.has_url());
    }

    #[test]
    fn test_body_text_prefers_raw_content() {
        let item = Item::new("https://example.com", "t", "s", "c", ts())
            .with_description("short desc")
            .with_raw_content("the full raw body text");
        assert_eq!(item.body_text(), "the full raw body text");
        assert_eq!(item.word_count(), 5);
    }

    #[test]
    fn test_trending_signal_threshold() {
        let weak = TrendingSignal {
            on_discussion_site: true,
            comment_count: 15,
        };
        let strong = TrendingSignal {
            on_discussion_site: true,
            comment_count: 16,
        };
        assert!(!weak.is_verified());
        assert!(strong.is_verified());
    }

    #[test]
    fn test_pool_drops_duplicate_ids() {
        let a = Item::new("https://example.com/a", "A", "Blog", "ai", ts());
        let again = Item::new("https://example.com/a", "A (updated)", "Blog", "ai", ts());
        let b = Item::new("https://example.com/b", "B", "Blog", "ai", ts());
        let pool = ItemPool::new(vec![a, again, b]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.items[0].title, "A");
    }
}
