//! Segment profiles: named audience configurations that drive selection.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{CuratorError, Result};

/// Per-tier counts the completion service is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTargets {
    pub full: usize,
    pub quick: usize,
    pub trending: usize,
}

impl Default for TierTargets {
    fn default() -> Self {
        Self {
            full: 8,
            quick: 4,
            trending: 2,
        }
    }
}

impl TierTargets {
    pub fn total(&self) -> usize {
        self.full + self.quick + self.trending
    }
}

/// Hard acceptance bounds for a Selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub min_total: usize,
    pub max_total: usize,
    pub min_full: usize,
    pub min_quick: usize,
    pub min_trending: usize,
}

impl Default for SelectionBounds {
    fn default() -> Self {
        Self {
            min_total: 10,
            max_total: 15,
            min_full: 6,
            min_quick: 1,
            min_trending: 1,
        }
    }
}

/// Named audience configuration. Loaded once per run; read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    /// Filled from the catalog key when omitted in the file.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    pub description: String,
    #[serde(default)]
    pub focus_keywords: Vec<String>,
    #[serde(default)]
    pub skip_keywords: Vec<String>,
    #[serde(default)]
    pub selection_criteria: String,
    #[serde(default)]
    pub targets: TierTargets,
    #[serde(default)]
    pub bounds: SelectionBounds,
}

impl SegmentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: String::new(),
            description: description.into(),
            focus_keywords: Vec::new(),
            skip_keywords: Vec::new(),
            selection_criteria: String::new(),
            targets: TierTargets::default(),
            bounds: SelectionBounds::default(),
        }
    }

    /// Name plus emoji, as shown in headers.
    pub fn display_name(&self) -> String {
        if self.emoji.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.emoji)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CuratorError::InvalidSegment("segment id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(CuratorError::InvalidSegment(format!(
                "segment {} has an empty name",
                self.id
            )));
        }
        let b = &self.bounds;
        if b.min_total > b.max_total {
            return Err(CuratorError::InvalidSegment(format!(
                "segment {}: min_total {} exceeds max_total {}",
                self.id, b.min_total, b.max_total
            )));
        }
        if b.min_full + b.min_quick + b.min_trending > b.max_total {
            return Err(CuratorError::InvalidSegment(format!(
                "segment {}: tier minimums cannot fit within max_total {}",
                self.id, b.max_total
            )));
        }
        Ok(())
    }
}

/// All configured segments, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentCatalog {
    pub segments: BTreeMap<String, SegmentProfile>,
}

impl SegmentCatalog {
    /// Parse a catalog from JSON of the form `{"segments": {"<id>": {...}}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut catalog: SegmentCatalog = serde_json::from_str(json)?;
        for (key, profile) in catalog.segments.iter_mut() {
            if profile.id.is_empty() {
                profile.id = key.clone();
            }
            profile.validate()?;
        }
        Ok(catalog)
    }

    /// Load the catalog from a file. A missing file is a fatal configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CuratorError::InvalidSegment(format!("cannot read segments file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Result<&SegmentProfile> {
        self.segments
            .get(id)
            .ok_or_else(|| CuratorError::SegmentNotFound(id.to_string()))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &SegmentProfile> {
        self.segments.values()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "segments": {
            "builders": {
                "name": "Builders",
                "emoji": "🛠️",
                "description": "Engineers shipping AI products",
                "focus_keywords": ["sdk", "open source"],
                "skip_keywords": ["celebrity"],
                "selection_criteria": "Prefer tools and releases."
            }
        }
    }"#;

    #[test]
    fn test_example_catalog_loads() {
        let catalog =
            SegmentCatalog::from_json(include_str!("../../../../config/segments.example.json"))
                .expect("parse example");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("leaders").expect("leaders").targets.total(), 14);
    }

    #[test]
    fn test_catalog_fills_id_from_key() {
        let catalog = SegmentCatalog::from_json(CATALOG).expect("parse");
        let profile = catalog.get("builders").expect("builders");
        assert_eq!(profile.id, "builders");
        assert_eq!(profile.bounds, SelectionBounds::default());
        assert_eq!(profile.display_name(), "Builders 🛠️");
    }

    #[test]
    fn test_unknown_segment_is_error() {
        let catalog = SegmentCatalog::from_json(CATALOG).expect("parse");
        let err = catalog.get("leaders").unwrap_err();
        assert!(matches!(err, CuratorError::SegmentNotFound(_)));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let json = r#"{"segments": {"x": {"name": "X", "description": "d",
            "bounds": {"min_total": 20, "max_total": 10, "min_full": 1, "min_quick": 1, "min_trending": 1}}}}"#;
        let err = SegmentCatalog::from_json(json).unwrap_err();
        assert!(err.to_string().contains("min_total"));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = SegmentCatalog::load(Path::new("/nonexistent/segments.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read segments file"));
    }
}
