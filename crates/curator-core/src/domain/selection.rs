//! Tier-annotated selections and their structural invariants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::item::{Item, ItemId};
use crate::domain::segment::SelectionBounds;

/// Presentation tier: how much detail an item receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Full,
    Quick,
    Trending,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Full, Tier::Quick, Tier::Trending];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Full => "full",
            Tier::Quick => "quick",
            Tier::Trending => "trending",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Tier::Full),
            "quick" => Ok(Tier::Quick),
            "trending" => Ok(Tier::Trending),
            other => Err(format!("unknown tier '{other}' (must be full/quick/trending)")),
        }
    }
}

/// One selected item plus the metadata attached by selection and enrichment.
///
/// Healers patch the presentation fields (`summary`, `read_time_minutes`,
/// `tracked_url`) in place; `item` itself is never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub item: Item,
    pub tier: Tier,
    pub selection_reason: String,
    pub audience_value: String,
    /// 1–10 as requested; out-of-range values from the service are kept and
    /// clamped by consumers.
    pub urgency_score: i32,
    pub category_tag: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub read_time_minutes: Option<u32>,
    #[serde(default)]
    pub tracked_url: Option<String>,
}

impl SelectedItem {
    pub fn new(item: Item, tier: Tier, category_tag: impl Into<String>, urgency_score: i32) -> Self {
        Self {
            item,
            tier,
            selection_reason: String::new(),
            audience_value: String::new(),
            urgency_score,
            category_tag: category_tag.into(),
            summary: String::new(),
            read_time_minutes: None,
            tracked_url: None,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.item.id
    }

    /// Read time that is present and non-zero.
    pub fn valid_read_time(&self) -> Option<u32> {
        self.read_time_minutes.filter(|m| *m > 0)
    }
}

/// Structural invariant violation in a Selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionViolation {
    TotalOutOfRange {
        actual: usize,
        min: usize,
        max: usize,
    },
    TierShortfall {
        tier: Tier,
        actual: usize,
        required: usize,
    },
}

impl fmt::Display for SelectionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionViolation::TotalOutOfRange { actual, min, max } => write!(
                f,
                "{actual} items selected, but the total must be between {min} and {max}"
            ),
            SelectionViolation::TierShortfall {
                tier,
                actual,
                required,
            } => write!(
                f,
                "{actual} of {required} required `{tier}`-tier items present"
            ),
        }
    }
}

/// The chosen, tier-annotated subset of items for one segment and run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub segment_id: String,
    pub items: Vec<SelectedItem>,
    /// Size of the raw pool the selection was drawn from; 0 when unknown.
    #[serde(default)]
    pub pool_size: usize,
}

impl Selection {
    pub fn new(segment_id: impl Into<String>, items: Vec<SelectedItem>) -> Self {
        Self {
            segment_id: segment_id.into(),
            items,
            pool_size: 0,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tier_count(&self, tier: Tier) -> usize {
        self.items.iter().filter(|i| i.tier == tier).count()
    }

    pub fn in_tier(&self, tier: Tier) -> impl Iterator<Item = &SelectedItem> {
        self.items.iter().filter(move |i| i.tier == tier)
    }

    /// Every violated bound, in a fixed order (total first, then tiers).
    pub fn check_invariants(&self, bounds: &SelectionBounds) -> Vec<SelectionViolation> {
        let mut violations = Vec::new();
        let total = self.len();
        if total < bounds.min_total || total > bounds.max_total {
            violations.push(SelectionViolation::TotalOutOfRange {
                actual: total,
                min: bounds.min_total,
                max: bounds.max_total,
            });
        }

        let minimums = [
            (Tier::Full, bounds.min_full),
            (Tier::Quick, bounds.min_quick),
            (Tier::Trending, bounds.min_trending),
        ];
        for (tier, required) in minimums {
            let actual = self.tier_count(tier);
            if actual < required {
                violations.push(SelectionViolation::TierShortfall {
                    tier,
                    actual,
                    required,
                });
            }
        }
        violations
    }
}
