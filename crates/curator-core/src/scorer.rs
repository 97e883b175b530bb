//! Newsworthiness Scorer.
//!
//! A pure function of a Selection. Four weighted components sum to 0-100:
//!
//! | component        | max | measure                                         |
//! |------------------|-----|-------------------------------------------------|
//! | coverage         | 20  | item count relative to the target total          |
//! | urgency          | 40  | mean urgency, mapped onto a 1-5 scale            |
//! | audience value   | 30  | mean substance of the `audience_value` text      |
//! | full-tier ratio  | 10  | full-tier count relative to the full-tier target |

use serde::{Deserialize, Serialize};

use crate::domain::{SelectedItem, Selection, Tier, TierTargets};

const COVERAGE_WEIGHT: f64 = 20.0;
const URGENCY_WEIGHT: f64 = 40.0;
const AUDIENCE_WEIGHT: f64 = 30.0;
const FULL_RATIO_WEIGHT: f64 = 10.0;

/// Words of `audience_value` text that count as a fully substantive answer.
const SUBSTANTIVE_WORDS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsTier {
    MustRead,
    Relevant,
    Interesting,
}

impl NewsTier {
    pub fn from_value(value: f64) -> Self {
        if value >= 90.0 {
            NewsTier::MustRead
        } else if value >= 60.0 {
            NewsTier::Relevant
        } else {
            NewsTier::Interesting
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NewsTier::MustRead => "must_read",
            NewsTier::Relevant => "relevant",
            NewsTier::Interesting => "interesting",
        }
    }
}

/// Score plus its breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Newsworthiness {
    pub value: f64,
    pub tier: NewsTier,
    pub coverage: f64,
    pub urgency: f64,
    pub audience: f64,
    pub full_ratio: f64,
}

/// Score against the default tier targets.
pub fn score(selection: &Selection) -> Newsworthiness {
    score_with(selection, &TierTargets::default())
}

/// Score against explicit tier targets (normally the segment's).
pub fn score_with(selection: &Selection, targets: &TierTargets) -> Newsworthiness {
    let coverage = ratio(selection.len(), targets.total()) * COVERAGE_WEIGHT;
    let full_ratio = ratio(selection.tier_count(Tier::Full), targets.full) * FULL_RATIO_WEIGHT;

    let (urgency, audience) = if selection.is_empty() {
        (0.0, 0.0)
    } else {
        let n = selection.len() as f64;
        let urgency_mean = selection.items.iter().map(urgency_points).sum::<f64>() / n;
        let audience_mean = selection.items.iter().map(audience_signal).sum::<f64>() / n;
        (urgency_mean * URGENCY_WEIGHT, audience_mean * AUDIENCE_WEIGHT)
    };

    let value = (coverage + urgency + audience + full_ratio).clamp(0.0, 100.0);
    Newsworthiness {
        value,
        tier: NewsTier::from_value(value),
        coverage,
        urgency,
        audience,
        full_ratio,
    }
}

/// `actual / target`, capped at 1. A zero target counts as met.
fn ratio(actual: usize, target: usize) -> f64 {
    if target == 0 {
        return 1.0;
    }
    (actual as f64 / target as f64).min(1.0)
}

/// Urgency 1-10 mapped onto 1-5, then onto 0-1.
fn urgency_points(item: &SelectedItem) -> f64 {
    let clamped = item.urgency_score.clamp(1, 10) as f64;
    let normalized = 1.0 + (clamped - 1.0) * 4.0 / 9.0;
    (normalized - 1.0) / 4.0
}

/// Empty -> 0, short -> partial, eight words or more -> 1.
pub fn audience_signal(item: &SelectedItem) -> f64 {
    let words = item.audience_value.split_whitespace().count() as f64;
    (words / SUBSTANTIVE_WORDS).min(1.0)
}
