//! Shared fixtures for curator-core integration tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use curator_core::config::{BrandConfig, CuratorConfig};
use curator_core::{Item, SegmentProfile, SelectedItem, Selection, SourceAuthority, Tier, TrendingSignal};

pub fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
}

fn published() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 5, 30, 0)
        .single()
        .expect("timestamp")
}

pub fn brand() -> BrandConfig {
    BrandConfig::default()
}

pub fn profile() -> SegmentProfile {
    let mut profile = SegmentProfile::new(
        "builders",
        "Builders",
        "Engineers and founders shipping AI products",
    );
    profile.emoji = "🛠️".to_string();
    profile.focus_keywords = vec!["sdk".to_string(), "open source".to_string()];
    profile
}

/// Config with no call spacing, no backoff and a scratch runs directory.
pub fn test_config(runs_dir: &std::path::Path) -> CuratorConfig {
    let mut config = CuratorConfig::default();
    config.pipeline.segment_call_spacing_ms = 0;
    config.completion.call_attempts = 1;
    config.completion.initial_backoff_ms = 0;
    config.paths.runs_dir = runs_dir.join("runs");
    config.paths.outbox_dir = runs_dir.join("outbox");
    config
}

/// `n` distinct items; body length grows with the index so read times vary.
pub fn pool(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            let words = "model ".repeat(150 * (i % 6 + 1));
            let category = if i % 2 == 0 { "ai" } else { "tools" };
            let mut item = Item::new(
                format!("https://news.example.com/story-{i}"),
                format!("Story {i}: a release engineers will care about"),
                format!("Source {i}"),
                category,
                published(),
            )
            .with_description(format!(
                "Story {i} ships a new capability. Teams can adopt it this week. Details follow."
            ))
            .with_raw_content(words);
            if i % 3 == 0 {
                item = item.with_authority(SourceAuthority::Primary);
            }
            if i >= n.saturating_sub(2) {
                item = item.with_trending(TrendingSignal {
                    on_discussion_site: true,
                    comment_count: 40,
                });
            }
            item
        })
        .collect()
}

pub fn tier_plan(full: usize, quick: usize, trending: usize) -> Vec<Tier> {
    let mut tiers = vec![Tier::Full; full];
    tiers.extend(vec![Tier::Quick; quick]);
    tiers.extend(vec![Tier::Trending; trending]);
    tiers
}

const CATEGORIES: [&str; 3] = ["🚀 AI & Innovation", "🔐 Security", "💼 Tech Business"];

/// Selection over the first `tiers.len()` items of `items`, fully enriched
/// apart from read times and tracked links, which the composer fills.
pub fn selection_from(items: &[Item], tiers: &[Tier]) -> Selection {
    let selected = items
        .iter()
        .zip(tiers)
        .enumerate()
        .map(|(i, (item, tier))| {
            let mut entry = SelectedItem::new(item.clone(), *tier, CATEGORIES[i % 3], 9 - (i % 4) as i32);
            entry.selection_reason = format!("Concrete launch number {i}");
            entry.audience_value = "Builders can ship this feature with the new SDK today".to_string();
            entry.summary = format!(
                "Story {i} explains what shipped, who can use it and why it changes the roadmap."
            );
            entry
        })
        .collect();
    Selection::new("builders", selected).with_pool_size(40)
}

/// A selection that satisfies default bounds: 8 full, 4 quick, 2 trending.
pub fn clean_selection() -> Selection {
    selection_from(&pool(14), &tier_plan(8, 4, 2))
}

/// Service response selecting `items` with the given tiers.
pub fn selection_response(items: &[Item], tiers: &[Tier]) -> String {
    let selected: Vec<serde_json::Value> = items
        .iter()
        .zip(tiers)
        .enumerate()
        .map(|(i, (item, tier))| {
            serde_json::json!({
                "item_id": item.id.as_str(),
                "tier": tier.as_str(),
                "selection_reason": format!("Concrete launch number {i}"),
                "audience_value": "Builders can ship this feature with the new SDK today",
                "urgency_score": 8,
                "category_tag": CATEGORIES[i % 3],
            })
        })
        .collect();
    serde_json::json!({ "segment": "builders", "selected_items": selected }).to_string()
}
