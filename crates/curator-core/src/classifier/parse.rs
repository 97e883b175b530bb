//! Decoding of selection responses.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::warn;

use crate::completion::extract_json;
use crate::domain::{Item, ItemId, SelectedItem, Selection, Tier};

/// Why a response could not be turned into a Selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("the response contained no JSON object")]
    NoJson,

    #[error("the response JSON was invalid: {0}")]
    Json(String),

    #[error("item {item_id} has an invalid tier: {reason}")]
    InvalidTier { item_id: String, reason: String },

    #[error("item {item_id} has a non-numeric urgency_score '{value}'")]
    InvalidUrgency { item_id: String, value: String },

    #[error("none of the selected item IDs match a candidate")]
    NoKnownItems,
}

#[derive(Debug, Deserialize)]
struct SelectionPayload {
    #[serde(default)]
    segment: Option<String>,
    #[serde(alias = "selected_articles")]
    selected_items: Vec<RawSelectedItem>,
}

#[derive(Debug, Deserialize)]
struct RawSelectedItem {
    #[serde(alias = "article_id")]
    item_id: String,
    tier: String,
    selection_reason: String,
    audience_value: String,
    urgency_score: RawUrgency,
    category_tag: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawUrgency {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawUrgency {
    fn resolve(&self) -> Option<i32> {
        match self {
            RawUrgency::Int(n) => Some((*n).clamp(i32::MIN as i64, i32::MAX as i64) as i32),
            RawUrgency::Float(f) if f.is_finite() => Some(f.round() as i32),
            RawUrgency::Float(_) => None,
            RawUrgency::Text(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i32),
        }
    }

    fn describe(&self) -> String {
        match self {
            RawUrgency::Int(n) => n.to_string(),
            RawUrgency::Float(f) => f.to_string(),
            RawUrgency::Text(s) => s.clone(),
        }
    }
}

/// Decode a service response into a Selection over `candidates`.
///
/// Unknown and repeated item IDs are dropped with a warning. Bounds are not
/// checked here.
pub fn parse_selection(
    content: &str,
    segment_id: &str,
    candidates: &[Item],
) -> Result<Selection, ParseError> {
    let json = extract_json(content).ok_or(ParseError::NoJson)?;
    let payload: SelectionPayload =
        serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))?;

    if let Some(echoed) = payload.segment.as_deref() {
        if echoed != segment_id {
            warn!(segment_id, echoed, "classifier: response names a different segment");
        }
    }

    let by_id: HashMap<&str, &Item> = candidates.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut seen: HashSet<ItemId> = HashSet::new();
    let mut selected = Vec::with_capacity(payload.selected_items.len());

    for raw in payload.selected_items {
        let item_id = raw.item_id.trim();
        let Some(item) = by_id.get(item_id) else {
            warn!(segment_id, item_id, "classifier: dropping unknown item id");
            continue;
        };
        if !seen.insert(item.id.clone()) {
            warn!(segment_id, item_id, "classifier: dropping repeated item id");
            continue;
        }

        let tier: Tier = raw.tier.parse().map_err(|reason| ParseError::InvalidTier {
            item_id: item_id.to_string(),
            reason,
        })?;
        let urgency = raw
            .urgency_score
            .resolve()
            .ok_or_else(|| ParseError::InvalidUrgency {
                item_id: item_id.to_string(),
                value: raw.urgency_score.describe(),
            })?;

        let mut entry = SelectedItem::new((*item).clone(), tier, raw.category_tag.trim(), urgency);
        entry.selection_reason = raw.selection_reason.trim().to_string();
        entry.audience_value = raw.audience_value.trim().to_string();
        selected.push(entry);
    }

    if selected.is_empty() {
        return Err(ParseError::NoKnownItems);
    }
    Ok(Selection::new(segment_id, selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidates() -> Vec<Item> {
        (0..3)
            .map(|i| {
                Item::new(
                    format!("https://example.com/{i}"),
                    format!("Story {i}"),
                    "Blog",
                    "ai",
                    Utc::now(),
                )
            })
            .collect()
    }

    fn entry(id: &ItemId, tier: &str, urgency: &str) -> String {
        format!(
            r#"{{"item_id": "{id}", "tier": "{tier}", "selection_reason": "r",
               "audience_value": "v", "urgency_score": {urgency}, "category_tag": "🔐 Security"}}"#
        )
    }

    #[test]
    fn test_parses_fenced_response_with_legacy_keys() {
        let items = candidates();
        let content = format!(
            "```json\n{{\"segment\": \"builders\", \"selected_articles\": [{}]}}\n```",
            entry(&items[0].id, "full", "9").replace("item_id", "article_id")
        );
        let selection = parse_selection(&content, "builders", &items).expect("parse");
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.items[0].tier, Tier::Full);
        assert_eq!(selection.items[0].urgency_score, 9);
        assert_eq!(selection.items[0].category_tag, "🔐 Security");
    }

    #[test]
    fn test_unknown_and_repeated_ids_are_dropped() {
        let items = candidates();
        let unknown = ItemId::new("not-a-candidate");
        let content = format!(
            r#"{{"selected_items": [{}, {}, {}]}}"#,
            entry(&items[0].id, "full", "8"),
            entry(&unknown, "full", "8"),
            entry(&items[0].id, "quick", "6"),
        );
        let selection = parse_selection(&content, "builders", &items).expect("parse");
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.items[0].tier, Tier::Full);
    }

    #[test]
    fn test_string_urgency_is_accepted() {
        let items = candidates();
        let content = format!(r#"{{"selected_items": [{}]}}"#, entry(&items[1].id, "trending", "\"7\""));
        let selection = parse_selection(&content, "builders", &items).expect("parse");
        assert_eq!(selection.items[0].urgency_score, 7);
    }

    #[test]
    fn test_bad_tier_is_rejected() {
        let items = candidates();
        let content = format!(r#"{{"selected_items": [{}]}}"#, entry(&items[0].id, "headline", "8"));
        let err = parse_selection(&content, "builders", &items).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTier { .. }));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let items = candidates();
        let content = format!(r#"{{"selected_items": [{{"item_id": "{}", "tier": "full"}}]}}"#, items[0].id);
        let err = parse_selection(&content, "builders", &items).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_no_json_is_rejected() {
        let err = parse_selection("I could not decide.", "builders", &candidates()).unwrap_err();
        assert_eq!(err, ParseError::NoJson);
    }

    #[test]
    fn test_all_unknown_ids_is_rejected() {
        let content = format!(r#"{{"selected_items": [{}]}}"#, entry(&ItemId::new("x"), "full", "8"));
        let err = parse_selection(&content, "builders", &candidates()).unwrap_err();
        assert_eq!(err, ParseError::NoKnownItems);
    }
}
