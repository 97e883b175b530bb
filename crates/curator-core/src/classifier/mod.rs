//! Tier Classifier: raw item pool + segment profile -> Selection.
//!
//! One structured request per attempt goes to the completion service. The
//! response is decoded and checked against the segment's selection bounds;
//! a rejected answer is sent back with a corrective message naming exactly
//! what was wrong. Attempts are bounded by [`MAX_SELECTION_ATTEMPTS`].

pub mod parse;
pub mod prompt;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::completion::{
    complete_with_retry, ChatMessage, CompletionError, CompletionRequest, CompletionService,
};
use crate::config::CuratorConfig;
use crate::domain::{Item, SegmentProfile, Selection, SelectionViolation};
use crate::obs;
use crate::rate_gate::RateGate;
use crate::retry::RetryPolicy;

pub use parse::{parse_selection, ParseError};
pub use prompt::{corrective_prompt, selection_prompt};

/// Default ceiling on classification attempts per segment.
pub const MAX_SELECTION_ATTEMPTS: u32 = 3;

/// Why a single classification attempt was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("completion service failed on primary and fallback models: {0}")]
    Service(#[from] CompletionError),

    #[error("unparseable selection: {0}")]
    Parse(#[from] ParseError),

    #[error("selection out of bounds: {}", join_violations(.0))]
    Invariant(Vec<SelectionViolation>),
}

fn join_violations(violations: &[SelectionViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AttemptFailure {
    /// Problems to report back to the service, one per line.
    fn problems(&self) -> Vec<String> {
        match self {
            AttemptFailure::Invariant(violations) => {
                violations.iter().map(ToString::to_string).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

/// Segment-local classification failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("segment {segment_id}: no selection after {attempts} attempts (last: {last_failure})")]
    Exhausted {
        segment_id: String,
        attempts: u32,
        last_failure: AttemptFailure,
    },

    #[error("segment {segment_id}: item pool is empty")]
    NoCandidates { segment_id: String },
}

/// Model routing and request parameters for selection calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRoute {
    pub primary: String,
    pub fallback: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct TierClassifier {
    service: Arc<dyn CompletionService>,
    route: ModelRoute,
    call_policy: RetryPolicy,
    rate_gate: Option<Arc<RateGate>>,
    max_attempts: u32,
    max_candidates: usize,
}

impl TierClassifier {
    pub fn new(service: Arc<dyn CompletionService>, config: &CuratorConfig) -> Self {
        let c = &config.completion;
        Self {
            service,
            route: ModelRoute {
                primary: c.primary_model.clone(),
                fallback: c.fallback_model.clone(),
                temperature: c.temperature,
                max_tokens: c.max_tokens,
            },
            call_policy: RetryPolicy::exponential(
                c.call_attempts,
                Duration::from_millis(c.initial_backoff_ms),
            ),
            rate_gate: None,
            max_attempts: config.pipeline.max_selection_attempts.max(1),
            max_candidates: config.pipeline.max_candidates.max(1),
        }
    }

    /// Share a spacing gate with the other segments of the run.
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.rate_gate = Some(gate);
        self
    }

    pub fn with_call_policy(mut self, policy: RetryPolicy) -> Self {
        self.call_policy = policy;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Produce a Selection for `profile` that satisfies its bounds.
    pub async fn classify(
        &self,
        pool: &[Item],
        profile: &SegmentProfile,
    ) -> Result<Selection, SelectionError> {
        if pool.is_empty() {
            return Err(SelectionError::NoCandidates {
                segment_id: profile.id.clone(),
            });
        }

        let candidates = prefilter_candidates(pool, self.max_candidates);
        if candidates.len() < pool.len() {
            info!(
                segment_id = %profile.id,
                pool = pool.len(),
                candidates = candidates.len(),
                "classifier: pool pre-filtered"
            );
        }

        let mut messages = vec![ChatMessage::user(selection_prompt(profile, &candidates))];
        let mut last_failure = None;

        for attempt in 1..=self.max_attempts {
            let response = match self.request(&profile.id, attempt, &messages).await {
                Ok(text) => text,
                Err(e) => {
                    let failure = AttemptFailure::Service(e);
                    obs::emit_selection_rejected(&profile.id, attempt, &failure);
                    last_failure = Some(failure);
                    continue;
                }
            };

            let failure = match parse_selection(&response, &profile.id, &candidates) {
                Ok(selection) => {
                    let violations = selection.check_invariants(&profile.bounds);
                    if violations.is_empty() {
                        obs::emit_selection_accepted(&profile.id, attempt, selection.len());
                        return Ok(selection.with_pool_size(pool.len()));
                    }
                    AttemptFailure::Invariant(violations)
                }
                Err(e) => AttemptFailure::Parse(e),
            };

            obs::emit_selection_rejected(&profile.id, attempt, &failure);
            messages.push(ChatMessage::assistant(response));
            messages.push(ChatMessage::user(corrective_prompt(&failure.problems())));
            last_failure = Some(failure);
        }

        Err(SelectionError::Exhausted {
            segment_id: profile.id.clone(),
            attempts: self.max_attempts,
            last_failure: last_failure
                .unwrap_or(AttemptFailure::Service(CompletionError::EmptyResponse)),
        })
    }

    /// One attempt: primary model, then the fallback model if the primary
    /// call fails after its own retries.
    async fn request(
        &self,
        segment_id: &str,
        attempt: u32,
        messages: &[ChatMessage],
    ) -> Result<String, CompletionError> {
        let mut last_err = None;
        for model in [&self.route.primary, &self.route.fallback] {
            if let Some(gate) = &self.rate_gate {
                gate.acquire().await;
            }
            obs::emit_selection_attempt(segment_id, attempt, model);
            let request = CompletionRequest {
                model: model.clone(),
                messages: messages.to_vec(),
                temperature: self.route.temperature,
                max_tokens: self.route.max_tokens,
            };
            match complete_with_retry(self.service.as_ref(), &request, &self.call_policy).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(segment_id, model = %model, error = %e, "classifier: model call failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(CompletionError::EmptyResponse))
    }
}

/// Trim an oversized pool to `max` candidates.
///
/// Each category gets an even share, newest first; leftover slots are filled
/// in pool order.
pub fn prefilter_candidates(pool: &[Item], max: usize) -> Vec<Item> {
    if pool.len() <= max {
        return pool.to_vec();
    }

    let mut order: Vec<&str> = Vec::new();
    let mut by_category: HashMap<&str, Vec<&Item>> = HashMap::new();
    for item in pool {
        let bucket = by_category.entry(item.category.as_str()).or_insert_with(|| {
            order.push(item.category.as_str());
            Vec::new()
        });
        bucket.push(item);
    }

    let per_category = max / order.len();
    let mut picked: Vec<&Item> = Vec::with_capacity(max);
    for category in &order {
        let mut bucket = by_category.remove(category).unwrap_or_default();
        bucket.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        picked.extend(bucket.into_iter().take(per_category));
    }

    if picked.len() < max {
        let taken: std::collections::HashSet<_> = picked.iter().map(|i| i.id.clone()).collect();
        for item in pool {
            if picked.len() >= max {
                break;
            }
            if !taken.contains(&item.id) {
                picked.push(item);
            }
        }
    }

    picked.truncate(max);
    picked.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn pool(categories: &[(&str, usize)]) -> Vec<Item> {
        let base = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).single().expect("ts");
        let mut items = Vec::new();
        for (category, n) in categories {
            for i in 0..*n {
                items.push(Item::new(
                    format!("https://example.com/{category}/{i}"),
                    format!("{category} {i}"),
                    "Blog",
                    *category,
                    base + ChronoDuration::minutes(i as i64),
                ));
            }
        }
        items
    }

    #[test]
    fn test_prefilter_is_noop_under_limit() {
        let items = pool(&[("ai", 5)]);
        assert_eq!(prefilter_candidates(&items, 50), items);
    }

    #[test]
    fn test_prefilter_samples_each_category_newest_first() {
        let items = pool(&[("ai", 40), ("security", 40)]);
        let picked = prefilter_candidates(&items, 10);
        assert_eq!(picked.len(), 10);
        assert_eq!(picked.iter().filter(|i| i.category == "ai").count(), 5);
        assert_eq!(picked.iter().filter(|i| i.category == "security").count(), 5);
        assert_eq!(picked[0].title, "ai 39");
    }

    #[test]
    fn test_prefilter_fills_from_pool_order() {
        let items = pool(&[("ai", 2), ("security", 1), ("funding", 20)]);
        let picked = prefilter_candidates(&items, 12);
        assert_eq!(picked.len(), 12);
        assert_eq!(picked.iter().filter(|i| i.category == "ai").count(), 2);
        assert_eq!(picked.iter().filter(|i| i.category == "security").count(), 1);
    }

    #[test]
    fn test_invariant_failure_lists_each_violation() {
        let failure = AttemptFailure::Invariant(vec![
            SelectionViolation::TierShortfall {
                tier: crate::domain::Tier::Full,
                actual: 4,
                required: 6,
            },
        ]);
        assert_eq!(failure.problems(), vec!["4 of 6 required `full`-tier items present"]);
        assert!(failure.to_string().contains("4 of 6"));
    }
}
