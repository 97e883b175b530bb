//! Per-item enrichment: summaries and read times.
//!
//! Runs on a bounded worker pool. Each task owns one item slot and returns
//! its result by index; the collector writes the slot back. Quick-tier items
//! get a description snippet with no service call. A failed service call
//! falls back to the item's own description.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::completion::{
    complete_with_retry, extract_json, ChatMessage, CompletionRequest, CompletionService,
};
use crate::composer::calculate_read_time;
use crate::config::CuratorConfig;
use crate::domain::{Item, SegmentProfile, SelectedItem, Selection, Tier};
use crate::retry::RetryPolicy;

/// Body characters sent for summarization.
const CONTENT_CHARS: usize = 3000;
const FALLBACK_CHARS: usize = 200;
const SNIPPET_SOFT_LIMIT: usize = 200;
const SNIPPET_HARD_LIMIT: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    Service,
    Snippet,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotResult {
    summary: String,
    read_time_minutes: u32,
    source: EnrichmentSource,
}

/// Counts per enrichment source for one Selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub service: usize,
    pub snippet: usize,
    pub fallback: usize,
    /// Items that already had a summary.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    summary: String,
    #[serde(default)]
    read_time_minutes: Option<f64>,
}

#[derive(Clone)]
pub struct Enricher {
    service: Arc<dyn CompletionService>,
    model: String,
    call_policy: RetryPolicy,
    workers: usize,
}

impl Enricher {
    pub fn new(service: Arc<dyn CompletionService>, config: &CuratorConfig) -> Self {
        Self {
            service,
            model: config.completion.summary_model.clone(),
            call_policy: RetryPolicy::exponential(
                config.completion.call_attempts,
                Duration::from_millis(config.completion.initial_backoff_ms),
            ),
            workers: config.pipeline.enrichment_workers.max(1),
        }
    }

    pub fn with_call_policy(mut self, policy: RetryPolicy) -> Self {
        self.call_policy = policy;
        self
    }

    /// Fill `summary` and `read_time_minutes` for every item that has no
    /// summary yet.
    pub async fn enrich(&self, selection: &mut Selection, profile: &SegmentProfile) -> EnrichmentReport {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();
        let mut report = EnrichmentReport::default();

        for (idx, entry) in selection.items.iter().enumerate() {
            if !entry.summary.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            let entry = entry.clone();
            let this = self.clone();
            let audience = profile.description.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (idx, this.enrich_one(&entry, &audience).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (idx, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(segment_id = %selection.segment_id, error = %e, "enrich: worker task failed");
                    continue;
                }
            };
            match result.source {
                EnrichmentSource::Service => report.service += 1,
                EnrichmentSource::Snippet => report.snippet += 1,
                EnrichmentSource::Fallback => report.fallback += 1,
            }
            if let Some(slot) = selection.items.get_mut(idx) {
                slot.summary = result.summary;
                if slot.valid_read_time().is_none() {
                    slot.read_time_minutes = Some(result.read_time_minutes);
                }
            }
        }

        debug!(
            segment_id = %selection.segment_id,
            service = report.service,
            snippet = report.snippet,
            fallback = report.fallback,
            skipped = report.skipped,
            "enrich: selection enriched"
        );
        report
    }

    async fn enrich_one(&self, entry: &SelectedItem, audience: &str) -> SlotResult {
        let item = &entry.item;
        if entry.tier == Tier::Quick {
            let text = if item.description.trim().is_empty() {
                &item.raw_content
            } else {
                &item.description
            };
            return SlotResult {
                summary: snippet(text),
                read_time_minutes: calculate_read_time(text.split_whitespace().count()),
                source: EnrichmentSource::Snippet,
            };
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(summary_prompt(entry, audience))],
            temperature: 0.5,
            max_tokens: 300,
        };
        let estimated = calculate_read_time(item.word_count());
        let response = complete_with_retry(self.service.as_ref(), &request, &self.call_policy).await;
        let parsed = response
            .map_err(|e| e.to_string())
            .and_then(|text| parse_summary(&text).ok_or_else(|| "unparseable summary".to_string()));

        match parsed {
            Ok(payload) => SlotResult {
                summary: payload.summary.trim().to_string(),
                read_time_minutes: payload
                    .read_time_minutes
                    .filter(|m| m.is_finite() && *m >= 1.0)
                    .map(|m| (m.round() as u32).min(15))
                    .unwrap_or(estimated),
                source: EnrichmentSource::Service,
            },
            Err(reason) => {
                warn!(item = %item.id.short(), reason = %reason, "enrich: falling back to description");
                SlotResult {
                    summary: fallback_text(item),
                    read_time_minutes: estimated,
                    source: EnrichmentSource::Fallback,
                }
            }
        }
    }
}

fn parse_summary(text: &str) -> Option<SummaryPayload> {
    let payload: SummaryPayload = serde_json::from_str(extract_json(text)?).ok()?;
    (!payload.summary.trim().is_empty()).then_some(payload)
}

fn summary_prompt(entry: &SelectedItem, audience: &str) -> String {
    let item = &entry.item;
    let content: String = item.body_text().chars().take(CONTENT_CHARS).collect();
    format!(
        "You write for busy professionals: {audience}\n\n\
         Summarize the item below in ONE paragraph of 30-40 words: what happened and why it \
         matters to this audience. No background, no filler.\n\n\
         Title: {title}\n\
         Source: {source} ({authority})\n\
         Tier: {tier}\n\
         Word count: ~{words}\n\n\
         CONTENT:\n{content}\n---\n\n\
         Return ONLY JSON: {{\"summary\": \"...\", \"read_time_minutes\": {estimate}}}",
        title = item.title,
        source = item.source,
        authority = item.authority.as_str(),
        tier = entry.tier,
        words = item.word_count(),
        estimate = calculate_read_time(item.word_count()),
    )
}

/// First one or two sentences, about 200 characters, never more than 250.
pub fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "See article for details".to_string();
    }
    let mut out = String::new();
    for (i, sentence) in text.split(". ").take(3).enumerate() {
        out.push_str(sentence);
        out.push_str(". ");
        if out.chars().count() > SNIPPET_SOFT_LIMIT || i >= 1 {
            break;
        }
    }
    let mut out = out.trim().to_string();
    if out.ends_with("..") {
        out.pop();
    }
    if out.chars().count() > SNIPPET_HARD_LIMIT {
        let cut: String = out.chars().take(SNIPPET_HARD_LIMIT - 3).collect();
        out = format!("{cut}...");
    }
    out
}

fn fallback_text(item: &Item) -> String {
    let source = if item.description.trim().is_empty() {
        &item.raw_content
    } else {
        &item.description
    };
    source.trim().chars().take(FALLBACK_CHARS).collect()
}
