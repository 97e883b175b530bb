//! Self-healing orchestration for failed quality gates.
//!
//! This module provides:
//! - a static failure taxonomy keyed by the typed gate check
//! - deterministic, idempotent, field-level healers
//! - the bounded compose -> validate -> heal loop
//!
//! The loop stops as soon as the gate passes, an unhealable class appears,
//! a cycle changes nothing, or the attempt budget is spent.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::composer::{tracked_link, tracked_target, Composer};
use crate::delivery::ApprovedArtifact;
use crate::domain::{RenderedArtifact, SegmentProfile, Selection};
use crate::escalation::EscalationReason;
use crate::obs;
use crate::quality_gate::{GateCheck, QualityGate, ValidationReport};
use crate::store::{MemorySelectionStore, SelectionStore};

/// Default ceiling on heal cycles per segment.
pub const MAX_HEAL_ATTEMPTS: u32 = 2;

/// Failure taxonomy used by the heal planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    BrokenLinks,
    ReadTimeStuck,
    EmptyContent,
    TemplateUnrendered,
    StructureMissing,
    ArtifactTooSmall,
}

impl FailureClass {
    pub fn is_healable(self) -> bool {
        matches!(
            self,
            FailureClass::BrokenLinks | FailureClass::ReadTimeStuck | FailureClass::EmptyContent
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::BrokenLinks => "broken_links",
            FailureClass::ReadTimeStuck => "read_time_stuck",
            FailureClass::EmptyContent => "empty_content",
            FailureClass::TemplateUnrendered => "template_unrendered",
            FailureClass::StructureMissing => "structure_missing",
            FailureClass::ArtifactTooSmall => "artifact_too_small",
        }
    }

    /// Static mapping from a failing gate check. Checks that only ever warn
    /// have no class.
    pub fn from_check(check: GateCheck) -> Option<Self> {
        match check {
            GateCheck::ArticleLinks => Some(FailureClass::BrokenLinks),
            GateCheck::ReadTimeVariance => Some(FailureClass::ReadTimeStuck),
            GateCheck::SummaryContent => Some(FailureClass::EmptyContent),
            GateCheck::TemplateRendering => Some(FailureClass::TemplateUnrendered),
            GateCheck::RequiredStructure => Some(FailureClass::StructureMissing),
            GateCheck::ArtifactSize => Some(FailureClass::ArtifactTooSmall),
            GateCheck::DynamicValues | GateCheck::HrefValidity => None,
        }
    }
}

/// Failure classes present in one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub classes: BTreeSet<FailureClass>,
    /// FAIL checks with no class; treated as unhealable.
    pub unmapped: Vec<GateCheck>,
}

impl Classification {
    pub fn is_healable(&self) -> bool {
        self.unmapped.is_empty() && self.classes.iter().all(|c| c.is_healable())
    }

    pub fn unhealable_classes(&self) -> Vec<FailureClass> {
        self.classes
            .iter()
            .copied()
            .filter(|c| !c.is_healable())
            .collect()
    }
}

/// Classify every distinct FAIL entry of `report`.
pub fn classify_failures(report: &ValidationReport) -> Classification {
    let mut out = Classification::default();
    for check in report.failed_checks() {
        match FailureClass::from_check(check) {
            Some(class) => {
                out.classes.insert(class);
            }
            None => out.unmapped.push(check),
        }
    }
    out
}

/// What one healer did in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealerOutcome {
    pub healer: String,
    /// Fields rewritten.
    pub fixed: usize,
    pub message: String,
}

impl HealerOutcome {
    fn new(healer: &str, fixed: usize, message: String) -> Self {
        Self {
            healer: healer.to_string(),
            fixed,
            message,
        }
    }
}

/// Rebuild tracked links whose target is missing or not absolute, from the
/// item's original URL. A rebuild only counts when it yields a new link with
/// an absolute target; items without a usable URL are left alone.
pub fn heal_broken_links(
    selection: &mut Selection,
    tracking_base: &str,
    run_date: NaiveDate,
) -> HealerOutcome {
    let segment_id = selection.segment_id.clone();
    let mut fixed = 0;
    let mut unfixable = 0;
    for entry in selection.items.iter_mut() {
        if entry.tracked_url.as_deref().and_then(tracked_target).is_some() {
            continue;
        }
        if !entry.item.has_url() {
            unfixable += 1;
            continue;
        }
        match tracked_link(
            tracking_base,
            &entry.item.url,
            &segment_id,
            run_date,
            &entry.item.title,
        ) {
            Ok(link)
                if entry.tracked_url.as_deref() != Some(link.as_str())
                    && tracked_target(&link).is_some() =>
            {
                entry.tracked_url = Some(link);
                fixed += 1;
            }
            Ok(_) => {
                debug!(item = %entry.id().short(), url = %entry.item.url, "heal: original URL is not absolute");
                unfixable += 1;
            }
            Err(e) => {
                warn!(item = %entry.id().short(), error = %e, "heal: cannot rebuild tracked link");
                unfixable += 1;
            }
        }
    }
    let message = match (fixed, unfixable) {
        (0, 0) => "No broken links found to fix".to_string(),
        (f, 0) => format!("Fixed {f} broken tracked links"),
        (f, u) => format!("Fixed {f} broken tracked links; {u} items have no usable URL"),
    };
    HealerOutcome::new("heal_broken_links", fixed, message)
}

/// Fill read times that are missing or zero. Non-zero values are kept.
pub fn heal_read_times(selection: &mut Selection) -> HealerOutcome {
    let mut fixed = 0;
    for entry in selection.items.iter_mut() {
        if entry.valid_read_time().is_some() {
            continue;
        }
        entry.read_time_minutes = Some(crate::composer::calculate_read_time(entry.item.word_count()));
        fixed += 1;
    }
    let message = if fixed > 0 {
        format!("Fixed {fixed} read times")
    } else {
        "Read times already set".to_string()
    };
    HealerOutcome::new("heal_read_times", fixed, message)
}

/// Fill empty summaries with the first two sentences of the item's
/// description (or raw content).
pub fn heal_empty_summaries(selection: &mut Selection) -> HealerOutcome {
    let mut fixed = 0;
    for entry in selection.items.iter_mut() {
        if !entry.summary.trim().is_empty() {
            continue;
        }
        let source = if entry.item.description.trim().is_empty() {
            entry.item.raw_content.as_str()
        } else {
            entry.item.description.as_str()
        };
        if let Some(summary) = fallback_summary(source) {
            entry.summary = summary;
            fixed += 1;
        }
    }
    let message = if fixed > 0 {
        format!("Filled {fixed} empty summaries with fallback content")
    } else {
        "No fallback content for empty summaries".to_string()
    };
    HealerOutcome::new("heal_empty_summaries", fixed, message)
}

/// First two sentences of `text`, ending in a period.
pub fn fallback_summary(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut summary = text.split(". ").take(2).collect::<Vec<_>>().join(". ");
    summary = summary.trim().to_string();
    if !summary.ends_with('.') {
        summary.push('.');
    }
    Some(summary)
}

/// One heal cycle in the session timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealAttempt {
    pub attempt: u32,
    pub classes_before: Vec<FailureClass>,
    pub healers_applied: Vec<HealerOutcome>,
    /// Empty until the re-composed artifact has been validated.
    pub classes_after: Vec<FailureClass>,
}

impl HealAttempt {
    pub fn changed_anything(&self) -> bool {
        self.healers_applied.iter().any(|h| h.fixed > 0)
    }
}

/// Terminal state of a heal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealOutcome {
    /// Passed on the first validation.
    Passed,
    /// Passed after one or more heal cycles.
    Healed,
    Unhealable,
    NoProgress,
    Exhausted,
    ComposeFailed,
}

impl HealOutcome {
    pub fn is_pass(self) -> bool {
        matches!(self, HealOutcome::Passed | HealOutcome::Healed)
    }
}

/// Full, auditable heal timeline for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealSession {
    pub segment_id: String,
    pub run_date: NaiveDate,
    pub max_attempts: u32,
    pub attempts: Vec<HealAttempt>,
    pub outcome: HealOutcome,
    /// Last gate report; absent only when the first compose failed.
    pub final_report: Option<ValidationReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HealSession {
    pub fn attempts_used(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Result of driving one Selection through the heal loop.
#[derive(Debug)]
pub enum HealResult {
    Approved {
        artifact: ApprovedArtifact,
        selection: Selection,
        session: HealSession,
    },
    Escalate {
        reason: EscalationReason,
        selection: Selection,
        session: HealSession,
        last_artifact: Option<RenderedArtifact>,
    },
}

impl HealResult {
    pub fn session(&self) -> &HealSession {
        match self {
            HealResult::Approved { session, .. } | HealResult::Escalate { session, .. } => session,
        }
    }

    pub fn selection(&self) -> &Selection {
        match self {
            HealResult::Approved { selection, .. } | HealResult::Escalate { selection, .. } => {
                selection
            }
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, HealResult::Approved { .. })
    }
}

/// Compose -> Validate -> {Pass: done; Fail: classify -> heal -> compose}.
pub struct SelfHealingEngine {
    composer: Composer,
    gate: QualityGate,
    store: Arc<dyn SelectionStore>,
    max_attempts: u32,
}

impl SelfHealingEngine {
    pub fn new(composer: Composer, gate: QualityGate, max_attempts: u32) -> Self {
        Self {
            composer,
            gate,
            store: Arc::new(MemorySelectionStore::new()),
            max_attempts,
        }
    }

    /// Persist patched Selections through `store` after every heal cycle.
    pub fn with_store(mut self, store: Arc<dyn SelectionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run(
        &self,
        mut selection: Selection,
        profile: &SegmentProfile,
        run_date: NaiveDate,
    ) -> HealResult {
        let mut session = HealSession {
            segment_id: selection.segment_id.clone(),
            run_date,
            max_attempts: self.max_attempts,
            attempts: Vec::new(),
            outcome: HealOutcome::Passed,
            final_report: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let mut last_artifact: Option<RenderedArtifact> = None;

        loop {
            let artifact = match self.composer.compose(&mut selection, profile, run_date) {
                Ok(artifact) => artifact,
                Err(e) => {
                    warn!(segment_id = %session.segment_id, error = %e, "heal: compose failed");
                    return finish_escalation(
                        session,
                        HealOutcome::ComposeFailed,
                        EscalationReason::ComposeFailed {
                            detail: e.to_string(),
                        },
                        selection,
                        last_artifact,
                    );
                }
            };

            let report = self.gate.validate(&artifact, &selection);
            obs::emit_gate_evaluated(
                &session.segment_id,
                report.failures().count(),
                report.warnings().count(),
                report.overall_pass(),
            );
            let classification = classify_failures(&report);
            if let Some(previous) = session.attempts.last_mut() {
                previous.classes_after = classification.classes.iter().copied().collect();
            }
            let passed = report.overall_pass();
            session.final_report = Some(report);

            if passed {
                session.outcome = if session.attempts.is_empty() {
                    HealOutcome::Passed
                } else {
                    info!(
                        segment_id = %session.segment_id,
                        attempts = session.attempts.len(),
                        "heal: segment self-healed"
                    );
                    HealOutcome::Healed
                };
                session.finished_at = Utc::now();
                return HealResult::Approved {
                    artifact: ApprovedArtifact::new(artifact),
                    selection,
                    session,
                };
            }
            last_artifact = Some(artifact);

            if !classification.is_healable() {
                let reason = EscalationReason::Unhealable {
                    classes: classification.unhealable_classes(),
                    unmapped_checks: classification.unmapped.clone(),
                };
                return finish_escalation(
                    session,
                    HealOutcome::Unhealable,
                    reason,
                    selection,
                    last_artifact,
                );
            }

            if session.attempts_used() >= self.max_attempts {
                let attempts = session.attempts_used();
                return finish_escalation(
                    session,
                    HealOutcome::Exhausted,
                    EscalationReason::Exhausted { attempts },
                    selection,
                    last_artifact,
                );
            }

            let attempt_number = session.attempts_used() + 1;
            let healers_applied =
                self.apply_healers(&mut selection, &classification.classes, run_date);
            let attempt = HealAttempt {
                attempt: attempt_number,
                classes_before: classification.classes.iter().copied().collect(),
                healers_applied,
                classes_after: Vec::new(),
            };
            let changed = attempt.changed_anything();
            obs::emit_heal_cycle(
                &session.segment_id,
                attempt_number,
                self.max_attempts,
                attempt.healers_applied.len(),
                changed,
            );
            session.attempts.push(attempt);

            if !changed {
                if let Some(last) = session.attempts.last_mut() {
                    last.classes_after = last.classes_before.clone();
                }
                return finish_escalation(
                    session,
                    HealOutcome::NoProgress,
                    EscalationReason::NoProgress {
                        attempts: attempt_number,
                    },
                    selection,
                    last_artifact,
                );
            }

            if let Err(e) = self.store.save(&selection, run_date).await {
                obs::emit_persist_error(&session.segment_id, &e);
            }
        }
    }

    fn apply_healers(
        &self,
        selection: &mut Selection,
        classes: &BTreeSet<FailureClass>,
        run_date: NaiveDate,
    ) -> Vec<HealerOutcome> {
        let mut outcomes = Vec::new();
        for class in classes {
            let outcome = match class {
                FailureClass::BrokenLinks => heal_broken_links(
                    selection,
                    &self.composer.brand().tracking_base_url,
                    run_date,
                ),
                FailureClass::ReadTimeStuck => heal_read_times(selection),
                FailureClass::EmptyContent => heal_empty_summaries(selection),
                FailureClass::TemplateUnrendered
                | FailureClass::StructureMissing
                | FailureClass::ArtifactTooSmall => continue,
            };
            info!(
                segment_id = %selection.segment_id,
                healer = %outcome.healer,
                fixed = outcome.fixed,
                "heal: {}",
                outcome.message
            );
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn finish_escalation(
    mut session: HealSession,
    outcome: HealOutcome,
    reason: EscalationReason,
    selection: Selection,
    last_artifact: Option<RenderedArtifact>,
) -> HealResult {
    session.outcome = outcome;
    session.finished_at = Utc::now();
    HealResult::Escalate {
        reason,
        selection,
        session,
        last_artifact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality_gate::{CheckEntry, CheckStatus};

    fn report(failing: &[GateCheck]) -> ValidationReport {
        ValidationReport {
            segment_id: "builders".into(),
            run_date: NaiveDate::from_ymd_opt(2026, 10, 18).expect("date"),
            entries: failing
                .iter()
                .map(|check| CheckEntry {
                    status: CheckStatus::Fail,
                    check: *check,
                    detail: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_healable_partition() {
        let healable = [
            FailureClass::BrokenLinks,
            FailureClass::ReadTimeStuck,
            FailureClass::EmptyContent,
        ];
        let unhealable = [
            FailureClass::TemplateUnrendered,
            FailureClass::StructureMissing,
            FailureClass::ArtifactTooSmall,
        ];
        assert!(healable.iter().all(|c| c.is_healable()));
        assert!(unhealable.iter().all(|c| !c.is_healable()));
    }

    #[test]
    fn test_classification_of_mixed_failures() {
        let c = classify_failures(&report(&[GateCheck::ArticleLinks, GateCheck::TemplateRendering]));
        assert!(!c.is_healable());
        assert_eq!(c.unhealable_classes(), vec![FailureClass::TemplateUnrendered]);
    }

    #[test]
    fn test_unmapped_fail_is_unhealable() {
        let c = classify_failures(&report(&[GateCheck::HrefValidity]));
        assert!(c.classes.is_empty());
        assert_eq!(c.unmapped, vec![GateCheck::HrefValidity]);
        assert!(!c.is_healable());
    }

    #[test]
    fn test_fallback_summary_takes_two_sentences() {
        assert_eq!(
            fallback_summary("One thing. Two things. Three things."),
            Some("One thing. Two things.".to_string())
        );
        assert_eq!(fallback_summary("No period here"), Some("No period here.".to_string()));
        assert_eq!(fallback_summary("   "), None);
    }

    #[test]
    fn test_failure_class_serde_names() {
        let json = serde_json::to_string(&FailureClass::ReadTimeStuck).expect("json");
        assert_eq!(json, "\"read_time_stuck\"");
    }
}
