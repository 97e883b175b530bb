//! Segment orchestration.
//!
//! Each segment runs classify -> enrich -> score -> compose/validate/heal,
//! then either delivers the approved artifact or files an escalation. Stages
//! within a segment are sequential; segments run as concurrent tokio tasks
//! and share one [`RateGate`] for their classification calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, warn, Instrument};

use crate::classifier::TierClassifier;
use crate::completion::CompletionService;
use crate::composer::Composer;
use crate::config::CuratorConfig;
use crate::delivery::{DeliveryChannel, DeliveryReceipt};
use crate::domain::{Item, ItemPool, SegmentCatalog, SegmentProfile};
use crate::enrichment::Enricher;
use crate::escalation::{
    write_escalation_artifact, EscalationReason, EscalationRecord, EscalationSink, TicketRef,
};
use crate::obs;
use crate::quality_gate::QualityGate;
use crate::rate_gate::RateGate;
use crate::scorer::{self, Newsworthiness};
use crate::self_healing::{HealResult, HealSession, SelfHealingEngine};
use crate::store::JsonSelectionStore;

/// Terminal state of one segment. There is no third outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentOutcome {
    Delivered {
        receipt: DeliveryReceipt,
        score: Newsworthiness,
        session: HealSession,
    },
    Escalated {
        record: EscalationRecord,
        /// `None` when every sink failed; the on-disk record still exists.
        ticket: Option<TicketRef>,
    },
}

impl SegmentOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SegmentOutcome::Delivered { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub segment_id: String,
    pub outcome: SegmentOutcome,
}

/// Outcomes for every segment of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub segments: Vec<SegmentReport>,
    /// Segments whose task panicked or was cancelled. Each one is also
    /// reported in `segments` as escalated.
    pub aborted: Vec<String>,
}

impl RunSummary {
    pub fn delivered(&self) -> usize {
        self.segments.iter().filter(|s| s.outcome.is_delivered()).count()
    }

    pub fn escalated(&self) -> usize {
        self.segments.len() - self.delivered()
    }

    pub fn all_delivered(&self) -> bool {
        self.escalated() == 0
    }

    pub fn get(&self, segment_id: &str) -> Option<&SegmentOutcome> {
        self.segments
            .iter()
            .find(|s| s.segment_id == segment_id)
            .map(|s| &s.outcome)
    }
}

#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<TierClassifier>,
    enricher: Enricher,
    engine: Arc<SelfHealingEngine>,
    escalations: Arc<dyn EscalationSink>,
    delivery: Arc<dyn DeliveryChannel>,
    runs_dir: PathBuf,
    run_date: NaiveDate,
}

impl Pipeline {
    /// Wire every stage from one config value.
    ///
    /// Patched selections and escalation artifacts go under
    /// `config.paths.runs_dir`.
    pub fn new(
        config: &CuratorConfig,
        service: Arc<dyn CompletionService>,
        escalations: Arc<dyn EscalationSink>,
        delivery: Arc<dyn DeliveryChannel>,
        run_date: NaiveDate,
    ) -> Self {
        let rate_gate = Arc::new(RateGate::new(Duration::from_millis(
            config.pipeline.segment_call_spacing_ms,
        )));
        let classifier = TierClassifier::new(Arc::clone(&service), config).with_rate_gate(rate_gate);
        let enricher = Enricher::new(service, config);
        let engine = SelfHealingEngine::new(
            Composer::new(config.brand.clone()),
            QualityGate::new(&config.brand),
            config.pipeline.max_heal_attempts,
        )
        .with_store(Arc::new(JsonSelectionStore::new(&config.paths.runs_dir)));

        Self {
            classifier: Arc::new(classifier),
            enricher,
            engine: Arc::new(engine),
            escalations,
            delivery,
            runs_dir: config.paths.runs_dir.clone(),
            run_date,
        }
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Drive one segment to a terminal outcome.
    pub async fn run_segment(&self, pool: &[Item], profile: &SegmentProfile) -> SegmentOutcome {
        obs::emit_segment_started(&profile.id, pool.len());

        let mut selection = match self.classifier.classify(pool, profile).await {
            Ok(selection) => selection,
            Err(e) => {
                let reason = EscalationReason::SelectionFailed {
                    detail: e.to_string(),
                };
                return self
                    .escalate(EscalationRecord::new(&profile.id, self.run_date, reason))
                    .await;
            }
        };

        let enrichment = self.enricher.enrich(&mut selection, profile).await;
        debug!(segment_id = %profile.id, ?enrichment, "pipeline: enrichment finished");

        let score = scorer::score_with(&selection, &profile.targets);
        info!(
            segment_id = %profile.id,
            score = score.value,
            tier = score.tier.as_str(),
            "pipeline: selection scored"
        );

        match self.engine.run(selection, profile, self.run_date).await {
            HealResult::Approved {
                artifact, session, ..
            } => match self.delivery.deliver(&artifact).await {
                Ok(receipt) => {
                    obs::emit_segment_delivered(&receipt.segment_id, receipt.byte_size, &receipt.location);
                    SegmentOutcome::Delivered {
                        receipt,
                        score,
                        session,
                    }
                }
                Err(e) => {
                    let reason = EscalationReason::DeliveryFailed {
                        detail: e.to_string(),
                    };
                    let record = EscalationRecord::new(&profile.id, self.run_date, reason)
                        .with_session(session);
                    self.escalate(record).await
                }
            },
            HealResult::Escalate {
                reason, session, ..
            } => {
                let record =
                    EscalationRecord::new(&profile.id, self.run_date, reason).with_session(session);
                self.escalate(record).await
            }
        }
    }

    /// Persist the record, then file it. Neither step failing stops the other.
    async fn escalate(&self, record: EscalationRecord) -> SegmentOutcome {
        obs::emit_segment_escalated(&record.segment_id, &record.reason);

        match write_escalation_artifact(&record, &self.runs_dir) {
            Ok(path) => debug!(segment_id = %record.segment_id, path = %path.display(), "pipeline: escalation persisted"),
            Err(e) => warn!(segment_id = %record.segment_id, error = %e, "pipeline: failed to persist escalation"),
        }

        let ticket = match self.escalations.file(&record).await {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                warn!(segment_id = %record.segment_id, error = %e, "pipeline: escalation sink failed");
                None
            }
        };
        SegmentOutcome::Escalated { record, ticket }
    }

    /// Run every segment in `catalog` concurrently against the same pool.
    pub async fn run(&self, pool: &ItemPool, catalog: &SegmentCatalog) -> RunSummary {
        let items: Arc<Vec<Item>> = Arc::new(pool.items.clone());
        let run_date = self.run_date.to_string();

        let mut tasks = Vec::with_capacity(catalog.len());
        for profile in catalog.profiles() {
            let segment_id = profile.id.clone();
            let span = obs::segment_span(&segment_id, &run_date);
            let this = self.clone();
            let items = Arc::clone(&items);
            let profile = profile.clone();
            let task = tokio::spawn(
                async move { this.run_segment(&items, &profile).await }.instrument(span),
            );
            tasks.push((segment_id, task));
        }

        let joined = futures::future::join_all(
            tasks
                .into_iter()
                .map(|(segment_id, task)| async move { (segment_id, task.await) }),
        )
        .await;

        let mut summary = RunSummary {
            run_date: self.run_date,
            segments: Vec::with_capacity(joined.len()),
            aborted: Vec::new(),
        };
        for (segment_id, result) in joined {
            match result {
                Ok(outcome) => summary.segments.push(SegmentReport {
                    segment_id,
                    outcome,
                }),
                Err(e) => {
                    error!(segment_id = %segment_id, error = %e, "pipeline: segment task aborted");
                    let reason = EscalationReason::SegmentAborted {
                        detail: e.to_string(),
                    };
                    let record = EscalationRecord::new(&segment_id, self.run_date, reason);
                    let outcome = self.escalate(record).await;
                    summary.aborted.push(segment_id.clone());
                    summary.segments.push(SegmentReport {
                        segment_id,
                        outcome,
                    });
                }
            }
        }

        info!(
            run_date = %self.run_date,
            delivered = summary.delivered(),
            escalated = summary.escalated(),
            aborted = summary.aborted.len(),
            "pipeline: run finished"
        );
        summary
    }
}
