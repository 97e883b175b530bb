//! Curator Core Library
//!
//! Segmented daily digest pipeline: tier classification, newsworthiness
//! scoring, composition, quality gating and bounded self-healing with
//! escalation.

pub mod classifier;
pub mod completion;
pub mod composer;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod enrichment;
pub mod escalation;
pub mod fakes;
pub mod obs;
pub mod pipeline;
pub mod quality_gate;
pub mod rate_gate;
pub mod retry;
pub mod scorer;
pub mod self_healing;
pub mod store;
pub mod telemetry;

pub use domain::{
    ContentDigest, CuratorError, Item, ItemId, ItemPool, RenderedArtifact, Result,
    SegmentCatalog, SegmentProfile, SelectedItem, Selection, SelectionBounds, SelectionViolation,
    SourceAuthority, Tier, TierTargets, TrendingSignal,
};

pub use classifier::{
    prefilter_candidates, AttemptFailure, SelectionError, TierClassifier, MAX_SELECTION_ATTEMPTS,
};
pub use completion::{CompletionError, CompletionRequest, CompletionService, HttpCompletionClient};
pub use composer::{calculate_read_time, ComposeError, Composer};
pub use config::{ConfigError, CuratorConfig};
pub use delivery::{ApprovedArtifact, DeliveryChannel, DeliveryReceipt, OutboxDelivery};
pub use enrichment::{Enricher, EnrichmentReport};
pub use escalation::{
    read_escalation_artifact, write_escalation_artifact, EscalationReason, EscalationRecord,
    EscalationSink, FallbackSink,
};
pub use pipeline::{Pipeline, RunSummary, SegmentOutcome};
pub use quality_gate::{CheckStatus, GateCheck, QualityGate, ValidationReport};
pub use scorer::{score, score_with, NewsTier, Newsworthiness};
pub use self_healing::{
    classify_failures, FailureClass, HealOutcome, HealResult, HealSession, SelfHealingEngine,
    MAX_HEAL_ATTEMPTS,
};
pub use store::{JsonSelectionStore, MemorySelectionStore, SelectionStore};

pub use obs::{
    emit_gate_evaluated, emit_heal_cycle, emit_segment_delivered, emit_segment_escalated,
    emit_segment_started, SegmentSpan,
};
pub use telemetry::init_tracing;

/// Curator version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
