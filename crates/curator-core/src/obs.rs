//! Structured observability hooks for segment lifecycle events.
//!
//! This module provides:
//! - Segment-scoped tracing spans via `SegmentSpan` RAII guard
//! - Emission functions for key lifecycle events: start, selection attempts,
//!   gate evaluation, heal cycles, delivery and escalation
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `--json` to the CLI.

use std::fmt::Display;

use tracing::{info, warn};

/// RAII guard that enters a segment-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SegmentSpan::enter("builders", "2026-10-18");
/// // every event below carries segment_id = "builders"
/// ```
pub struct SegmentSpan {
    _span: tracing::span::EnteredSpan,
}

impl SegmentSpan {
    pub fn enter(segment_id: &str, run_date: &str) -> Self {
        Self {
            _span: segment_span(segment_id, run_date).entered(),
        }
    }
}

/// The segment span itself, for `Instrument` on futures that cross `.await`.
pub fn segment_span(segment_id: &str, run_date: &str) -> tracing::Span {
    tracing::info_span!("curator.segment", segment_id = %segment_id, run_date = %run_date)
}

/// Emit event: segment processing started against a pool.
pub fn emit_segment_started(segment_id: &str, pool_size: usize) {
    info!(event = "segment.started", segment_id = %segment_id, pool_size = pool_size);
}

/// Emit event: one completion call for a selection attempt.
pub fn emit_selection_attempt(segment_id: &str, attempt: u32, model: &str) {
    info!(
        event = "selection.attempt",
        segment_id = %segment_id,
        attempt = attempt,
        model = %model,
    );
}

/// Emit event: a selection attempt was rejected (warning level).
pub fn emit_selection_rejected(segment_id: &str, attempt: u32, reason: &dyn Display) {
    warn!(
        event = "selection.rejected",
        segment_id = %segment_id,
        attempt = attempt,
        reason = %reason,
    );
}

pub fn emit_selection_accepted(segment_id: &str, attempt: u32, items: usize) {
    info!(
        event = "selection.accepted",
        segment_id = %segment_id,
        attempt = attempt,
        items = items,
    );
}

/// Emit event: the quality gate produced a report.
pub fn emit_gate_evaluated(segment_id: &str, failures: usize, warnings: usize, passed: bool) {
    info!(
        event = "gate.evaluated",
        segment_id = %segment_id,
        failures = failures,
        warnings = warnings,
        passed = passed,
    );
}

/// Emit event: one heal cycle finished.
pub fn emit_heal_cycle(segment_id: &str, attempt: u32, max_attempts: u32, healers: usize, changed: bool) {
    info!(
        event = "heal.cycle",
        segment_id = %segment_id,
        attempt = attempt,
        max_attempts = max_attempts,
        healers = healers,
        changed = changed,
    );
}

pub fn emit_segment_delivered(segment_id: &str, byte_size: usize, location: &str) {
    info!(
        event = "segment.delivered",
        segment_id = %segment_id,
        byte_size = byte_size,
        location = %location,
    );
}

/// Emit event: segment handed to a human (warning level).
pub fn emit_segment_escalated(segment_id: &str, reason: &dyn Display) {
    warn!(event = "segment.escalated", segment_id = %segment_id, reason = %reason);
}

/// Emit event: a patched selection could not be persisted (warning level).
pub fn emit_persist_error(segment_id: &str, error: &dyn Display) {
    warn!(event = "selection.persist_error", segment_id = %segment_id, error = %error);
}
