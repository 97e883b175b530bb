//! In-memory fakes for the pipeline's outbound seams (testing only)
//!
//! Provides `ScriptedCompletionService`, `RecordingEscalationSink`, and
//! `RecordingDelivery` that satisfy the trait contracts without network or
//! filesystem access.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::delivery::{ApprovedArtifact, DeliveryChannel, DeliveryReceipt};
use crate::domain::{RenderedArtifact, Result};
use crate::escalation::{EscalationError, EscalationRecord, EscalationSink, TicketRef};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedCompletionService
// ---------------------------------------------------------------------------

type Responder = Box<dyn Fn(&CompletionRequest) -> std::result::Result<String, CompletionError> + Send + Sync>;

/// Replays queued responses in order and records every request.
///
/// When the queue is empty the optional responder answers; without one the
/// call fails with [`CompletionError::EmptyResponse`].
#[derive(Default)]
pub struct ScriptedCompletionService {
    queue: Mutex<VecDeque<std::result::Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    responder: Option<Responder>,
}

impl ScriptedCompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `f`. Use when concurrent callers make the
    /// queue order nondeterministic.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> std::result::Result<String, CompletionError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, content: impl Into<String>) -> &Self {
        lock(&self.queue).push_back(Ok(content.into()));
        self
    }

    pub fn push_err(&self, error: CompletionError) -> &Self {
        lock(&self.queue).push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, CompletionError> {
        lock(&self.requests).push(request.clone());
        if let Some(next) = lock(&self.queue).pop_front() {
            return next;
        }
        match &self.responder {
            Some(f) => f(request),
            None => Err(CompletionError::EmptyResponse),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingEscalationSink
// ---------------------------------------------------------------------------

/// Keeps every filed record; optionally fails every call.
#[derive(Debug, Default)]
pub struct RecordingEscalationSink {
    records: Mutex<Vec<EscalationRecord>>,
    fail_with: Option<String>,
}

impl RecordingEscalationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<EscalationRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl EscalationSink for RecordingEscalationSink {
    async fn file(&self, record: &EscalationRecord) -> std::result::Result<TicketRef, EscalationError> {
        lock(&self.records).push(record.clone());
        if let Some(message) = &self.fail_with {
            return Err(EscalationError::Http(message.clone()));
        }
        Ok(TicketRef {
            sink: "memory".to_string(),
            location: record.id.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingDelivery
// ---------------------------------------------------------------------------

/// Accepts every approved artifact and keeps a copy.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    delivered: Mutex<Vec<RenderedArtifact>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<RenderedArtifact> {
        lock(&self.delivered).clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDelivery {
    async fn deliver(&self, approved: &ApprovedArtifact) -> Result<DeliveryReceipt> {
        let artifact = approved.artifact().clone();
        let receipt = DeliveryReceipt {
            segment_id: artifact.segment_id.clone(),
            location: format!("memory://{}/{}", artifact.run_date, artifact.segment_id),
            digest: artifact.digest(),
            byte_size: artifact.byte_size,
            delivered_at: Utc::now(),
        };
        lock(&self.delivered).push(artifact);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.3,
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let service = ScriptedCompletionService::new();
        service.push_ok("one").push_err(CompletionError::EmptyResponse);

        assert_eq!(service.complete(&request()).await, Ok("one".to_string()));
        assert_eq!(service.complete(&request()).await, Err(CompletionError::EmptyResponse));
        assert_eq!(service.complete(&request()).await, Err(CompletionError::EmptyResponse));
        assert_eq!(service.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_falls_back_to_responder() {
        let service = ScriptedCompletionService::from_fn(|req| Ok(req.model.clone()));
        service.push_ok("queued");
        assert_eq!(service.complete(&request()).await, Ok("queued".to_string()));
        assert_eq!(service.complete(&request()).await, Ok("m".to_string()));
    }
}
