//! Escalation records and the ticket sinks that receive them.
//!
//! Every segment that does not end in a delivered artifact produces one
//! [`EscalationRecord`]. It is persisted next to the run outputs with a
//! digest file and filed with an [`EscalationSink`].

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EscalationConfig;
use crate::domain::{ContentDigest, CuratorError, Result};
use crate::quality_gate::{GateCheck, ValidationReport};
use crate::self_healing::{FailureClass, HealSession};

/// Why a segment was handed to a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    SelectionFailed {
        detail: String,
    },
    ComposeFailed {
        detail: String,
    },
    Unhealable {
        classes: Vec<FailureClass>,
        #[serde(default)]
        unmapped_checks: Vec<GateCheck>,
    },
    Exhausted {
        attempts: u32,
    },
    NoProgress {
        attempts: u32,
    },
    DeliveryFailed {
        detail: String,
    },
    /// The segment task panicked or was cancelled.
    SegmentAborted {
        detail: String,
    },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::SelectionFailed { detail } => write!(f, "selection failed: {detail}"),
            EscalationReason::ComposeFailed { detail } => write!(f, "compose failed: {detail}"),
            EscalationReason::Unhealable {
                classes,
                unmapped_checks,
            } => {
                let mut names: Vec<String> =
                    classes.iter().map(|c| c.as_str().to_string()).collect();
                names.extend(unmapped_checks.iter().map(|c| format!("unclassified '{c}'")));
                write!(f, "unhealable failure: {}", names.join(", "))
            }
            EscalationReason::Exhausted { attempts } => {
                write!(f, "self-healing exhausted after {attempts} attempts")
            }
            EscalationReason::NoProgress { attempts } => {
                write!(f, "self-healing made no progress on attempt {attempts}")
            }
            EscalationReason::DeliveryFailed { detail } => write!(f, "delivery failed: {detail}"),
            EscalationReason::SegmentAborted { detail } => write!(f, "segment task aborted: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: Uuid,
    pub segment_id: String,
    pub run_date: NaiveDate,
    pub reason: EscalationReason,
    #[serde(default)]
    pub report: Option<ValidationReport>,
    #[serde(default)]
    pub heal_session: Option<HealSession>,
    pub created_at: DateTime<Utc>,
}

impl EscalationRecord {
    pub fn new(segment_id: impl Into<String>, run_date: NaiveDate, reason: EscalationReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            segment_id: segment_id.into(),
            run_date,
            reason,
            report: None,
            heal_session: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the heal timeline and its final gate report.
    pub fn with_session(mut self, session: HealSession) -> Self {
        self.report = session.final_report.clone();
        self.heal_session = Some(session);
        self
    }

    pub fn title(&self) -> String {
        let what = match self.reason {
            EscalationReason::SelectionFailed { .. } => "Digest selection failed",
            EscalationReason::ComposeFailed { .. } => "Digest compose failed",
            EscalationReason::DeliveryFailed { .. } => "Digest delivery failed",
            EscalationReason::SegmentAborted { .. } => "Digest segment aborted",
            _ => "Digest quality gate failed",
        };
        format!("{what}: {} ({})", self.segment_id, self.run_date)
    }
}

/// Markdown ticket body: reason, gate report table, heal history, next steps.
pub fn render_ticket_markdown(record: &EscalationRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {}\n\n", record.title()));
    out.push_str(&format!("**Segment:** {}  \n", record.segment_id));
    out.push_str(&format!("**Run date:** {}  \n", record.run_date));
    out.push_str(&format!("**Reason:** {}  \n", record.reason));
    out.push_str(&format!("**Escalation id:** {}\n\n", record.id));

    if let Some(report) = &record.report {
        out.push_str("### Quality gate report\n\n");
        out.push_str("| Status | Check | Detail |\n");
        out.push_str("|---|---|---|\n");
        for entry in &report.entries {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                entry.status.as_str(),
                entry.check,
                entry.detail.replace('|', "\\|")
            ));
        }
        out.push('\n');
    }

    if let Some(session) = &record.heal_session {
        out.push_str(&format!(
            "### Self-healing ({} of {} attempts, outcome `{}`)\n\n",
            session.attempts_used(),
            session.max_attempts,
            serde_json::to_value(session.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        ));
        if session.attempts.is_empty() {
            out.push_str("No heal attempts were made.\n\n");
        }
        for attempt in &session.attempts {
            out.push_str(&format!(
                "- Attempt {}: {} -> {}\n",
                attempt.attempt,
                class_list(&attempt.classes_before),
                class_list(&attempt.classes_after)
            ));
            for healer in &attempt.healers_applied {
                out.push_str(&format!("  - `{}`: {}\n", healer.healer, healer.message));
            }
        }
        out.push('\n');
    }

    out.push_str("### Next steps\n\n");
    let steps: &[&str] = match &record.reason {
        EscalationReason::SelectionFailed { .. } => &[
            "Check completion service availability and credentials.",
            "Inspect the item pool size for this segment.",
            "Re-run `curator classify` for the segment once resolved.",
        ],
        EscalationReason::Unhealable { .. } | EscalationReason::ComposeFailed { .. } => &[
            "Inspect the renderer and brand configuration for this segment.",
            "Fix the defect and re-run `curator run` for the segment.",
        ],
        EscalationReason::Exhausted { .. } | EscalationReason::NoProgress { .. } => &[
            "Review the failing checks above against the persisted selection.",
            "If this is a new failure pattern, add a healer for it.",
        ],
        EscalationReason::DeliveryFailed { .. } => &[
            "Check the outbox location and its permissions.",
            "Re-deliver the approved artifact once resolved.",
        ],
        EscalationReason::SegmentAborted { .. } => &[
            "Read the run log for the panic message of this segment.",
            "Re-run `curator run --segment` for it once fixed.",
        ],
    };
    for (n, step) in steps.iter().enumerate() {
        out.push_str(&format!("{}. {step}\n", n + 1));
    }
    out
}

fn class_list(classes: &[FailureClass]) -> String {
    if classes.is_empty() {
        "none".to_string()
    } else {
        classes
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("escalation sink not configured: {0}")]
    NotConfigured(String),

    #[error("ticket request failed: {0}")]
    Http(String),

    #[error("ticket service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Where a filed ticket ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    pub sink: String,
    pub location: String,
}

/// Human-visible ticketing surface.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn file(&self, record: &EscalationRecord) -> std::result::Result<TicketRef, EscalationError>;
}

/// Files a GitHub issue per escalation.
pub struct GithubIssueSink {
    endpoint: String,
    token: String,
    labels: Vec<String>,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    title: String,
    body: String,
    labels: &'a [String],
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    html_url: String,
}

impl GithubIssueSink {
    pub fn from_config(config: &EscalationConfig) -> std::result::Result<Self, EscalationError> {
        let token = config
            .github_token
            .clone()
            .ok_or_else(|| EscalationError::NotConfigured("GITHUB_TOKEN is not set".into()))?;
        let repository = config
            .github_repository
            .clone()
            .ok_or_else(|| EscalationError::NotConfigured("GITHUB_REPOSITORY is not set".into()))?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("curator/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| EscalationError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: format!(
                "{}/repos/{}/issues",
                config.api_base.trim_end_matches('/'),
                repository
            ),
            token,
            labels: config.labels.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl EscalationSink for GithubIssueSink {
    async fn file(&self, record: &EscalationRecord) -> std::result::Result<TicketRef, EscalationError> {
        let request = IssueRequest {
            title: record.title(),
            body: render_ticket_markdown(record),
            labels: &self.labels,
        };
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EscalationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EscalationError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        let issue: IssueResponse = response
            .json()
            .await
            .map_err(|e| EscalationError::Http(e.to_string()))?;
        info!(segment_id = %record.segment_id, issue = issue.number, url = %issue.html_url, "escalation: issue created");
        Ok(TicketRef {
            sink: "github".to_string(),
            location: issue.html_url,
        })
    }
}

/// Writes the ticket to the log at error level. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl EscalationSink for LogSink {
    async fn file(&self, record: &EscalationRecord) -> std::result::Result<TicketRef, EscalationError> {
        error!(
            segment_id = %record.segment_id,
            escalation_id = %record.id,
            reason = %record.reason,
            "escalation: {}\n{}",
            record.title(),
            render_ticket_markdown(record)
        );
        Ok(TicketRef {
            sink: "log".to_string(),
            location: record.id.to_string(),
        })
    }
}

/// Tries the primary sink, then falls back to the log.
pub struct FallbackSink {
    primary: Option<Box<dyn EscalationSink>>,
    fallback: LogSink,
}

impl FallbackSink {
    pub fn new(primary: Option<Box<dyn EscalationSink>>) -> Self {
        Self {
            primary,
            fallback: LogSink,
        }
    }

    /// GitHub when configured, log otherwise.
    pub fn from_config(config: &EscalationConfig) -> Self {
        match GithubIssueSink::from_config(config) {
            Ok(sink) => Self::new(Some(Box::new(sink))),
            Err(e) => {
                warn!(error = %e, "escalation: ticket sink unavailable; using log");
                Self::new(None)
            }
        }
    }
}

#[async_trait]
impl EscalationSink for FallbackSink {
    async fn file(&self, record: &EscalationRecord) -> std::result::Result<TicketRef, EscalationError> {
        if let Some(primary) = &self.primary {
            match primary.file(record).await {
                Ok(ticket) => return Ok(ticket),
                Err(e) => {
                    warn!(segment_id = %record.segment_id, error = %e, "escalation: primary sink failed; using log")
                }
            }
        }
        self.fallback.file(record).await
    }
}

fn escalation_dir(dir: &Path, segment_id: &str, run_date: NaiveDate) -> PathBuf {
    dir.join(run_date.format("%Y-%m-%d").to_string()).join(segment_id)
}

/// Persist `<dir>/<date>/<segment>/escalation.json` and `escalation.digest`.
pub fn write_escalation_artifact(record: &EscalationRecord, dir: &Path) -> Result<PathBuf> {
    let out_dir = escalation_dir(dir, &record.segment_id, record.run_date);
    std::fs::create_dir_all(&out_dir)?;

    let artifact_path = out_dir.join("escalation.json");
    let digest_path = out_dir.join("escalation.digest");
    let json = serde_json::to_vec_pretty(record)?;
    let digest = ContentDigest::from_bytes(&json);

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(&digest_path, digest.as_str().as_bytes())?;

    Ok(artifact_path)
}

/// Read `<dir>/<date>/<segment>/escalation.json` and verify its digest.
pub fn read_escalation_artifact(
    segment_id: &str,
    run_date: NaiveDate,
    dir: &Path,
) -> Result<EscalationRecord> {
    let out_dir = escalation_dir(dir, segment_id, run_date);
    let json = std::fs::read(out_dir.join("escalation.json"))?;
    let expected = std::fs::read_to_string(out_dir.join("escalation.digest"))?;
    let actual = ContentDigest::from_bytes(&json);
    if expected.trim() != actual.as_str() {
        return Err(CuratorError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual: actual.as_str().to_string(),
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    #[test]
    fn test_reason_display() {
        let reason = EscalationReason::Unhealable {
            classes: vec![FailureClass::TemplateUnrendered],
            unmapped_checks: Vec::new(),
        };
        assert_eq!(reason.to_string(), "unhealable failure: template_unrendered");
    }

    #[test]
    fn test_ticket_markdown_without_session() {
        let record = EscalationRecord::new(
            "builders",
            date(),
            EscalationReason::SelectionFailed {
                detail: "no selection after 3 attempts".into(),
            },
        );
        let md = render_ticket_markdown(&record);
        assert!(md.starts_with("## Digest selection failed: builders (2026-10-18)"));
        assert!(md.contains("**Reason:** selection failed: no selection after 3 attempts"));
        assert!(md.contains("### Next steps"));
        assert!(!md.contains("Quality gate report"));
    }

    #[test]
    fn test_ticket_markdown_for_aborted_segment() {
        let record = EscalationRecord::new(
            "leaders",
            date(),
            EscalationReason::SegmentAborted {
                detail: "task 7 panicked".into(),
            },
        );
        let md = render_ticket_markdown(&record);
        assert!(md.starts_with("## Digest segment aborted: leaders (2026-10-18)\n\n"));
        assert!(md.contains("**Reason:** segment task aborted: task 7 panicked  \n"));
        assert!(md.contains("1. Read the run log for the panic message of this segment.\n"));
        assert!(md.ends_with("2. Re-run `curator run --segment` for it once fixed.\n"));
    }

    #[test]
    fn test_github_sink_requires_token_and_repo() {
        let config = EscalationConfig::default();
        assert!(matches!(
            GithubIssueSink::from_config(&config),
            Err(EscalationError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_sink_uses_log_when_unconfigured() {
        let sink = FallbackSink::from_config(&EscalationConfig::default());
        let record = EscalationRecord::new("builders", date(), EscalationReason::Exhausted { attempts: 2 });
        let ticket = sink.file(&record).await.expect("file");
        assert_eq!(ticket.sink, "log");
        assert_eq!(ticket.location, record.id.to_string());
    }
}
