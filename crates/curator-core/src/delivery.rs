//! Delivery of approved artifacts.
//!
//! A [`DeliveryChannel`] only ever sees an [`ApprovedArtifact`], which the
//! heal loop constructs after a passing gate run. Nothing outside this crate
//! can mint one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ContentDigest, RenderedArtifact, Result};

/// A rendered artifact that passed the quality gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedArtifact(RenderedArtifact);

impl ApprovedArtifact {
    pub(crate) fn new(artifact: RenderedArtifact) -> Self {
        Self(artifact)
    }

    pub fn artifact(&self) -> &RenderedArtifact {
        &self.0
    }

    pub fn into_inner(self) -> RenderedArtifact {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub segment_id: String,
    pub location: String,
    pub digest: ContentDigest,
    pub byte_size: usize,
    pub delivered_at: DateTime<Utc>,
}

/// Outbound channel for passing artifacts.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, artifact: &ApprovedArtifact) -> Result<DeliveryReceipt>;
}

/// Writes `<dir>/<date>/<segment>.html` plus a `.digest` sidecar.
#[derive(Debug, Clone)]
pub struct OutboxDelivery {
    dir: PathBuf,
}

impl OutboxDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &RenderedArtifact) -> PathBuf {
        self.dir
            .join(artifact.run_date.format("%Y-%m-%d").to_string())
            .join(format!("{}.html", artifact.segment_id))
    }
}

#[async_trait]
impl DeliveryChannel for OutboxDelivery {
    async fn deliver(&self, approved: &ApprovedArtifact) -> Result<DeliveryReceipt> {
        let artifact = approved.artifact();
        let path = self.path_for(artifact);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let digest = artifact.digest();
        tokio::fs::write(&path, artifact.body.as_bytes()).await?;
        tokio::fs::write(path.with_extension("digest"), digest.as_str().as_bytes()).await?;

        Ok(DeliveryReceipt {
            segment_id: artifact.segment_id.clone(),
            location: path.display().to_string(),
            digest,
            byte_size: artifact.byte_size,
            delivered_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_outbox_writes_body_and_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        let artifact = RenderedArtifact::new("builders", date, "<html>ok</html>".to_string());
        let outbox = OutboxDelivery::new(dir.path());

        let receipt = outbox
            .deliver(&ApprovedArtifact::new(artifact.clone()))
            .await
            .expect("deliver");

        let path = dir.path().join("2026-10-18").join("builders.html");
        assert_eq!(receipt.location, path.display().to_string());
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "<html>ok</html>");
        let digest = std::fs::read_to_string(path.with_extension("digest")).expect("digest");
        assert_eq!(digest, artifact.digest().as_str());
    }
}
