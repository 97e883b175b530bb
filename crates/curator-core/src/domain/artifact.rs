//! The rendered digest document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::digest::ContentDigest;

/// A single serialized document derived from a Selection.
///
/// Regenerated in full on every compose; never diffed or patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub segment_id: String,
    /// Explicit "generated date"; the only date-dependent input to rendering.
    pub run_date: NaiveDate,
    pub body: String,
    pub byte_size: usize,
}

impl RenderedArtifact {
    pub fn new(segment_id: impl Into<String>, run_date: NaiveDate, body: String) -> Self {
        let byte_size = body.len();
        Self {
            segment_id: segment_id.into(),
            run_date,
            body,
            byte_size,
        }
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::from_bytes(self.body.as_bytes())
    }

    pub fn size_kib(&self) -> f64 {
        self.byte_size as f64 / 1024.0
    }
}
