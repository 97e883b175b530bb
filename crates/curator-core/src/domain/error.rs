//! Domain-level error taxonomy for the curator pipeline.

/// Curator domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("invalid segment profile: {0}")]
    InvalidSegment(String),

    #[error("segment not found: {0}")]
    SegmentNotFound(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("selection error: {0}")]
    Selection(#[from] crate::classifier::SelectionError),

    #[error("compose error: {0}")]
    Compose(#[from] crate::composer::ComposeError),

    #[error("escalation error: {0}")]
    Escalation(#[from] crate::escalation::EscalationError),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for curator domain operations.
pub type Result<T> = std::result::Result<T, CuratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curator_error_display() {
        let err = CuratorError::SegmentNotFound("builders".to_string());
        assert!(err.to_string().contains("segment not found"));
        assert!(err.to_string().contains("builders"));

        let err = CuratorError::InvalidItem("empty title".to_string());
        assert!(err.to_string().contains("invalid item"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = CuratorError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
