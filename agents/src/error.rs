//! Pipeline Error Module
//!
//! Contract errors that escape to the caller. Component failures inside the
//! pipeline are absorbed into telemetry, violations, and trace step errors
//! and never surface through these variants.

use thiserror::Error;

/// Errors `generate_assessment` may return.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required intent field is missing or carries an unusable value.
    #[error("invalid intent field '{field}': {reason}")]
    InvalidIntent { field: String, reason: String },

    /// The pre-validator found contradictions and the caller did not
    /// override the block.
    #[error("intent blocked: {}", .contradictions.join("; "))]
    BlockedIntent { contradictions: Vec<String> },

    /// Transport or provider configuration failure, surfaced unchanged.
    #[error(transparent)]
    Configuration(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_intent_message_lists_contradictions() {
        let err = PipelineError::BlockedIntent {
            contradictions: vec![
                "a test needs at least 15 minutes".to_string(),
                "too many sections".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("at least 15 minutes"));
        assert!(msg.contains("too many sections"));
    }
}
