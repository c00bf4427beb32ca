//! Cross-cutting error types for Standin.
//!
//! Domain-specific errors (`AuthError`, `SessionError`) live in their own
//! crates. This module only holds what any crate may raise.

use thiserror::Error;

/// Errors that can be raised by any Standin crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A state machine transition was attempted that is not allowed.
    #[error("Invalid state transition: {entity_type} from {from} to {to}")]
    InvalidTransition {
        entity_type: String,
        from: String,
        to: String,
    },

    /// Data failed validation (schema, format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = CoreError::InvalidTransition {
            entity_type: "impersonation_session".into(),
            from: "idle".into(),
            to: "ending".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition: impersonation_session from idle to ending"
        );
    }

    #[test]
    fn anyhow_converts_into_other() {
        let err: CoreError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, CoreError::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
