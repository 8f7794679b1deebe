//! Engine error types.
//!
//! Validation problems are data, not errors: they travel as
//! [`crate::validate::ValidationIssue`] lists. `EngineError` covers the
//! operational failures — bad call shapes, business-rule violations,
//! missing entities, illegal state transitions, and storage faults.

use thiserror::Error;

/// Errors that can occur when calling the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input had the wrong shape (not an object, missing a required
    /// argument, unparseable payload).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A track- or submission-level business rule was violated.
    #[error("rule violation: {0}")]
    RuleViolation(String),

    /// An entity referenced by id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation is not legal in the entity's current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The storage backend failed; imports roll back, grading may retry.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { entity, id: id.into() }
    }

    /// Returns `true` when retrying the same call cannot succeed without the
    /// caller changing something first.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}
