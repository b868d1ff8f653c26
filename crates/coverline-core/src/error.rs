//! Domain error types.
//!
//! Every failure mode the engine can produce is a distinct variant so that
//! the calling layer can translate it without parsing messages.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// An entity inside an aggregate was not found.
    #[error("{entity} not found: {id}")]
    EntityNotFound {
        /// The kind of entity, e.g. `"quote"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A domain invariant was violated by the caller.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A rollback was requested for an aggregate with no persisted events.
    #[error("aggregate {aggregate_id} has no prior sequence numbers to roll back to")]
    NoPriorEvents {
        /// The aggregate being rolled back.
        aggregate_id: Uuid,
    },

    /// A rollback targeted the aggregate's current highest sequence number.
    #[error(
        "aggregate {aggregate_id} is already at sequence number {sequence_number}; nothing to roll back"
    )]
    SameSequenceNumber {
        /// The aggregate being rolled back.
        aggregate_id: Uuid,
        /// The requested target.
        sequence_number: i64,
    },

    /// A rollback targeted a sequence number that is not part of the history.
    #[error("aggregate {aggregate_id} has no event with sequence number {sequence_number}")]
    RollbackTargetNotFound {
        /// The aggregate being rolled back.
        aggregate_id: Uuid,
        /// The requested target.
        sequence_number: i64,
    },

    /// A datum was present but could not be converted to the requested type.
    #[error("could not resolve {target_type} at {location}: {reason}")]
    DatumResolution {
        /// Human readable location, e.g. `FormData:policyStartDate`.
        location: String,
        /// The requested Rust type.
        target_type: &'static str,
        /// Why the conversion failed.
        reason: String,
    },

    /// Configuration could not be parsed or named something unknown.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Shorthand for an [`DomainError::InvariantViolation`].
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Shorthand for a [`DomainError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for an [`DomainError::EntityNotFound`].
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for the not-found family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AggregateNotFound(_)
                | Self::EntityNotFound { .. }
                | Self::RollbackTargetNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_formats_entity_and_id() {
        let id = Uuid::new_v4();
        let err = DomainError::not_found("quote", id);
        assert_eq!(err.to_string(), format!("quote not found: {id}"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rollback_errors_are_distinguishable() {
        let aggregate_id = Uuid::new_v4();
        let none = DomainError::NoPriorEvents { aggregate_id };
        let same = DomainError::SameSequenceNumber {
            aggregate_id,
            sequence_number: 3,
        };
        let missing = DomainError::RollbackTargetNotFound {
            aggregate_id,
            sequence_number: 9,
        };

        assert_ne!(none, same);
        assert!(!same.is_not_found());
        assert!(missing.is_not_found());
        assert!(missing.to_string().contains("sequence number 9"));
    }

    #[test]
    fn test_invariant_and_validation_are_not_not_found() {
        assert!(!DomainError::invariant("x").is_not_found());
        assert!(!DomainError::validation("y").is_not_found());
    }
}
