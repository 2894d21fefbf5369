//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::order::OrderError;

/// Errors that can occur while loading or executing commands.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The order rejected the command.
    #[error("{0}")]
    Order(#[from] OrderError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("{aggregate_type} {aggregate_id} not found")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Every attempt lost the race for the stream's next version.
    #[error("gave up on {aggregate_id} after {attempts} conflicting writes")]
    ConflictRetriesExhausted {
        aggregate_id: AggregateId,
        attempts: u32,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Stable error kind shared by every layer.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Order(err) => err.kind(),
            DomainError::Ledger(err) => err.kind(),
            DomainError::NotFound { .. } => "not_found",
            DomainError::ConflictRetriesExhausted { .. } => "conflict",
            DomainError::EventStore(
                EventStoreError::ConcurrencyConflict { .. } | EventStoreError::UniqueViolation { .. },
            ) => "conflict",
            DomainError::EventStore(_) | DomainError::Serialization(_) => "persistence_error",
        }
    }

    /// The claim key and owner, if the append hit a unique-claim violation.
    pub fn unique_violation(&self) -> Option<(&str, AggregateId)> {
        match self {
            DomainError::EventStore(EventStoreError::UniqueViolation { key, owner }) => {
                Some((key.as_str(), *owner))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::Version;

    #[test]
    fn kinds_follow_the_wrapped_error() {
        assert_eq!(DomainError::from(OrderError::AlreadyConfirmed).kind(), "already_confirmed");
        assert_eq!(
            DomainError::from(LedgerError::Validation("x".into())).kind(),
            "validation_error"
        );

        let conflict = DomainError::from(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert_eq!(conflict.kind(), "conflict");

        let invalid = DomainError::from(EventStoreError::InvalidAppend("empty".into()));
        assert_eq!(invalid.kind(), "persistence_error");
    }

    #[test]
    fn exposes_unique_violations() {
        let owner = AggregateId::new();
        let err = DomainError::from(EventStoreError::UniqueViolation {
            key: "order-number:ORD1".into(),
            owner,
        });
        assert_eq!(err.unique_violation(), Some(("order-number:ORD1", owner)));
        assert!(DomainError::from(OrderError::NotFound).unique_violation().is_none());
    }
}
