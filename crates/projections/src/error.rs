//! Projection errors.

use thiserror::Error;

/// Errors raised while building read models.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored payload no longer matches its event type.
    #[error("could not decode {event_type} event: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// An event refers to an order the view has never seen.
    #[error("{view} has no record of order {order_id}")]
    UnknownOrder {
        view: &'static str,
        order_id: common::AggregateId,
    },
}

impl ProjectionError {
    pub(crate) fn decode(event_type: &str, source: serde_json::Error) -> Self {
        ProjectionError::Decode {
            event_type: event_type.to_string(),
            source,
        }
    }
}

/// Result alias for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
