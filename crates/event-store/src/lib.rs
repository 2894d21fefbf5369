//! Append-only event log for the marketplace order engine.
//!
//! Streams are keyed by [`AggregateId`] and versioned; appends are conditional
//! on the expected version (compare-and-swap) and may claim unique keys such
//! as order numbers atomically with the events.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, UniqueClaim};
