use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, Version};

/// A secondary key that must be unique across all streams.
///
/// Claims are written in the same atomic unit as the events, so a stream that
/// loses the race for a key never persists any of its events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueClaim {
    pub key: String,
}

impl UniqueClaim {
    /// Builds a namespaced key such as `order-number:ORD2610191234567890`.
    pub fn new(namespace: &str, value: impl std::fmt::Display) -> Self {
        Self {
            key: format!("{namespace}:{value}"),
        }
    }
}

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected current version of the stream. `None` skips the check.
    pub expected_version: Option<Version>,

    /// Unique keys this append takes ownership of.
    pub claims: Vec<UniqueClaim>,
}

impl AppendOptions {
    /// Options with no version check and no claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the stream to be at exactly this version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
            claims: Vec::new(),
        }
    }

    /// Expects the stream to be empty.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }

    /// Adds one unique claim.
    pub fn with_claim(mut self, claim: UniqueClaim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Adds several unique claims.
    pub fn with_claims(mut self, claims: impl IntoIterator<Item = UniqueClaim>) -> Self {
        self.claims.extend(claims);
        self
    }
}

/// Boxed stream of events read from a store.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Storage abstraction for versioned event streams.
///
/// Every mutation of an order goes through `append` with an expected version,
/// which makes the store the single arbiter of concurrent writers.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events atomically.
    ///
    /// Fails with `ConcurrencyConflict` if the stream is not at
    /// `options.expected_version`, and with `UniqueViolation` if any claim is
    /// held by a different stream. Nothing is written on failure.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// All events of a stream in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events of a stream from `from_version` (inclusive), in version order.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events matching a query, ordered by timestamp then version.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Every event in insertion order. The log only grows at its end, so a
    /// count of events read stays a valid position between calls.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Current version of a stream, or `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Returns the stream owning a unique key.
    async fn resolve_claim(&self, key: &str) -> Result<Option<AggregateId>>;

    /// Saves a snapshot, replacing any previous one for the stream.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience queries built on [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Loads the latest snapshot (if any) and the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.get_events_for_aggregate(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch targets one stream with consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}
