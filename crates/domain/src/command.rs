//! Command handling: load, decide, conditional append.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Instant;

use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, UniqueClaim, Version,
};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// How many times a command is decided again after losing a version race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// A single attempt; conflicts surface to the caller.
    pub fn no_retry() -> Self {
        Self::new(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Extra data attached to the append.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub claims: Vec<UniqueClaim>,
    pub correlation_id: Option<AggregateId>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CommandOptions {
    /// Options with no claims, correlation or metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unique claim to the append.
    pub fn claim(mut self, claim: UniqueClaim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Sets the correlation id on every appended event.
    pub fn correlate(mut self, id: AggregateId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Adds a metadata entry to every appended event.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were decided and persisted. Empty when the command
    /// turned out to be a no-op.
    pub events: Vec<A::Event>,

    /// The persisted envelopes, in the same order as `events`.
    pub envelopes: Vec<EventEnvelope>,

    pub previous_version: Version,
    pub new_version: Version,

    /// Number of times the command was decided.
    pub attempts: u32,
}

impl<A: Aggregate> CommandResult<A> {
    /// Returns true if the decision produced no events.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Executes decisions against aggregates under optimistic concurrency.
///
/// The decision closure is re-run against a fresh read whenever the append
/// loses a version race, up to the [`RetryPolicy`] limit. A decision that
/// was valid on the stale read may therefore fail on the retry; that failure
/// is what the caller sees.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    retry: RetryPolicy,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry,
            _phantom: PhantomData,
        }
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a handler with the default retry policy.
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    /// Creates a handler with an explicit retry policy.
    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            _phantom: PhantomData,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Loads an aggregate, starting from its latest snapshot if there is one.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: DeserializeOwned,
    {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let version = snapshot.version;
                let mut restored: A = snapshot.into_state()?;
                restored.set_version(version);
                restored
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: DeserializeOwned,
    {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Like [`load_existing`](Self::load_existing) but fails with `NotFound`.
    pub async fn load_required(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: DeserializeOwned,
    {
        self.load_existing(aggregate_id)
            .await?
            .ok_or(DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id,
            })
    }

    /// Decides and appends with default options.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: DeserializeOwned,
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute_with(aggregate_id, CommandOptions::default(), decide)
            .await
    }

    /// Decides and appends, retrying on version conflicts.
    ///
    /// Unique-claim violations are not retried: the decision itself has to
    /// change (e.g. a new order number), which only the caller can do.
    #[tracing::instrument(
        skip_all,
        fields(aggregate_type = A::aggregate_type(), %aggregate_id)
    )]
    pub async fn execute_with<F>(
        &self,
        aggregate_id: AggregateId,
        options: CommandOptions,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: DeserializeOwned,
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let mut aggregate = self.load(aggregate_id).await?;
            let previous_version = aggregate.version();

            let events = decide(&aggregate)?;
            if events.is_empty() {
                return Ok(CommandResult {
                    aggregate,
                    events,
                    envelopes: Vec::new(),
                    previous_version,
                    new_version: previous_version,
                    attempts,
                });
            }

            let envelopes =
                Self::build_envelopes(aggregate_id, previous_version, &events, &options)?;
            let append = AppendOptions::expect_version(previous_version)
                .with_claims(options.claims.iter().cloned());

            match self.store.append(envelopes.clone(), append).await {
                Ok(new_version) => {
                    aggregate.apply_events(events.iter().cloned());
                    aggregate.set_version(new_version);

                    metrics::histogram!(
                        "command_duration_seconds",
                        "aggregate_type" => A::aggregate_type()
                    )
                    .record(started.elapsed().as_secs_f64());

                    return Ok(CommandResult {
                        aggregate,
                        events,
                        envelopes,
                        previous_version,
                        new_version,
                        attempts,
                    });
                }
                Err(err) if err.is_conflict() => {
                    metrics::counter!(
                        "command_conflicts_total",
                        "aggregate_type" => A::aggregate_type()
                    )
                    .increment(1);

                    if attempts >= self.retry.max_attempts {
                        tracing::warn!(attempts, "giving up after repeated version conflicts");
                        return Err(DomainError::ConflictRetriesExhausted {
                            aggregate_id,
                            attempts,
                        });
                    }
                    tracing::warn!(attempts, error = %err, "version conflict, deciding again");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn build_envelopes(
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
        options: &CommandOptions,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let mut builder = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?;
            if let Some(correlation_id) = options.correlation_id {
                builder = builder.correlation_id(correlation_id);
            }
            for (key, value) in &options.metadata {
                builder = builder.metadata(key.clone(), value.clone());
            }
            envelopes.push(builder.build()?);
        }

        Ok(envelopes)
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Executes a command and saves a snapshot when the new events cross a
    /// snapshot boundary. A failed snapshot write does not fail the command.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        options: CommandOptions,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute_with(aggregate_id, options, decide).await?;

        if result.aggregate.should_snapshot(result.previous_version) {
            let snapshot = Snapshot::from_state(
                aggregate_id,
                A::aggregate_type(),
                result.new_version,
                &result.aggregate,
            )?;
            if let Err(err) = self.store.save_snapshot(snapshot).await {
                tracing::warn!(%aggregate_id, error = %err, "failed to save snapshot");
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use event_store::{EventStoreError, InMemoryEventStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TillEvent {
        Opened { id: AggregateId },
        Deposited { cents: i64 },
    }

    impl DomainEvent for TillEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TillEvent::Opened { .. } => "TillOpened",
                TillEvent::Deposited { .. } => "TillDeposited",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Till {
        id: Option<AggregateId>,
        balance: i64,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("till is closed")]
    struct TillClosed;

    impl From<TillClosed> for DomainError {
        fn from(_: TillClosed) -> Self {
            DomainError::Order(crate::order::OrderError::NotFound)
        }
    }

    impl Aggregate for Till {
        type Event = TillEvent;
        type Error = TillClosed;

        fn aggregate_type() -> &'static str {
            "Till"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TillEvent::Opened { id } => self.id = Some(id),
                TillEvent::Deposited { cents } => self.balance += cents,
            }
        }
    }

    impl SnapshotCapable for Till {
        fn snapshot_interval() -> usize {
            3
        }
    }

    fn deposit(till: &Till, cents: i64) -> Result<Vec<TillEvent>, TillClosed> {
        if till.id.is_none() {
            return Err(TillClosed);
        }
        Ok(vec![TillEvent::Deposited { cents }])
    }

    async fn open(handler: &CommandHandler<InMemoryEventStore, Till>) -> AggregateId {
        let id = AggregateId::new();
        handler
            .execute(id, |_| Ok(vec![TillEvent::Opened { id }]))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn execute_appends_and_applies() {
        let handler = CommandHandler::<_, Till>::new(InMemoryEventStore::new());
        let id = open(&handler).await;

        let result = handler.execute(id, |till| deposit(till, 250)).await.unwrap();

        assert_eq!(result.previous_version, Version::first());
        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.balance, 250);
        assert_eq!(result.envelopes.len(), 1);
        assert_eq!(result.envelopes[0].event_type, "TillDeposited");
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn rejected_decisions_write_nothing() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Till>::new(store.clone());

        let err = handler
            .execute(AggregateId::new(), |till| deposit(till, 1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "not_found");
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn empty_decisions_are_noops() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Till>::new(store.clone());

        let result = handler.execute(AggregateId::new(), |_| Ok(vec![])).await.unwrap();

        assert!(result.is_noop());
        assert_eq!(result.new_version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn conflicts_are_decided_again_on_a_fresh_read() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Till>::new(store.clone());
        let id = open(&handler).await;
        let calls = AtomicU32::new(0);

        let result = handler
            .execute(id, |till| {
                // A competing writer lands between our read and our append.
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    deposit_behind_our_back(&store, id, Version::new(2), 100);
                }
                deposit(till, 10)
            })
            .await
            .unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.aggregate.balance, 110);
        assert_eq!(result.new_version, Version::new(3));
    }

    /// Appends straight to the store from another thread, as a competing
    /// process would.
    fn deposit_behind_our_back(
        store: &InMemoryEventStore,
        id: AggregateId,
        version: Version,
        cents: i64,
    ) {
        let envelope = EventEnvelope::builder()
            .aggregate_id(id)
            .aggregate_type("Till")
            .event_type("TillDeposited")
            .version(version)
            .payload(&TillEvent::Deposited { cents })
            .unwrap()
            .build()
            .unwrap();
        let store = store.clone();
        std::thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(store.append(vec![envelope], AppendOptions::new()))
                .unwrap();
        })
        .join()
        .unwrap();
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = InMemoryEventStore::new();
        let handler =
            CommandHandler::<_, Till>::with_retry_policy(store.clone(), RetryPolicy::new(2));
        let id = open(&handler).await;
        let next = AtomicU32::new(2);

        let err = handler
            .execute(id, |till| {
                let version = next.fetch_add(1, Ordering::SeqCst);
                deposit_behind_our_back(&store, id, Version::new(i64::from(version)), 1);
                deposit(till, 5)
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::ConflictRetriesExhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn claims_and_correlation_travel_with_the_append() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Till>::new(store.clone());
        let first = AggregateId::new();
        let second = AggregateId::new();
        let order_id = AggregateId::new();
        let claim = UniqueClaim::new("till-name", "front");

        let result = handler
            .execute_with(
                first,
                CommandOptions::new()
                    .claim(claim.clone())
                    .correlate(order_id)
                    .metadata("actor", serde_json::json!("admin-1")),
                |_| Ok(vec![TillEvent::Opened { id: first }]),
            )
            .await
            .unwrap();
        assert_eq!(result.envelopes[0].correlation_id, Some(order_id));
        assert_eq!(result.envelopes[0].metadata["actor"], "admin-1");
        assert_eq!(store.resolve_claim(&claim.key).await.unwrap(), Some(first));

        let err = handler
            .execute_with(second, CommandOptions::new().claim(claim), |_| {
                Ok(vec![TillEvent::Opened { id: second }])
            })
            .await
            .unwrap_err();
        assert_eq!(err.unique_violation().map(|(_, owner)| owner), Some(first));
        assert!(matches!(
            err,
            DomainError::EventStore(EventStoreError::UniqueViolation { .. })
        ));
        assert!(handler.load_existing(second).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshots_when_crossing_the_interval_and_reloads_from_it() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Till>::new(store.clone());
        let id = open(&handler).await;

        handler
            .execute_with_snapshot(id, CommandOptions::new(), |till| {
                Ok(vec![
                    deposit(till, 1)?.remove(0),
                    TillEvent::Deposited { cents: 2 },
                    TillEvent::Deposited { cents: 3 },
                ])
            })
            .await
            .unwrap();

        let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(4));

        let reloaded = handler.load_required(id).await.unwrap();
        assert_eq!(reloaded.balance, 6);
        assert_eq!(reloaded.version(), Version::new(4));
    }

    #[tokio::test]
    async fn load_required_reports_missing_streams() {
        let handler = CommandHandler::<_, Till>::new(InMemoryEventStore::new());
        let err = handler.load_required(AggregateId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::NotFound {
                aggregate_type: "Till",
                ..
            }
        ));
    }
}
