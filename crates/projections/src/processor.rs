//! Feeds the global event log to registered projections.

use std::sync::Arc;

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from the store to every registered projection.
///
/// Catch-up is incremental: each projection only receives the events past
/// its own position, so calling it before every read keeps views current
/// without replaying history. Positions count events, which relies on the
/// store serving the log as a sequence that only grows at its end.
/// Concurrent catch-ups are serialized.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Arc<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a processor with no projections.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    /// Adds a projection; it starts at its own current position.
    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the log and hands each projection what it has not seen yet.
    /// Returns the number of deliveries made.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;
        let mut stream = self.store.stream_all_events().await?;
        let mut index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(event) = stream.next().await {
            let event = event?;
            index += 1;

            for projection in &self.projections {
                if projection.position().await.events_seen < index {
                    projection.handle(&event).await?;
                    delivered += 1;
                    metrics::counter!("projections_events_processed", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(events = index, delivered, "projections caught up");
        }
        Ok(delivered)
    }

    /// Hands one event to every projection, bypassing the log.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Resets every projection and replays the whole log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
            tracing::info!(projection = projection.name(), "projection reset");
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, InMemoryEventStore, Version};
    use tokio::sync::RwLock;

    use super::*;
    use crate::projection::ProjectionPosition;

    #[derive(Default)]
    struct Tally {
        seen: RwLock<Vec<String>>,
        position: RwLock<ProjectionPosition>,
    }

    #[async_trait]
    impl Projection for Tally {
        fn name(&self) -> &'static str {
            "tally"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            self.seen.write().await.push(event.event_type.clone());
            let mut position = self.position.write().await;
            *position = position.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            self.seen.write().await.clear();
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    async fn seeded(count: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let events = (1..=count).map(|v| event(id, v, "LocationRecorded")).collect();
        store.append(events, AppendOptions::new()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn catch_up_delivers_each_event_once() {
        let store = seeded(3).await;
        let tally = Arc::new(Tally::default());
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(tally.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);

        let id = AggregateId::new();
        store
            .append(vec![event(id, 1, "OrderPlaced")], AppendOptions::new())
            .await
            .unwrap();
        assert_eq!(processor.run_catch_up().await.unwrap(), 1);
        assert_eq!(tally.seen.read().await.len(), 4);
        assert_eq!(tally.seen.read().await[3], "OrderPlaced");
    }

    #[tokio::test]
    async fn late_registered_projection_starts_from_the_beginning() {
        let store = seeded(2).await;
        let early = Arc::new(Tally::default());
        let late = Arc::new(Tally::default());

        let mut processor = ProjectionProcessor::new(store);
        processor.register(early.clone());
        processor.run_catch_up().await.unwrap();
        processor.register(late.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 2);
        assert_eq!(early.position().await.events_seen, 2);
        assert_eq!(late.position().await.events_seen, 2);
    }

    #[tokio::test]
    async fn rebuild_replays_from_scratch() {
        let store = seeded(2).await;
        let tally = Arc::new(Tally::default());
        let mut processor = ProjectionProcessor::new(store);
        processor.register(tally.clone());

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.rebuild_all().await.unwrap(), 2);
        assert_eq!(tally.seen.read().await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_catch_ups_do_not_double_deliver() {
        let store = seeded(20).await;
        let tally = Arc::new(Tally::default());
        let mut processor = ProjectionProcessor::new(store);
        processor.register(tally.clone());
        let processor = Arc::new(processor);

        let (a, b) = tokio::join!(processor.run_catch_up(), processor.run_catch_up());
        assert_eq!(a.unwrap() + b.unwrap(), 20);
        assert_eq!(tally.seen.read().await.len(), 20);
    }
}
