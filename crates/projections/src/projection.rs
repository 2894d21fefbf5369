//! Projection and read model traits.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the global event log a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_seen: u64,
}

impl ProjectionPosition {
    /// Position before any event.
    pub fn zero() -> Self {
        Self { events_seen: 0 }
    }

    /// Position after one more event.
    pub fn advance(&self) -> Self {
        Self {
            events_seen: self.events_seen + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_seen)
    }
}

/// Folds events into a read model.
///
/// `handle` is called once per event of the global log, in insertion order,
/// including events the projection does not care about; those only advance
/// the position.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all state and rewinds to position zero.
    async fn reset(&self) -> Result<()>;
}

/// Query-side view that reports its size for health output.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn count(&self) -> usize;
}
