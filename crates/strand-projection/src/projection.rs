use strand_events::StoredEvent;

use crate::error::ProjectionResult;

/// A materialized view folded from events.
///
/// Implementations use interior mutability so the engine and readers can
/// share one instance behind an `Arc`.
pub trait Projection: Send + Sync {
    /// Stable name, unique within an engine.
    fn name(&self) -> &str;

    /// Fold one event into the view. Events the view does not care about
    /// are ignored.
    fn apply(&self, event: &StoredEvent) -> ProjectionResult<()>;

    /// Drop all state.
    fn reset(&self);

    /// Deterministic encoding of the whole view.
    fn state_bytes(&self) -> ProjectionResult<Vec<u8>>;
}
