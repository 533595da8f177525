//! Projection registration, live application and resumable rebuilds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use strand_events::{EventSource, Position, StoredEvent};
use strand_types::EventId;
use tracing::{debug, info, warn};

use crate::error::{ProjectionError, ProjectionResult};
use crate::projection::Projection;

const DEFAULT_BATCH_SIZE: usize = 512;

/// Cooperative cancellation flag shared between a rebuild and its caller.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What happened to one event across all projections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyReport {
    pub event: EventId,
    pub applied: Vec<String>,
    /// Already applied, or the projection is mid-rebuild.
    pub skipped: Vec<String>,
    /// `(projection, error)` pairs.
    pub failed: Vec<(String, String)>,
}

impl ApplyReport {
    fn new(event: EventId) -> Self {
        Self {
            event,
            applied: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub projection: String,
    /// Events applied by this call.
    pub applied: u64,
    /// Events that failed to apply during this call.
    pub failed: u64,
    /// Last position replayed so far.
    pub position: Option<Position>,
    pub completed: bool,
    /// Whether this call continued an earlier cancelled rebuild.
    pub resumed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct RebuildCursor {
    position: Option<Position>,
}

struct Slot {
    projection: Arc<dyn Projection>,
    /// Highest position applied. Events arrive in log order, so anything at
    /// or before it has been seen.
    checkpoint: Option<Position>,
    /// Set while a rebuild is in progress or was cancelled part-way.
    rebuild: Option<RebuildCursor>,
}

impl Slot {
    fn name(&self) -> &str {
        self.projection.name()
    }

    fn is_done(&self, stored: &StoredEvent) -> bool {
        self.checkpoint.is_some_and(|c| stored.position <= c)
    }

    /// Apply and record one event. Failures are logged and the checkpoint
    /// still moves past the event.
    fn apply(&mut self, stored: &StoredEvent) -> Result<(), String> {
        let result = self.projection.apply(stored).map_err(|e| {
            warn!(
                projection = self.projection.name(),
                event = %stored.event.id,
                position = %stored.position,
                error = %e,
                "projection failed to apply event"
            );
            e.to_string()
        });
        self.checkpoint = Some(self.checkpoint.map_or(stored.position, |c| c.max(stored.position)));
        result
    }
}

/// Owns the registered projections and feeds them events.
pub struct ProjectionEngine {
    slots: Mutex<Vec<Slot>>,
    batch_size: usize,
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionEngine {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }

    /// Engine whose rebuilds read `batch_size` events per step.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            batch_size: batch_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().expect("lock poisoned")
    }

    pub fn register(&self, projection: Arc<dyn Projection>) -> ProjectionResult<()> {
        let mut slots = self.lock();
        if slots.iter().any(|s| s.name() == projection.name()) {
            return Err(ProjectionError::DuplicateProjection(projection.name().to_string()));
        }
        debug!(projection = projection.name(), "registered projection");
        slots.push(Slot {
            projection,
            checkpoint: None,
            rebuild: None,
        });
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Projection>> {
        self.lock()
            .iter()
            .find(|s| s.name() == name)
            .map(|s| Arc::clone(&s.projection))
    }

    /// Last position applied by a projection.
    pub fn checkpoint(&self, name: &str) -> ProjectionResult<Option<Position>> {
        let slots = self.lock();
        let slot = find(&slots, name)?;
        Ok(slot.rebuild.map_or(slot.checkpoint, |c| c.position))
    }

    /// Whether a rebuild of `name` was started and has not completed.
    pub fn rebuild_pending(&self, name: &str) -> ProjectionResult<bool> {
        Ok(find(&self.lock(), name)?.rebuild.is_some())
    }

    /// Apply one event to every projection that has not seen it.
    pub fn apply(&self, stored: &StoredEvent) -> ApplyReport {
        let mut report = ApplyReport::new(stored.event.id);
        let mut slots = self.lock();
        for slot in slots.iter_mut() {
            let name = slot.name().to_string();
            if slot.rebuild.is_some() || slot.is_done(stored) {
                report.skipped.push(name);
                continue;
            }
            match slot.apply(stored) {
                Ok(()) => report.applied.push(name),
                Err(e) => report.failed.push((name, e)),
            }
        }
        report
    }

    /// Apply everything in `source` past each projection's checkpoint.
    ///
    /// Projections with a pending rebuild are left alone. Returns the number
    /// of events read.
    pub fn catch_up(&self, source: &dyn EventSource) -> ProjectionResult<u64> {
        let start = {
            let slots = self.lock();
            let live: Vec<Option<Position>> = slots
                .iter()
                .filter(|s| s.rebuild.is_none())
                .map(|s| s.checkpoint)
                .collect();
            if live.is_empty() {
                return Ok(0);
            }
            // None sorts first, so the minimum covers never-applied slots.
            live.into_iter().min().flatten()
        };

        let mut position = start;
        let mut read = 0u64;
        loop {
            let batch = source.read_after(position, self.batch_size)?;
            let Some(last) = batch.last() else {
                break;
            };
            position = Some(last.position);
            read += batch.len() as u64;
            for stored in &batch {
                let report = self.apply(stored);
                if !report.is_clean() {
                    debug!(event = %stored.event.id, failed = report.failed.len(), "catch-up apply had failures");
                }
            }
        }
        info!(events = read, "projections caught up");
        Ok(read)
    }

    /// Reset `name` and replay the whole log into it.
    ///
    /// Checks `cancel` between batches. A cancelled rebuild keeps its
    /// position, and the next call resumes from there instead of starting
    /// over. Live events are not applied to the projection until the rebuild
    /// completes.
    pub fn rebuild(
        &self,
        name: &str,
        source: &dyn EventSource,
        cancel: &CancellationToken,
    ) -> ProjectionResult<RebuildOutcome> {
        let (mut position, resumed) = {
            let mut slots = self.lock();
            let slot = find_mut(&mut slots, name)?;
            match slot.rebuild {
                Some(cursor) => (cursor.position, true),
                None => {
                    slot.projection.reset();
                    slot.checkpoint = None;
                    slot.rebuild = Some(RebuildCursor::default());
                    (None, false)
                }
            }
        };
        info!(projection = name, resumed, from = ?position.map(|p| p.to_string()), "rebuilding projection");

        let mut outcome = RebuildOutcome {
            projection: name.to_string(),
            applied: 0,
            failed: 0,
            position,
            completed: false,
            resumed,
        };

        loop {
            if cancel.is_cancelled() {
                info!(projection = name, applied = outcome.applied, "rebuild cancelled");
                return Ok(outcome);
            }
            let batch = source.read_after(position, self.batch_size)?;
            let mut slots = self.lock();
            let slot = find_mut(&mut slots, name)?;

            // The final read happens under the engine lock so no live event
            // can slip between the rebuild finishing and live apply resuming.
            let finishing = batch.is_empty();
            let batch = if finishing {
                source.read_after(position, usize::MAX)?
            } else {
                batch
            };

            for stored in &batch {
                match slot.apply(stored) {
                    Ok(()) => outcome.applied += 1,
                    Err(_) => outcome.failed += 1,
                }
                position = Some(stored.position);
            }
            outcome.position = position;

            if finishing {
                slot.rebuild = None;
                outcome.completed = true;
                info!(projection = name, applied = outcome.applied, failed = outcome.failed, "rebuild complete");
                return Ok(outcome);
            }
            slot.rebuild = Some(RebuildCursor { position });
        }
    }

    /// Deterministic state of a projection.
    pub fn state_bytes(&self, name: &str) -> ProjectionResult<Vec<u8>> {
        let projection = self
            .get(name)
            .ok_or_else(|| ProjectionError::UnknownProjection(name.to_string()))?;
        projection.state_bytes()
    }
}

fn find<'a>(slots: &'a [Slot], name: &str) -> ProjectionResult<&'a Slot> {
    slots
        .iter()
        .find(|s| s.name() == name)
        .ok_or_else(|| ProjectionError::UnknownProjection(name.to_string()))
}

fn find_mut<'a>(slots: &'a mut [Slot], name: &str) -> ProjectionResult<&'a mut Slot> {
    slots
        .iter_mut()
        .find(|s| s.name() == name)
        .ok_or_else(|| ProjectionError::UnknownProjection(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    use chrono::{TimeZone, Utc};
    use strand_crypto::hasher;
    use strand_events::{Event, EventMetadata, EventStore, EventType, MessageUpdated};
    use strand_types::MessageId;

    /// Counts events and fails on any `MessageUpdated`.
    struct Counter {
        name: &'static str,
        seen: RwLock<Vec<EventId>>,
    }

    impl Counter {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: RwLock::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.seen.read().unwrap().len()
        }
    }

    impl Projection for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn apply(&self, stored: &StoredEvent) -> ProjectionResult<()> {
            if self.name == "picky" && stored.event.event_type == EventType::MessageUpdated {
                return Err(ProjectionError::Inapplicable {
                    event: stored.event.id,
                    reason: "no updates".into(),
                });
            }
            self.seen.write().unwrap().push(stored.event.id);
            Ok(())
        }

        fn reset(&self) {
            self.seen.write().unwrap().clear();
        }

        fn state_bytes(&self) -> ProjectionResult<Vec<u8>> {
            Ok(bincode::serialize(&*self.seen.read().unwrap())?)
        }
    }

    fn message_id() -> MessageId {
        MessageId::new(hasher::identify(
            strand_types::Namespace::Message,
            strand_types::Profile::SelfDescribing,
            b"m",
        ))
        .unwrap()
    }

    fn update(n: u32) -> Event {
        let upd = MessageUpdated {
            content: Some(format!("rev {n}")),
            tags: Default::default(),
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, n).unwrap();
        Event::message_updated(message_id(), &upd, EventMetadata::new("test"), at).unwrap()
    }

    fn store_with(n: u32) -> EventStore {
        let store = EventStore::in_memory();
        for i in 0..n {
            store.append(&[update(i)]).unwrap();
        }
        store
    }

    /// Cancels the token after the first read.
    struct CancelAfterFirstRead<'a> {
        inner: &'a EventStore,
        token: CancellationToken,
    }

    impl EventSource for CancelAfterFirstRead<'_> {
        fn read_after(
            &self,
            after: Option<Position>,
            limit: usize,
        ) -> strand_events::Result<Vec<StoredEvent>> {
            self.token.cancel();
            self.inner.read_after(after, limit)
        }
    }

    #[test]
    fn apply_skips_what_the_checkpoint_covers() {
        let engine = ProjectionEngine::new();
        let counter = Counter::new("counter");
        engine.register(counter.clone()).unwrap();
        let store = store_with(2);
        let events = store.all_after(None, 10).unwrap();

        assert_eq!(engine.apply(&events[1]).applied, vec!["counter".to_string()]);
        assert_eq!(engine.apply(&events[1]).skipped, vec!["counter".to_string()]);
        assert_eq!(engine.apply(&events[0]).skipped, vec!["counter".to_string()]);
        assert_eq!(counter.count(), 1);
        assert_eq!(engine.checkpoint("counter").unwrap(), Some(events[1].position));
    }

    #[test]
    fn failures_are_isolated() {
        let engine = ProjectionEngine::new();
        let counter = Counter::new("counter");
        engine.register(counter.clone()).unwrap();
        engine.register(Counter::new("picky")).unwrap();
        let store = store_with(1);
        let stored = store.all_after(None, 10).unwrap().remove(0);

        let report = engine.apply(&stored);
        assert_eq!(report.applied, vec!["counter".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "picky");
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let engine = ProjectionEngine::new();
        engine.register(Counter::new("counter")).unwrap();
        assert!(engine.register(Counter::new("counter")).is_err());
    }

    #[test]
    fn rebuild_matches_incremental() {
        let store = store_with(10);
        let engine = ProjectionEngine::with_batch_size(3);
        let counter = Counter::new("counter");
        engine.register(counter.clone()).unwrap();
        for stored in store.all_after(None, 100).unwrap() {
            engine.apply(&stored);
        }
        let incremental = engine.state_bytes("counter").unwrap();

        let outcome = engine
            .rebuild("counter", &store, &CancellationToken::new())
            .unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.applied, 10);
        assert_eq!(engine.state_bytes("counter").unwrap(), incremental);
    }

    #[test]
    fn cancelled_rebuild_resumes_from_its_position() {
        let store = store_with(10);
        let engine = ProjectionEngine::with_batch_size(4);
        let counter = Counter::new("counter");
        engine.register(counter.clone()).unwrap();

        let token = CancellationToken::new();
        let source = CancelAfterFirstRead {
            inner: &store,
            token: token.clone(),
        };
        let first = engine.rebuild("counter", &source, &token).unwrap();
        assert!(!first.completed);
        assert_eq!(first.applied, 4);
        assert!(engine.rebuild_pending("counter").unwrap());

        // Live events are held back while the rebuild is pending.
        let live = store.all_after(None, 1).unwrap().remove(0);
        assert_eq!(engine.apply(&live).skipped, vec!["counter".to_string()]);

        let second = engine
            .rebuild("counter", &store, &CancellationToken::new())
            .unwrap();
        assert!(second.completed);
        assert!(second.resumed);
        assert_eq!(second.applied, 6);
        assert_eq!(counter.count(), 10);
    }

    #[test]
    fn catch_up_applies_only_new_events() {
        let store = store_with(5);
        let engine = ProjectionEngine::with_batch_size(2);
        let counter = Counter::new("counter");
        engine.register(counter.clone()).unwrap();

        assert_eq!(engine.catch_up(&store).unwrap(), 5);
        store.append(&[update(50)]).unwrap();
        assert_eq!(engine.catch_up(&store).unwrap(), 1);
        assert_eq!(counter.count(), 6);
    }

    #[test]
    fn unknown_projection() {
        let engine = ProjectionEngine::new();
        let store = EventStore::in_memory();
        let err = engine
            .rebuild("nope", &store, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.class(), strand_types::ErrorClass::NotFound);
    }
}
