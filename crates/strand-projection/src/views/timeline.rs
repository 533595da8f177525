use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strand_events::{EventType, MessageCreated, StoredEvent};
use strand_types::{MessageId, Pagination, ThreadId};

use super::{encode, message_of};
use crate::error::ProjectionResult;
use crate::projection::Projection;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TimelineEntry {
    pub created_at: DateTime<Utc>,
    pub message_id: MessageId,
    pub thread_id: ThreadId,
}

#[derive(Debug, Default, Serialize)]
struct State {
    entries: BTreeSet<TimelineEntry>,
    by_id: BTreeMap<MessageId, TimelineEntry>,
}

/// Every live message across all threads, newest first.
#[derive(Debug, Default)]
pub struct Timeline {
    state: RwLock<State>,
}

impl Timeline {
    pub const NAME: &'static str = "timeline";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, page: Pagination) -> Vec<TimelineEntry> {
        let state = self.state.read().expect("lock poisoned");
        page.apply(state.entries.iter().rev().cloned())
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Projection for Timeline {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, stored: &StoredEvent) -> ProjectionResult<()> {
        let event = &stored.event;
        let mut state = self.state.write().expect("lock poisoned");
        match event.event_type {
            EventType::MessageCreated => {
                let MessageCreated { message } = event.payload_as()?;
                let entry = TimelineEntry {
                    created_at: message.created_at,
                    message_id: message.id,
                    thread_id: message.refs.thread_id,
                };
                if !state.by_id.contains_key(&entry.message_id) {
                    state.entries.insert(entry.clone());
                    state.by_id.insert(entry.message_id, entry);
                }
            }
            EventType::MessageDeleted => {
                let id = message_of(event)?;
                if let Some(entry) = state.by_id.remove(&id) {
                    state.entries.remove(&entry);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&self) {
        *self.state.write().expect("lock poisoned") = State::default();
    }

    fn state_bytes(&self) -> ProjectionResult<Vec<u8>> {
        encode(&*self.state.read().expect("lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::fixtures;

    #[test]
    fn newest_first_without_deleted() {
        let s = fixtures::scenario();
        let timeline = Timeline::new();
        for stored in fixtures::all(&s.store) {
            timeline.apply(&stored).unwrap();
        }
        let ids: Vec<_> = timeline
            .page(Pagination::all())
            .into_iter()
            .map(|e| e.message_id)
            .collect();
        assert_eq!(ids, vec![s.second, s.first]);
        assert_eq!(timeline.page(Pagination::new(0, 1)).len(), 1);
    }
}
