use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strand_events::{EventType, MessageCreated, StoredEvent, ThreadCreated, ThreadUpdated};
use strand_types::{MessageId, Pagination, Thread, ThreadId};

use super::{encode, inapplicable, message_of, thread_of};
use crate::error::ProjectionResult;
use crate::projection::Projection;

#[derive(Debug, Default, Serialize)]
struct State {
    threads: BTreeMap<ThreadId, Thread>,
    /// Live messages per thread, ordered by creation time then id.
    entries: BTreeMap<ThreadId, BTreeSet<(DateTime<Utc>, MessageId)>>,
    locations: BTreeMap<MessageId, (ThreadId, DateTime<Utc>)>,
}

/// Per-thread ordered message lists and thread summaries.
#[derive(Debug, Default)]
pub struct ThreadIndex {
    state: RwLock<State>,
}

impl ThreadIndex {
    pub const NAME: &'static str = "thread-index";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread(&self, id: &ThreadId) -> Option<Thread> {
        self.state.read().expect("lock poisoned").threads.get(id).cloned()
    }

    /// All threads, most recently active first.
    pub fn threads(&self) -> Vec<Thread> {
        let state = self.state.read().expect("lock poisoned");
        let mut threads: Vec<Thread> = state.threads.values().cloned().collect();
        threads.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(a.id.cmp(&b.id)));
        threads
    }

    /// Message ids of a thread in chronological order.
    pub fn messages(&self, thread: &ThreadId, page: Pagination) -> Vec<MessageId> {
        let state = self.state.read().expect("lock poisoned");
        state
            .entries
            .get(thread)
            .map(|entries| page.apply(entries.iter().map(|(_, id)| *id)))
            .unwrap_or_default()
    }

    pub fn thread_of(&self, message: &MessageId) -> Option<ThreadId> {
        self.state
            .read()
            .expect("lock poisoned")
            .locations
            .get(message)
            .map(|(thread, _)| *thread)
    }
}

impl Projection for ThreadIndex {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, stored: &StoredEvent) -> ProjectionResult<()> {
        let event = &stored.event;
        let mut state = self.state.write().expect("lock poisoned");
        match event.event_type {
            EventType::ThreadCreated => {
                let ThreadCreated { thread } = event.payload_as()?;
                state.threads.entry(thread.id).or_insert(thread);
            }
            EventType::ThreadUpdated => {
                let id = thread_of(event)?;
                let update: ThreadUpdated = event.payload_as()?;
                let thread = state
                    .threads
                    .get_mut(&id)
                    .ok_or_else(|| inapplicable(event, "unknown thread"))?;
                if update.title.is_some() {
                    thread.title = update.title;
                }
                if let Some(class) = update.class {
                    thread.class = class;
                }
                thread.participants.extend(update.add_participants);
            }
            EventType::MessageCreated => {
                let MessageCreated { message } = event.payload_as()?;
                let thread_id = message.refs.thread_id;
                let thread = state
                    .threads
                    .get_mut(&thread_id)
                    .ok_or_else(|| inapplicable(event, "message for unknown thread"))?;
                thread.message_count += 1;
                thread.last_activity = thread.last_activity.max(Some(message.created_at));
                thread.participants.insert(message.author.account_id);
                state
                    .entries
                    .entry(thread_id)
                    .or_default()
                    .insert((message.created_at, message.id));
                state
                    .locations
                    .insert(message.id, (thread_id, message.created_at));
            }
            EventType::MessageDeleted => {
                let id = message_of(event)?;
                if let Some((thread_id, created_at)) = state.locations.remove(&id) {
                    if let Some(entries) = state.entries.get_mut(&thread_id) {
                        entries.remove(&(created_at, id));
                    }
                    if let Some(thread) = state.threads.get_mut(&thread_id) {
                        thread.message_count = thread.message_count.saturating_sub(1);
                    }
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
    use crate::views::fixtures::{self, at};

    #[test]
    fn orders_messages_and_summarizes_threads() {
        let s = fixtures::scenario();
        let index = ThreadIndex::new();
        for stored in fixtures::all(&s.store) {
            index.apply(&stored).unwrap();
        }

        let general = fixtures::thread_id("general");
        assert_eq!(index.messages(&general, Pagination::all()), vec![s.first, s.second]);
        assert_eq!(index.messages(&general, Pagination::new(1, 10)), vec![s.second]);

        let summary = index.thread(&general).unwrap();
        assert_eq!(summary.title.as_deref(), Some("General"));
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.last_activity, Some(at(3)));
        assert_eq!(summary.participants.len(), 2);
        assert_eq!(index.thread_of(&s.first), Some(general));
    }

    #[test]
    fn deleted_messages_leave_the_thread() {
        let s = fixtures::scenario();
        let index = ThreadIndex::new();
        for stored in fixtures::all(&s.store) {
            index.apply(&stored).unwrap();
        }
        let random = fixtures::thread_id("random");
        assert!(index.messages(&random, Pagination::all()).is_empty());
        assert_eq!(index.thread(&random).unwrap().message_count, 0);
        assert_eq!(index.thread_of(&s.third), None);
    }

    #[test]
    fn message_for_unknown_thread_is_inapplicable() {
        let index = ThreadIndex::new();
        let s = fixtures::scenario();
        let created = fixtures::all(&s.store)
            .into_iter()
            .find(|e| e.event.event_type == EventType::MessageCreated)
            .unwrap();
        assert!(index.apply(&created).is_err());
    }
}
