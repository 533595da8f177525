use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strand_events::{EventType, MessageCreated, MessageDeleted, MessageUpdated, StoredEvent};
use strand_types::{Message, MessageId};

use super::{encode, inapplicable, message_of};
use crate::error::ProjectionResult;
use crate::projection::Projection;

/// Current state of one message.
///
/// `message.content` reflects the latest edit; `message.id` always refers to
/// the originally created content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub message: Message,
    /// Number of edits applied.
    pub revision: u32,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub delete_reason: Option<String>,
}

impl MessageRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Default, Serialize)]
struct State {
    records: BTreeMap<MessageId, MessageRecord>,
}

#[derive(Debug, Default)]
pub struct MessageView {
    state: RwLock<State>,
}

impl MessageView {
    pub const NAME: &'static str = "message-view";

    pub fn new() -> Self {
        Self::default()
    }

    /// The record, deleted or not.
    pub fn record(&self, id: &MessageId) -> Option<MessageRecord> {
        self.state.read().expect("lock poisoned").records.get(id).cloned()
    }

    /// The current message, unless it was deleted.
    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.record(id).filter(|r| !r.is_deleted()).map(|r| r.message)
    }

    /// Live messages among `ids`, in the given order.
    pub fn messages(&self, ids: &[MessageId]) -> Vec<Message> {
        let state = self.state.read().expect("lock poisoned");
        ids.iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| !r.is_deleted())
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Projection for MessageView {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, stored: &StoredEvent) -> ProjectionResult<()> {
        let event = &stored.event;
        let mut state = self.state.write().expect("lock poisoned");
        match event.event_type {
            EventType::MessageCreated => {
                let MessageCreated { message } = event.payload_as()?;
                state.records.entry(message.id).or_insert(MessageRecord {
                    message,
                    revision: 0,
                    edited_at: None,
                    deleted_at: None,
                    delete_reason: None,
                });
            }
            EventType::MessageUpdated => {
                let id = message_of(event)?;
                let update: MessageUpdated = event.payload_as()?;
                let record = state
                    .records
                    .get_mut(&id)
                    .ok_or_else(|| inapplicable(event, "update for unknown message"))?;
                if let Some(content) = update.content {
                    record.message.content = content;
                }
                record.message.tags.extend(update.tags);
                record.revision += 1;
                record.edited_at = Some(event.timestamp);
            }
            EventType::MessageDeleted => {
                let id = message_of(event)?;
                let deletion: MessageDeleted = event.payload_as()?;
                let record = state
                    .records
                    .get_mut(&id)
                    .ok_or_else(|| inapplicable(event, "delete for unknown message"))?;
                record.deleted_at = Some(event.timestamp);
                record.delete_reason = deletion.reason;
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
    fn honors_edits_and_deletes() {
        let s = fixtures::scenario();
        let view = MessageView::new();
        for stored in fixtures::all(&s.store) {
            view.apply(&stored).unwrap();
        }

        let edited = view.record(&s.second).unwrap();
        assert_eq!(edited.message.content, "hi ana!");
        assert_eq!(edited.message.tags.get("edited").map(String::as_str), Some("yes"));
        assert_eq!(edited.revision, 1);
        assert_eq!(edited.edited_at, Some(at(10)));

        assert!(view.message(&s.third).is_none());
        assert_eq!(view.record(&s.third).unwrap().delete_reason.as_deref(), Some("oops"));
        assert_eq!(view.messages(&[s.first, s.third, s.second]).len(), 2);
    }
}
