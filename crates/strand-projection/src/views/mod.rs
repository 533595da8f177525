//! Built-in views.

mod account_index;
mod message_view;
mod thread_index;
mod timeline;

pub use account_index::AccountIndex;
pub use message_view::{MessageRecord, MessageView};
pub use thread_index::ThreadIndex;
pub use timeline::{Timeline, TimelineEntry};

use serde::Serialize;
use strand_events::Event;
use strand_types::{AccountId, MessageId, ThreadId};

use crate::error::{ProjectionError, ProjectionResult};

fn encode<T: Serialize>(state: &T) -> ProjectionResult<Vec<u8>> {
    Ok(bincode::serialize(state)?)
}

fn inapplicable(event: &Event, reason: impl Into<String>) -> ProjectionError {
    ProjectionError::Inapplicable {
        event: event.id,
        reason: reason.into(),
    }
}

fn message_of(event: &Event) -> ProjectionResult<MessageId> {
    MessageId::new(event.aggregate.id).map_err(|e| inapplicable(event, e.to_string()))
}

fn thread_of(event: &Event) -> ProjectionResult<ThreadId> {
    ThreadId::new(event.aggregate.id).map_err(|e| inapplicable(event, e.to_string()))
}

fn account_of(event: &Event) -> ProjectionResult<AccountId> {
    AccountId::new(event.aggregate.id).map_err(|e| inapplicable(event, e.to_string()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{DateTime, TimeZone, Utc};
    use strand_crypto::hasher;
    use strand_events::{
        AccountUpdated, Event, EventMetadata, EventStore, MessageDeleted, MessageUpdated,
        StoredEvent, ThreadUpdated,
    };
    use strand_types::{
        Account, AccountId, AccountStats, Author, Message, MessageId, MessageIdentity,
        MessageKind, PlatformBinding, References, Source, Thread, ThreadClass, ThreadId,
    };

    pub fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap()
    }

    pub fn binding(handle: &str) -> PlatformBinding {
        PlatformBinding::new("chat", handle)
    }

    pub fn account_id(handle: &str) -> AccountId {
        hasher::account_id(&binding(handle)).unwrap()
    }

    pub fn thread_id(name: &str) -> ThreadId {
        hasher::thread_id("chat", name).unwrap()
    }

    pub fn account(handle: &str) -> Account {
        Account {
            id: account_id(handle),
            did: None,
            display_name: handle.to_uppercase(),
            bindings: BTreeSet::from([binding(handle)]),
            created_at: at(0),
            stats: AccountStats::default(),
        }
    }

    pub fn thread(name: &str) -> Thread {
        Thread {
            id: thread_id(name),
            title: None,
            participants: BTreeSet::new(),
            class: ThreadClass::Group,
            platform: "chat".into(),
            native_id: name.into(),
            message_count: 0,
            last_activity: None,
        }
    }

    pub fn message(handle: &str, thread: &str, text: &str, minute: u32) -> Message {
        let identity = MessageIdentity {
            account_id: account_id(handle),
            content: text.into(),
            created_at: at(minute),
            kind: MessageKind::Text,
        };
        Message {
            id: hasher::message_id(&identity).unwrap(),
            kind: MessageKind::Text,
            content: identity.content,
            author: Author {
                account_id: identity.account_id,
                did: None,
            },
            created_at: identity.created_at,
            ingested_at: at(minute + 1),
            refs: References {
                thread_id: thread_id(thread),
                reply_to: None,
                room_id: None,
                mentions: vec![],
            },
            source: Source::new("chat"),
            tags: BTreeMap::new(),
        }
    }

    pub struct Scenario {
        pub store: EventStore,
        pub first: MessageId,
        pub second: MessageId,
        pub third: MessageId,
    }

    /// Two accounts, two threads, three messages, one edit, one deletion.
    pub fn scenario() -> Scenario {
        let store = EventStore::in_memory();
        let meta = EventMetadata::new("fixture");
        let m1 = message("ana", "general", "hello there", 1);
        let m2 = message("bo", "general", "hi ana", 3);
        let m3 = message("ana", "random", "lunch?", 5);

        let events = vec![
            Event::account_created(&account("ana"), meta.clone()).unwrap(),
            Event::account_created(&account("bo"), meta.clone()).unwrap(),
            Event::thread_created(&thread("general"), meta.clone(), at(1)).unwrap(),
            Event::message_created(&m1, meta.clone()).unwrap(),
            Event::message_created(&m2, meta.clone()).unwrap(),
            Event::thread_created(&thread("random"), meta.clone(), at(5)).unwrap(),
            Event::message_created(&m3, meta.clone()).unwrap(),
            Event::message_updated(
                m2.id,
                &MessageUpdated {
                    content: Some("hi ana!".into()),
                    tags: BTreeMap::from([("edited".to_string(), "yes".to_string())]),
                },
                meta.clone(),
                at(10),
            )
            .unwrap(),
            Event::thread_updated(
                thread_id("general"),
                &ThreadUpdated {
                    title: Some("General".into()),
                    class: None,
                    add_participants: vec![],
                },
                meta.clone(),
                at(11),
            )
            .unwrap(),
            Event::account_updated(
                account_id("bo"),
                &AccountUpdated {
                    display_name: Some("Bo B.".into()),
                    did: None,
                    add_bindings: vec![PlatformBinding::new("email", "bo@example.com")],
                },
                meta.clone(),
                at(12),
            )
            .unwrap(),
            Event::message_deleted(
                m3.id,
                &MessageDeleted {
                    reason: Some("oops".into()),
                },
                meta,
                at(13),
            )
            .unwrap(),
        ];
        for event in events {
            store.append(&[event]).unwrap();
        }
        Scenario {
            store,
            first: m1.id,
            second: m2.id,
            third: m3.id,
        }
    }

    pub fn all(store: &EventStore) -> Vec<StoredEvent> {
        store.all_after(None, usize::MAX).unwrap()
    }
}
