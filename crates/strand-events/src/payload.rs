//! Typed event payloads and event constructors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_types::{Account, AccountId, Did, Message, MessageId, PlatformBinding, Thread, ThreadClass, ThreadId};

use crate::error::Result;
use crate::event::{AggregateKind, AggregateRef, Event, EventMetadata, EventType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message: Message,
}

/// Correction to a message. Absent fields are unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdated {
    pub content: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub account: Account,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdated {
    pub display_name: Option<String>,
    pub did: Option<Did>,
    #[serde(default)]
    pub add_bindings: Vec<PlatformBinding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCreated {
    pub thread: Thread,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadUpdated {
    pub title: Option<String>,
    pub class: Option<ThreadClass>,
    #[serde(default)]
    pub add_participants: Vec<AccountId>,
}

impl Event {
    /// `MessageCreated`, timestamped at the message's ingestion time.
    pub fn message_created(message: &Message, metadata: EventMetadata) -> Result<Self> {
        Self::new(
            EventType::MessageCreated,
            AggregateRef::new(message.id, AggregateKind::Message),
            &MessageCreated {
                message: message.clone(),
            },
            metadata,
            message.ingested_at,
        )
    }

    pub fn message_updated(
        id: MessageId,
        update: &MessageUpdated,
        metadata: EventMetadata,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            EventType::MessageUpdated,
            AggregateRef::new(id, AggregateKind::Message),
            update,
            metadata,
            at,
        )
    }

    pub fn message_deleted(
        id: MessageId,
        deletion: &MessageDeleted,
        metadata: EventMetadata,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            EventType::MessageDeleted,
            AggregateRef::new(id, AggregateKind::Message),
            deletion,
            metadata,
            at,
        )
    }

    pub fn account_created(account: &Account, metadata: EventMetadata) -> Result<Self> {
        Self::new(
            EventType::AccountCreated,
            AggregateRef::new(account.id, AggregateKind::Account),
            &AccountCreated {
                account: account.clone(),
            },
            metadata,
            account.created_at,
        )
    }

    pub fn account_updated(
        id: AccountId,
        update: &AccountUpdated,
        metadata: EventMetadata,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            EventType::AccountUpdated,
            AggregateRef::new(id, AggregateKind::Account),
            update,
            metadata,
            at,
        )
    }

    pub fn thread_created(thread: &Thread, metadata: EventMetadata, at: DateTime<Utc>) -> Result<Self> {
        Self::new(
            EventType::ThreadCreated,
            AggregateRef::new(thread.id, AggregateKind::Thread),
            &ThreadCreated {
                thread: thread.clone(),
            },
            metadata,
            at,
        )
    }

    pub fn thread_updated(
        id: ThreadId,
        update: &ThreadUpdated,
        metadata: EventMetadata,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            EventType::ThreadUpdated,
            AggregateRef::new(id, AggregateKind::Thread),
            update,
            metadata,
            at,
        )
    }
}
