//! Aggregate rehydration: latest snapshot plus the tail of the stream.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strand_types::{Account, Identifier, Message, Thread};
use tracing::{debug, warn};

use crate::error::{EventStoreError, Result};
use crate::event::{AggregateKind, Event, EventType};
use crate::payload::{
    AccountCreated, AccountUpdated, MessageCreated, MessageDeleted, MessageUpdated, ThreadCreated,
    ThreadUpdated,
};
use crate::snapshot::{Snapshot, SnapshotPolicy, SnapshotStore};
use crate::store::EventStore;

/// State folded from one aggregate's event stream.
pub trait Aggregate: Default + Serialize + DeserializeOwned {
    const KIND: AggregateKind;

    fn apply(&mut self, event: &Event) -> Result<()>;
}

fn reject(event: &Event, reason: &str) -> EventStoreError {
    EventStoreError::InvalidEvent {
        event: event.id.to_string(),
        aggregate: event.aggregate.id.to_string(),
        reason: reason.to_string(),
    }
}

/// One content revision of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub content: String,
    #[serde(with = "strand_types::time::rfc3339_millis")]
    pub edited_at: DateTime<Utc>,
}

/// A message as created, plus later revisions and deletion.
///
/// `message` is never modified: its identifier stays verifiable against the
/// original content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAggregate {
    pub message: Option<Message>,
    pub revisions: Vec<Revision>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub delete_reason: Option<String>,
}

impl MessageAggregate {
    /// Content after all revisions.
    pub fn current_content(&self) -> Option<&str> {
        self.revisions
            .last()
            .map(|r| r.content.as_str())
            .or(self.message.as_ref().map(|m| m.content.as_str()))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The message with its latest revision applied.
    pub fn current(&self) -> Option<Message> {
        let mut message = self.message.clone()?;
        if let Some(latest) = self.revisions.last() {
            message.content = latest.content.clone();
        }
        Some(message)
    }
}

impl Aggregate for MessageAggregate {
    const KIND: AggregateKind = AggregateKind::Message;

    fn apply(&mut self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::MessageCreated => {
                if self.message.is_some() {
                    return Err(reject(event, "message already created"));
                }
                self.message = Some(event.payload_as::<MessageCreated>()?.message);
            }
            EventType::MessageUpdated => {
                let message = self
                    .message
                    .as_mut()
                    .ok_or_else(|| reject(event, "update before create"))?;
                let update: MessageUpdated = event.payload_as()?;
                message.tags.extend(update.tags);
                if let Some(content) = update.content {
                    self.revisions.push(Revision {
                        content,
                        edited_at: event.timestamp,
                    });
                }
            }
            EventType::MessageDeleted => {
                if self.message.is_none() {
                    return Err(reject(event, "delete before create"));
                }
                let deletion: MessageDeleted = event.payload_as()?;
                self.deleted_at = Some(event.timestamp);
                self.delete_reason = deletion.reason;
            }
            _ => return Err(reject(event, "not a message event")),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAggregate {
    pub account: Option<Account>,
}

impl Aggregate for AccountAggregate {
    const KIND: AggregateKind = AggregateKind::Account;

    fn apply(&mut self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::AccountCreated => {
                if self.account.is_some() {
                    return Err(reject(event, "account already created"));
                }
                self.account = Some(event.payload_as::<AccountCreated>()?.account);
            }
            EventType::AccountUpdated => {
                let account = self
                    .account
                    .as_mut()
                    .ok_or_else(|| reject(event, "update before create"))?;
                let update: AccountUpdated = event.payload_as()?;
                if let Some(name) = update.display_name {
                    account.display_name = name;
                }
                if update.did.is_some() {
                    account.did = update.did;
                }
                account.bindings.extend(update.add_bindings);
            }
            _ => return Err(reject(event, "not an account event")),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadAggregate {
    pub thread: Option<Thread>,
}

impl Aggregate for ThreadAggregate {
    const KIND: AggregateKind = AggregateKind::Thread;

    fn apply(&mut self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::ThreadCreated => {
                if self.thread.is_some() {
                    return Err(reject(event, "thread already created"));
                }
                self.thread = Some(event.payload_as::<ThreadCreated>()?.thread);
            }
            EventType::ThreadUpdated => {
                let thread = self
                    .thread
                    .as_mut()
                    .ok_or_else(|| reject(event, "update before create"))?;
                let update: ThreadUpdated = event.payload_as()?;
                if update.title.is_some() {
                    thread.title = update.title;
                }
                if let Some(class) = update.class {
                    thread.class = class;
                }
                thread.participants.extend(update.add_participants);
            }
            _ => return Err(reject(event, "not a thread event")),
        }
        Ok(())
    }
}

/// Aggregate state and the stream version it reflects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loaded<A> {
    pub state: A,
    pub version: u64,
}

/// Loads aggregates from snapshots and the event log.
pub struct AggregateRepository<'a> {
    events: &'a EventStore,
    snapshots: &'a SnapshotStore,
    policy: SnapshotPolicy,
}

impl<'a> AggregateRepository<'a> {
    pub fn new(events: &'a EventStore, snapshots: &'a SnapshotStore, policy: SnapshotPolicy) -> Self {
        Self {
            events,
            snapshots,
            policy,
        }
    }

    /// Rehydrate an aggregate: latest usable snapshot, then every later event.
    pub fn load<A: Aggregate>(&self, id: &Identifier) -> Result<Loaded<A>> {
        let head = self.events.version_of(id);
        let (mut state, mut version) = match self.snapshots.load(id)? {
            Some(snap) if snap.kind == A::KIND && snap.version <= head => {
                match serde_json::from_value::<A>(snap.state) {
                    Ok(state) => (state, snap.version),
                    Err(e) => {
                        warn!(aggregate = %id, error = %e, "snapshot state does not decode; replaying");
                        (A::default(), 0)
                    }
                }
            }
            Some(snap) => {
                warn!(aggregate = %id, version = snap.version, head, "ignoring stale or mismatched snapshot");
                (A::default(), 0)
            }
            None => (A::default(), 0),
        };

        for stored in self.events.stream_from(id, version)? {
            state.apply(&stored.event)?;
            version = stored.version;
        }
        if version == 0 {
            return Err(EventStoreError::AggregateNotFound(id.to_string()));
        }
        Ok(Loaded { state, version })
    }

    /// Rehydrate from the log alone, ignoring snapshots.
    pub fn replay<A: Aggregate>(&self, id: &Identifier) -> Result<Loaded<A>> {
        let mut state = A::default();
        let mut version = 0;
        for stored in self.events.stream_for(id)? {
            state.apply(&stored.event)?;
            version = stored.version;
        }
        if version == 0 {
            return Err(EventStoreError::AggregateNotFound(id.to_string()));
        }
        Ok(Loaded { state, version })
    }

    /// Load and store a snapshot of the current state.
    pub fn snapshot<A: Aggregate>(&self, id: &Identifier) -> Result<Snapshot> {
        let loaded = self.load::<A>(id)?;
        let snapshot = Snapshot {
            aggregate_id: *id,
            kind: A::KIND,
            version: loaded.version,
            state: serde_json::to_value(&loaded.state)
                .map_err(|e| EventStoreError::Serialization(e.to_string()))?,
            taken_at: strand_types::time::now(),
        };
        self.snapshots.save(&snapshot)?;
        Ok(snapshot)
    }

    /// Snapshot if the policy asks for one at the aggregate's current
    /// version. Returns the snapshot taken, if any.
    pub fn maybe_snapshot<A: Aggregate>(&self, id: &Identifier) -> Result<Option<Snapshot>> {
        let version = self.events.version_of(id);
        if !self.policy.should_snapshot(version) {
            return Ok(None);
        }
        debug!(aggregate = %id, version, "snapshot policy triggered");
        self.snapshot::<A>(id).map(Some)
    }
}
