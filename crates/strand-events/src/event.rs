use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strand_crypto::{ContentHasher, CryptoError};
use strand_types::{time, EventId, Identifier, Namespace};
use uuid::Uuid;

use crate::error::{EventStoreError, Result};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Kind of aggregate an event stream belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Message,
    Account,
    Thread,
}

impl AggregateKind {
    /// Identifier namespace of aggregates of this kind.
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Message => Namespace::Message,
            Self::Account => Namespace::Account,
            Self::Thread => Namespace::Thread,
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::Account => f.write_str("account"),
            Self::Thread => f.write_str("thread"),
        }
    }
}

/// Event type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
    AccountCreated,
    AccountUpdated,
    ThreadCreated,
    ThreadUpdated,
}

impl EventType {
    pub fn aggregate_kind(&self) -> AggregateKind {
        match self {
            Self::MessageCreated | Self::MessageUpdated | Self::MessageDeleted => {
                AggregateKind::Message
            }
            Self::AccountCreated | Self::AccountUpdated => AggregateKind::Account,
            Self::ThreadCreated | Self::ThreadUpdated => AggregateKind::Thread,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reference to the aggregate an event applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    pub id: Identifier,
    pub kind: AggregateKind,
}

impl AggregateRef {
    pub fn new(id: impl Into<Identifier>, kind: AggregateKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Causation and correlation metadata.
///
/// Across aggregates only causal order is meaningful; `causation_id` names
/// the event that led to this one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub source: String,
    pub causation_id: Option<EventId>,
    pub correlation_id: Option<Uuid>,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            causation_id: None,
            correlation_id: None,
        }
    }

    /// Metadata for a fresh command, with a new time-ordered correlation id.
    pub fn command(source: impl Into<String>) -> Self {
        Self::new(source).correlated(Uuid::now_v7())
    }

    pub fn caused_by(mut self, event: EventId) -> Self {
        self.causation_id = Some(event);
        self
    }

    pub fn correlated(mut self, correlation: Uuid) -> Self {
        self.correlation_id = Some(correlation);
        self
    }
}

/// An immutable fact in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    #[serde(with = "strand_types::time::rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    pub aggregate: AggregateRef,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
}

/// Every event field except the id; its canonical bytes derive the id.
#[derive(Serialize)]
struct EventBody<'a> {
    event_type: EventType,
    #[serde(with = "strand_types::time::rfc3339_millis")]
    timestamp: DateTime<Utc>,
    schema_version: u32,
    aggregate: &'a AggregateRef,
    payload: &'a serde_json::Value,
    metadata: &'a EventMetadata,
}

impl Event {
    /// Build an event and derive its identifier.
    pub fn new<P: Serialize>(
        event_type: EventType,
        aggregate: AggregateRef,
        payload: &P,
        metadata: EventMetadata,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if event_type.aggregate_kind() != aggregate.kind
            || aggregate.id.namespace() != aggregate.kind.namespace()
        {
            return Err(EventStoreError::InvalidEvent {
                event: event_type.to_string(),
                aggregate: aggregate.id.to_string(),
                reason: format!("expected a {} aggregate", event_type.aggregate_kind()),
            });
        }
        let payload = serde_json::to_value(payload)
            .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
        let timestamp = time::normalize(timestamp);
        let id = Self::derive_id(
            event_type,
            timestamp,
            SCHEMA_VERSION,
            &aggregate,
            &payload,
            &metadata,
        )?;
        Ok(Self {
            id,
            event_type,
            timestamp,
            schema_version: SCHEMA_VERSION,
            aggregate,
            payload,
            metadata,
        })
    }

    fn derive_id(
        event_type: EventType,
        timestamp: DateTime<Utc>,
        schema_version: u32,
        aggregate: &AggregateRef,
        payload: &serde_json::Value,
        metadata: &EventMetadata,
    ) -> Result<EventId> {
        let id = ContentHasher::EVENT.hash_canonical(&EventBody {
            event_type,
            timestamp,
            schema_version,
            aggregate,
            payload,
            metadata,
        })?;
        Ok(EventId::new(id).map_err(CryptoError::from)?)
    }

    /// Recompute the identifier from the other fields and compare.
    pub fn verify_id(&self) -> Result<()> {
        let recomputed = Self::derive_id(
            self.event_type,
            self.timestamp,
            self.schema_version,
            &self.aggregate,
            &self.payload,
            &self.metadata,
        )?;
        if recomputed != self.id {
            return Err(CryptoError::IdMismatch {
                stored: self.id.to_string(),
                recomputed: recomputed.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Decode the payload into its typed form.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| EventStoreError::InvalidEvent {
            event: self.id.to_string(),
            aggregate: self.aggregate.id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Canonical bytes of the whole event, including its id.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(strand_crypto::canonical::to_bytes(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use strand_crypto::hasher;

    fn thread_ref() -> AggregateRef {
        AggregateRef::new(
            hasher::thread_id("slack", "C1").unwrap(),
            AggregateKind::Thread,
        )
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn id_is_content_derived() {
        let meta = EventMetadata::new("test");
        let a = Event::new(EventType::ThreadUpdated, thread_ref(), &json!({"title": "x"}), meta.clone(), ts()).unwrap();
        let b = Event::new(EventType::ThreadUpdated, thread_ref(), &json!({"title": "x"}), meta.clone(), ts()).unwrap();
        let c = Event::new(EventType::ThreadUpdated, thread_ref(), &json!({"title": "y"}), meta, ts()).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.id.to_string().starts_with("evt_z"));
    }

    #[test]
    fn verify_id_detects_mutation() {
        let mut event = Event::new(
            EventType::ThreadUpdated,
            thread_ref(),
            &json!({"title": "x"}),
            EventMetadata::new("test"),
            ts(),
        )
        .unwrap();
        assert!(event.verify_id().is_ok());
        event.payload = json!({"title": "forged"});
        let err = event.verify_id().unwrap_err();
        assert_eq!(err.class(), strand_types::ErrorClass::Integrity);
    }

    #[test]
    fn event_type_must_match_aggregate() {
        let err = Event::new(
            EventType::MessageCreated,
            thread_ref(),
            &json!({}),
            EventMetadata::new("test"),
            ts(),
        )
        .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidEvent { .. }));
    }

    #[test]
    fn record_shape_is_stable() {
        let event = Event::new(
            EventType::ThreadUpdated,
            thread_ref(),
            &json!({"title": "x"}),
            EventMetadata::new("test").correlated(Uuid::nil()),
            ts(),
        )
        .unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "ThreadUpdated");
        assert_eq!(value["timestamp"], "2024-02-02T10:00:00.000Z");
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["aggregate"]["kind"], "thread");
        assert_eq!(value["metadata"]["source"], "test");
        assert!(value["metadata"]["causation_id"].is_null());
    }

    #[test]
    fn command_metadata_gets_correlation_id() {
        let meta = EventMetadata::command("cli");
        assert_eq!(meta.correlation_id.unwrap().get_version_num(), 7);
    }
}
