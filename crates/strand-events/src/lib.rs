//! Event log for Strand.
//!
//! The event store is the only owner of durable history. Events are appended
//! in atomic batches to time-partitioned segment files, one framed JSON
//! record per line:
//!
//! ```text
//! <crc32 hex> <index>/<batch size> <event json>\n
//! ```
//!
//! A half-written final record or batch is detected and discarded on reopen;
//! a damaged record followed by intact ones is treated as corruption and the
//! store refuses to open.
//!
//! Snapshots are disposable checkpoints of aggregate state. Deleting every
//! snapshot and replaying from the first event reproduces the same state.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod framing;
pub mod payload;
pub mod position;
pub mod segment;
pub mod snapshot;
pub mod store;

pub use aggregate::{
    AccountAggregate, Aggregate, AggregateRepository, Loaded, MessageAggregate, Revision,
    ThreadAggregate,
};
pub use config::{EventStoreConfig, SyncMode};
pub use error::{EventStoreError, Result};
pub use event::{AggregateKind, AggregateRef, Event, EventMetadata, EventType, SCHEMA_VERSION};
pub use payload::{
    AccountCreated, AccountUpdated, MessageCreated, MessageDeleted, MessageUpdated, ThreadCreated,
    ThreadUpdated,
};
pub use position::Position;
pub use snapshot::{Snapshot, SnapshotPolicy, SnapshotStore};
pub use store::{EventSource, EventStore, StoredEvent};
