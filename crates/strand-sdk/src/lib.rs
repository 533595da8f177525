//! Store facade for Strand.
//!
//! [`Strand`] is the main entry point for applications embedding the store.
//! It owns the event log, the content store, the thread graph, the built-in
//! projections and the search index, and keeps them consistent: every write
//! goes through the log first and the derived state is fed from what was
//! appended.
//!
//! Platform adapters describe their input as a [`SourceRecord`] (or any type
//! implementing [`ToMessageInput`]) and never touch the stores directly.

pub mod adapter;
pub mod config;
pub mod error;
pub mod strand;

pub use adapter::{ApiRecord, ChatRecord, EmailRecord, SourceRecord, ToMessageInput};
pub use config::{IngestConfig, SearchConfig, StrandConfig};
pub use error::{SdkError, SdkResult};
pub use strand::{MessageHit, SearchResults, StoreStats, Strand};

// Re-export key types
pub use strand_crypto::{SignedEnvelope, SigningKey};
pub use strand_dag::{IntegrityIssue, IntegrityReport, ThreadProof};
pub use strand_events::{AggregateKind, AggregateRef, Loaded, MessageAggregate, Snapshot};
pub use strand_projection::{CancellationToken, RebuildOutcome};
pub use strand_search::{SearchFilter, SearchMode, SearchOptions};
pub use strand_types::{
    Account, AccountId, AccountInput, ErrorClass, Message, MessageId, MessageInput, MessageKind,
    Pagination, PlatformBinding, Thread, ThreadHint, ThreadId,
};
