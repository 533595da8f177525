use std::path::PathBuf;

use strand_crypto::CryptoError;
use strand_types::ErrorClass;

/// Errors produced by the event store and snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record is damaged and intact records follow it.
    #[error("corrupt event log {path} at offset {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Another writer holds the log lock.
    #[error("event log is locked by another writer ({attempts} attempts): {path}")]
    Locked { path: PathBuf, attempts: u32 },

    #[error("unsupported schema version {found} (supported up to {supported})")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("invalid position token: {0:?}")]
    InvalidPosition(String),

    #[error("no events for aggregate {0}")]
    AggregateNotFound(String),

    #[error("event {event} does not apply to {aggregate}: {reason}")]
    InvalidEvent {
        event: String,
        aggregate: String,
        reason: String,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl EventStoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) => ErrorClass::Io,
            Self::Corrupt { .. } => ErrorClass::Integrity,
            Self::Locked { .. } => ErrorClass::Concurrency,
            Self::AggregateNotFound(_) => ErrorClass::NotFound,
            Self::Crypto(e) => e.class(),
            Self::Serialization(_)
            | Self::SchemaVersion { .. }
            | Self::InvalidPosition(_)
            | Self::InvalidEvent { .. } => ErrorClass::Structural,
        }
    }
}

/// Convenience alias used throughout the event crate.
pub type Result<T> = std::result::Result<T, EventStoreError>;
