//! Error types for the thread graph.

use strand_store::StoreError;
use strand_types::{ErrorClass, MessageId, ThreadId};

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("node not found: {0}")]
    NodeNotFound(MessageId),

    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("duplicate node: {0}")]
    DuplicateNode(MessageId),

    #[error("content does not hash to {0}")]
    ContentMismatch(MessageId),

    /// The primary link of `node` points at a message the graph does not hold.
    #[error("node {node} links to missing parent {missing}")]
    DanglingLink { node: MessageId, missing: MessageId },

    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    #[error("verification worker panicked")]
    WorkerPanicked,
}

impl DagError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NodeNotFound(_) | Self::ThreadNotFound(_) => ErrorClass::NotFound,
            Self::DuplicateNode(_) => ErrorClass::Structural,
            Self::ContentMismatch(_) | Self::DanglingLink { .. } => ErrorClass::Integrity,
            Self::Store(e) => e.class(),
            Self::WorkerPanicked => ErrorClass::Io,
        }
    }
}

pub type DagResult<T> = Result<T, DagError>;
