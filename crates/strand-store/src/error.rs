use strand_types::{ErrorClass, Identifier};

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(Identifier),

    /// Different bytes were offered under an identifier that is already
    /// stored.
    #[error("conflicting content for {0}: stored bytes differ")]
    Conflict(Identifier),

    /// A mirror document could not be parsed.
    #[error("malformed mirror document: {0}")]
    InvalidMirror(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Conflict(_) => ErrorClass::Integrity,
            Self::InvalidMirror(_) => ErrorClass::Structural,
            Self::Io(_) => ErrorClass::Io,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
