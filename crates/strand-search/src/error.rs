use strand_types::ErrorClass;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The embedding backend could not produce a vector.
    #[error("embedding backend unavailable: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("background indexer has shut down")]
    IndexerClosed,
}

impl SearchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidQuery(_) | Self::DimensionMismatch { .. } => ErrorClass::Structural,
            Self::Embedding(_) => ErrorClass::DegradedService,
            Self::IndexerClosed => ErrorClass::Concurrency,
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
