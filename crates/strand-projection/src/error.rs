use strand_events::EventStoreError;
use strand_types::{ErrorClass, EventId};

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("unknown projection: {0}")]
    UnknownProjection(String),

    #[error("projection already registered: {0}")]
    DuplicateProjection(String),

    /// The event is well-formed but contradicts the projection's state.
    #[error("cannot apply {event}: {reason}")]
    Inapplicable { event: EventId, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Events(#[from] EventStoreError),
}

impl ProjectionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownProjection(_) => ErrorClass::NotFound,
            Self::Events(e) => e.class(),
            Self::DuplicateProjection(_) | Self::Inapplicable { .. } | Self::Serialization(_) => {
                ErrorClass::Structural
            }
        }
    }
}

impl From<bincode::Error> for ProjectionError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type ProjectionResult<T> = Result<T, ProjectionError>;
