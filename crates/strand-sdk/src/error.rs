use strand_crypto::CryptoError;
use strand_dag::DagError;
use strand_events::EventStoreError;
use strand_projection::ProjectionError;
use strand_search::SearchError;
use strand_store::StoreError;
use strand_types::{ErrorClass, IdentifierError, ModelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("binding {binding} already belongs to account {account}")]
    BindingClaimed { binding: String, account: String },

    #[error("envelope signer {signer} is not the message author {author}")]
    SignerMismatch { signer: String, author: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event log error: {0}")]
    Events(#[from] EventStoreError),

    #[error("thread graph error: {0}")]
    Dag(#[from] DagError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),
}

impl SdkError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) | Self::BindingClaimed { .. } | Self::Config(_) => {
                ErrorClass::Structural
            }
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::SignerMismatch { .. } => ErrorClass::Integrity,
            Self::Model(e) => e.class(),
            Self::Identifier(e) => e.class(),
            Self::Crypto(e) => e.class(),
            Self::Store(e) => e.class(),
            Self::Events(e) => e.class(),
            Self::Dag(e) => e.class(),
            Self::Projection(e) => e.class(),
            Self::Search(e) => e.class(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
