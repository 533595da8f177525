use strand_types::{DidError, ErrorClass, IdentifierError};

/// Errors from hashing, identity and signature operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("canonical serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Did(#[from] DidError),

    #[error("invalid public key")]
    InvalidKey,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("identifier mismatch: stored {stored}, recomputed {recomputed}")]
    IdMismatch { stored: String, recomputed: String },
}

impl CryptoError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Identifier(e) => e.class(),
            Self::InvalidSignature | Self::IdMismatch { .. } => ErrorClass::Integrity,
            _ => ErrorClass::Structural,
        }
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
