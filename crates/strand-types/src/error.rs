use thiserror::Error;

use crate::id::Namespace;

/// Coarse classification shared by every Strand error type.
///
/// Callers decide retry and alerting behaviour from the class alone:
/// structural errors need corrected input, integrity errors imply tampering
/// or corruption and are never retried, concurrency errors may be retried
/// with backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Structural,
    Integrity,
    NotFound,
    Concurrency,
    DegradedService,
    Io,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Structural => "structural",
            Self::Integrity => "integrity",
            Self::NotFound => "not-found",
            Self::Concurrency => "concurrency",
            Self::DegradedService => "degraded-service",
            Self::Io => "io",
        };
        write!(f, "{s}")
    }
}

/// Errors produced while parsing or checking identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier has no namespace separator")]
    MissingSeparator,

    #[error("unknown identifier namespace: {0:?}")]
    UnknownNamespace(String),

    #[error("identifier payload is empty")]
    EmptyPayload,

    #[error("unsupported multibase prefix: {0:?}")]
    UnsupportedMultibase(char),

    #[error("invalid multibase payload: {0}")]
    InvalidEncoding(String),

    #[error("invalid digest length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("truncated varint in identifier header")]
    TruncatedVarint,

    #[error("unsupported identifier version {0}")]
    UnsupportedVersion(u64),

    #[error("unsupported content codec {0:#x}")]
    UnsupportedCodec(u64),

    #[error("unsupported hash function {0:#x}")]
    UnsupportedHash(u64),

    #[error("namespace mismatch: expected {expected}, got {actual}")]
    NamespaceMismatch {
        expected: Namespace,
        actual: Namespace,
    },

    #[error("content does not hash to {0}")]
    ContentMismatch(String),
}

impl IdentifierError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ContentMismatch(_) => ErrorClass::Integrity,
            _ => ErrorClass::Structural,
        }
    }

    /// Returns `true` for malformed-input errors, as opposed to a content mismatch.
    pub fn is_structural(&self) -> bool {
        self.class() == ErrorClass::Structural
    }
}

/// Errors produced while parsing `did:key` identity strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DidError {
    #[error("identity string does not start with \"did:\"")]
    MissingScheme,

    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),

    #[error("did:key must use base58btc multibase ('z'), got {0:?}")]
    UnsupportedMultibase(Option<char>),

    #[error("invalid did:key encoding: {0}")]
    InvalidEncoding(String),

    #[error("unsupported multicodec key type {0:#x}")]
    UnsupportedKeyType(u64),

    #[error("invalid public key length: expected 32, got {0}")]
    InvalidKeyLength(usize),
}

impl DidError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Structural
    }
}

/// Errors produced while interpreting data-model fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unrecognized message kind: {0:?}")]
    UnknownKind(String),

    #[error("unrecognized thread class: {0:?}")]
    UnknownThreadClass(String),
}

impl ModelError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Structural
    }
}
