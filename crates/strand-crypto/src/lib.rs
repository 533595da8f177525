//! Cryptographic primitives for Strand.
//!
//! Provides the single canonical serialization used for both hashing and
//! signing, domain-separated BLAKE3 identifier derivation, Ed25519 keys
//! addressed as `did:key` identities, and signed message envelopes.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod canonical;
pub mod envelope;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod signer;

pub use envelope::{SignedEnvelope, ALGORITHM};
pub use error::{CryptoError, Result};
pub use hasher::{identify, verify, verify_strict, ContentHasher};
pub use signer::{Signature, SigningKey, VerifyingKey};
