//! Foundation types for Strand.
//!
//! This crate provides the identifier, identity and data-model types shared by
//! every other Strand crate. It performs no hashing and no I/O: identifiers
//! are produced by `strand-crypto` and persisted by the storage crates.
//!
//! # Key Types
//!
//! - [`Identifier`]: namespaced, content-derived identifier with a compact
//!   and a self-describing binary profile and a multibase text form
//! - [`MessageId`], [`EventId`], [`AccountId`], [`ThreadId`], [`BlobId`]:
//!   namespace-checked wrappers around [`Identifier`]
//! - [`Did`]: `did:key` self-certifying identity string
//! - [`Message`], [`Account`], [`Thread`]: the stored data model
//! - [`MessageInput`], [`AccountInput`]: normalized adapter inputs
//! - [`ErrorClass`]: the error taxonomy every crate error maps onto

pub mod account;
pub mod did;
pub mod error;
pub mod id;
pub mod message;
pub mod multibase;
pub mod thread;
pub mod time;
pub mod varint;

pub use account::{Account, AccountInput, AccountStats, PlatformBinding};
pub use did::Did;
pub use error::{DidError, ErrorClass, IdentifierError, ModelError};
pub use id::{AccountId, BlobId, Codec, EventId, Identifier, MessageId, Namespace, Profile, ThreadId};
pub use message::{
    Author, Message, MessageIdentity, MessageInput, MessageKind, References, Source, ThreadHint,
};
pub use multibase::Multibase;
pub use thread::{Pagination, Thread, ThreadClass};
