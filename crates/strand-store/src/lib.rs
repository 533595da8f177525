//! Content-addressed object storage for Strand.
//!
//! Every message body is stored as an immutable object keyed by its
//! identifier. The store never interprets object contents; integrity is
//! checked by callers that know how an identifier was derived.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsContentStore`] -- sharded on-disk store, `objects/<2 hex>/<62 hex>`
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written.
//! 2. Writing identical bytes under an existing id is a no-op.
//! 3. Writing different bytes under an existing id is an integrity error,
//!    never an overwrite.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod mirror;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsContentStore;
pub use memory::InMemoryContentStore;
pub use mirror::{mirror_path, MirrorDocument, MIRROR_DELIMITER};
pub use traits::ContentStore;
