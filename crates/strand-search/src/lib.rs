//! Search for Strand.
//!
//! Two sub-indexes sit behind one [`SearchIndex`]:
//!
//! - a positional inverted index with BM25 scoring and a small query
//!   language (terms, `"phrases"`, `AND`/`OR`/`NOT`, `-term`)
//! - a vector index over embeddings from a pluggable [`EmbeddingBackend`]
//!
//! Hybrid queries merge both rankings with reciprocal-rank fusion. When the
//! embedding backend fails, documents stay lexically searchable and semantic
//! queries degrade to lexical results with a warning.
//!
//! The index is eventually consistent with the event log: writers hand work
//! to a [`BackgroundIndexer`] over a bounded queue and never wait for it.

pub mod embedding;
pub mod error;
pub mod index;
pub mod indexer;
pub mod lexical;
pub mod query;
pub mod text;
pub mod vector;

pub use embedding::{cosine, EmbeddingBackend, HashingEmbedder};
pub use error::{SearchError, SearchResult};
pub use index::{
    DocMetadata, IndexOutcome, SearchFilter, SearchHit, SearchIndex, SearchMode, SearchOptions,
    SearchResponse, RRF_K,
};
pub use indexer::BackgroundIndexer;
pub use lexical::LexicalIndex;
pub use query::Query;
pub use vector::VectorIndex;
