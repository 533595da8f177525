//! Merkle thread graph for Strand.
//!
//! Every message is a node whose identifier is derived from its content.
//! A node links to the message it replies to, or else to the most recently
//! added message of its thread; a node with neither is a root. Each node also
//! carries a link-inclusive hash so a proof from any message back to its
//! thread root commits to the whole ancestry.
//!
//! The graph is derived state: it is rebuilt from `MessageCreated` events and
//! never persisted on its own.

pub mod error;
pub mod graph;
pub mod node;
pub mod proof;
pub mod report;

pub use error::{DagError, DagResult};
pub use graph::ThreadGraph;
pub use node::{DagNode, LinkHash, NodeInput};
pub use proof::{ProofStep, ThreadProof};
pub use report::{IntegrityIssue, IntegrityReport};
