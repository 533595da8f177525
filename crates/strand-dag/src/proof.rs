//! Ancestry proofs from a message back to its thread root.

use serde::{Deserialize, Serialize};
use strand_crypto::hasher;
use strand_types::{MessageId, ThreadId};

use crate::node::{node_hash, LinkHash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub id: MessageId,
    pub links: Vec<LinkHash>,
    pub node_hash: [u8; 32],
}

/// Path of nodes from the thread root (first step) to `target` (last step)
/// along primary links.
///
/// A verifier holding only the proof can recompute every node hash and check
/// that each step commits to the one before it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadProof {
    pub thread: ThreadId,
    pub target: MessageId,
    pub steps: Vec<ProofStep>,
}

impl ThreadProof {
    pub fn root(&self) -> Option<&MessageId> {
        self.steps.first().map(|s| &s.id)
    }

    pub fn root_hash(&self) -> Option<[u8; 32]> {
        self.steps.first().map(|s| s.node_hash)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Recompute hashes from the root upward.
    pub fn verify(&self) -> bool {
        let Some(first) = self.steps.first() else {
            return false;
        };
        if !first.links.is_empty() {
            return false;
        }
        let mut previous: Option<&ProofStep> = None;
        for step in &self.steps {
            if node_hash(&step.id, &step.links) != step.node_hash {
                return false;
            }
            if let Some(prev) = previous {
                match step.links.first() {
                    Some(link) if link.id == prev.id && link.hash == prev.node_hash => {}
                    _ => return false,
                }
            }
            previous = Some(step);
        }
        self.steps.last().map(|s| s.id) == Some(self.target)
    }

    /// [`verify`](Self::verify), and check that `content` hashes to the target.
    pub fn verify_with_content(&self, content: &[u8]) -> bool {
        self.verify() && hasher::verify(self.target.as_identifier(), content)
    }
}
