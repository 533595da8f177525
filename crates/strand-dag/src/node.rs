//! Graph nodes and the link-inclusive node hash.

use serde::{Deserialize, Serialize};
use strand_types::{MessageId, ThreadId};

const NODE_DOMAIN: &[u8] = b"strand-dag-node-v1:";

/// What the graph needs to know to place a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInput {
    pub id: MessageId,
    pub thread: ThreadId,
    pub reply_to: Option<MessageId>,
    /// Canonical identity bytes of the message; hashing them yields `id`.
    pub content: Vec<u8>,
}

/// A link together with the node hash of its target at link time.
///
/// The hash is all zeroes while the target is not in the graph; adding the
/// target fills it in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHash {
    pub id: MessageId,
    pub hash: [u8; 32],
}

impl LinkHash {
    pub const DANGLING: [u8; 32] = [0; 32];

    pub fn is_dangling(&self) -> bool {
        self.hash == Self::DANGLING
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: MessageId,
    pub thread: ThreadId,
    /// Parent links; the first is the primary link followed by proofs.
    pub links: Vec<LinkHash>,
    pub content: Vec<u8>,
    pub node_hash: [u8; 32],
    /// Insertion sequence within the whole graph.
    pub seq: u64,
}

impl DagNode {
    pub fn is_root(&self) -> bool {
        self.links.is_empty()
    }

    pub fn primary_link(&self) -> Option<&LinkHash> {
        self.links.first()
    }

    pub fn link_ids(&self) -> impl Iterator<Item = &MessageId> {
        self.links.iter().map(|l| &l.id)
    }

    pub fn node_hash_hex(&self) -> String {
        hex::encode(self.node_hash)
    }
}

/// `blake3("strand-dag-node-v1:" ‖ id ‖ (link id ‖ link hash)*)`.
pub fn node_hash(id: &MessageId, links: &[LinkHash]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NODE_DOMAIN);
    hasher.update(&id.as_identifier().to_bytes());
    for link in links {
        hasher.update(&link.id.as_identifier().to_bytes());
        hasher.update(&link.hash);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_crypto::hasher;
    use strand_types::{Namespace, Profile};

    fn msg(byte: u8) -> MessageId {
        MessageId::new(hasher::identify(Namespace::Message, Profile::SelfDescribing, &[byte])).unwrap()
    }

    #[test]
    fn hash_depends_on_links() {
        let id = msg(1);
        let root = node_hash(&id, &[]);
        let linked = node_hash(
            &id,
            &[LinkHash {
                id: msg(2),
                hash: [7; 32],
            }],
        );
        assert_ne!(root, linked);
    }

    #[test]
    fn hash_depends_on_parent_hash() {
        let id = msg(1);
        let a = node_hash(&id, &[LinkHash { id: msg(2), hash: [1; 32] }]);
        let b = node_hash(&id, &[LinkHash { id: msg(2), hash: [2; 32] }]);
        assert_ne!(a, b);
    }

    #[test]
    fn dangling_marker() {
        let link = LinkHash {
            id: msg(3),
            hash: LinkHash::DANGLING,
        };
        assert!(link.is_dangling());
    }
}
