//! Thread integrity reports.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strand_types::{MessageId, ThreadId};

/// One integrity violation found while verifying a thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// The stored bytes no longer hash to the node's identifier.
    ContentMismatch { node: MessageId },
    /// The content store holds no bytes for the node.
    MissingContent { node: MessageId },
    /// A link points at a message that is not in the graph.
    DanglingLink { node: MessageId, missing: MessageId },
    /// A link's recorded hash is not its target's current node hash.
    StaleLink { node: MessageId, target: MessageId },
    /// The node is intact but descends from a node that failed.
    CorruptAncestor { node: MessageId, ancestor: MessageId },
}

impl IntegrityIssue {
    pub fn node(&self) -> &MessageId {
        match self {
            Self::ContentMismatch { node }
            | Self::MissingContent { node }
            | Self::DanglingLink { node, .. }
            | Self::StaleLink { node, .. }
            | Self::CorruptAncestor { node, .. } => node,
        }
    }

    /// `true` for problems with the node itself rather than its ancestry.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Self::CorruptAncestor { .. })
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentMismatch { node } => write!(f, "{node}: content does not match identifier"),
            Self::MissingContent { node } => write!(f, "{node}: content missing"),
            Self::DanglingLink { node, missing } => write!(f, "{node}: link to missing {missing}"),
            Self::StaleLink { node, target } => write!(f, "{node}: link hash to {target} is stale"),
            Self::CorruptAncestor { node, ancestor } => {
                write!(f, "{node}: descends from corrupt {ancestor}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub thread: ThreadId,
    pub valid: bool,
    pub node_count: usize,
    pub errors: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn new(thread: ThreadId, node_count: usize, errors: Vec<IntegrityIssue>) -> Self {
        Self {
            thread,
            valid: errors.is_empty(),
            node_count,
            errors,
        }
    }

    /// Nodes whose own content or links failed.
    pub fn failed_nodes(&self) -> BTreeSet<MessageId> {
        self.errors
            .iter()
            .filter(|e| e.is_direct())
            .map(|e| *e.node())
            .collect()
    }

    /// Every issue reported against `node`.
    pub fn issues_for(&self, node: &MessageId) -> Vec<&IntegrityIssue> {
        self.errors.iter().filter(|e| e.node() == node).collect()
    }
}
