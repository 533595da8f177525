//! The thread graph and its traversal, verification and proof algorithms.
//!
//! [`ThreadGraph`] keeps nodes in a [`HashMap`] with a forward-edge index
//! (`children`) and a per-thread insertion list. A reply may arrive before
//! its parent; its link stays dangling until the parent is added. A node is
//! never linked to one of its own descendants, so the graph stays acyclic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::thread;

use strand_crypto::hasher;
use strand_store::{ContentStore, StoreError};
use strand_types::{MessageId, ThreadId};
use tracing::{debug, error, info, warn};

use crate::error::{DagError, DagResult};
use crate::node::{node_hash, DagNode, LinkHash, NodeInput};
use crate::proof::{ProofStep, ThreadProof};
use crate::report::{IntegrityIssue, IntegrityReport};

#[derive(Debug, Default)]
pub struct ThreadGraph {
    nodes: HashMap<MessageId, DagNode>,
    /// Parent id -> children, in insertion order. Keyed by id even when the
    /// parent is missing.
    children: HashMap<MessageId, Vec<MessageId>>,
    threads: HashMap<ThreadId, Vec<MessageId>>,
    next_seq: u64,
}

impl ThreadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Add a message to its thread.
    ///
    /// Links to `reply_to` when given, else to the most recently added node
    /// of the thread that does not already descend from the new one. A reply
    /// parent that is not in the graph is kept as a dangling link and
    /// resolved when that parent is added; until then
    /// [`verify_thread`](Self::verify_thread) reports it.
    pub fn add(&mut self, input: NodeInput) -> DagResult<DagNode> {
        if self.nodes.contains_key(&input.id) {
            return Err(DagError::DuplicateNode(input.id));
        }
        if !hasher::verify(input.id.as_identifier(), &input.content) {
            error!(node = %input.id, "node content does not hash to its identifier");
            return Err(DagError::ContentMismatch(input.id));
        }

        // Nodes already waiting on this one, directly or transitively.
        let below: HashSet<MessageId> = self.descendants(&input.id).iter().map(|n| n.id).collect();
        let reply_to = match input.reply_to {
            Some(parent) if parent == input.id || below.contains(&parent) => {
                warn!(node = %input.id, parent = %parent, "reply parent descends from the node, linking to thread instead");
                None
            }
            other => other,
        };
        let parent = reply_to.or_else(|| {
            self.threads.get(&input.thread).and_then(|ids| {
                ids.iter().rev().find(|id| !below.contains(*id)).copied()
            })
        });
        let links: Vec<LinkHash> = parent
            .into_iter()
            .map(|parent| match self.nodes.get(&parent) {
                Some(p) => LinkHash {
                    id: parent,
                    hash: p.node_hash,
                },
                None => {
                    warn!(node = %input.id, parent = %parent, "reply parent not in graph, keeping dangling link");
                    LinkHash {
                        id: parent,
                        hash: LinkHash::DANGLING,
                    }
                }
            })
            .collect();

        let node = DagNode {
            id: input.id,
            thread: input.thread,
            node_hash: node_hash(&input.id, &links),
            links,
            content: input.content,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        for link in &node.links {
            self.children.entry(link.id).or_default().push(node.id);
        }
        self.threads.entry(node.thread).or_default().push(node.id);
        debug!(node = %node.id.short(), thread = %node.thread.short(), links = node.links.len(), "added thread node");
        self.nodes.insert(node.id, node.clone());
        self.resolve_waiting(node.id);
        Ok(node)
    }

    /// Refresh the link hashes that point at `id` and, since every refreshed
    /// node hash changes, those of their descendants in turn.
    fn resolve_waiting(&mut self, id: MessageId) {
        let mut changed = VecDeque::from([id]);
        let mut resolved = 0usize;
        while let Some(target) = changed.pop_front() {
            let Some(hash) = self.nodes.get(&target).map(|n| n.node_hash) else {
                continue;
            };
            let waiting = self.children.get(&target).cloned().unwrap_or_default();
            for child in waiting {
                let Some(node) = self.nodes.get_mut(&child) else {
                    continue;
                };
                let mut touched = false;
                for link in node.links.iter_mut().filter(|l| l.id == target && l.hash != hash) {
                    link.hash = hash;
                    touched = true;
                }
                if touched {
                    node.node_hash = node_hash(&node.id, &node.links);
                    resolved += 1;
                    changed.push_back(child);
                }
            }
        }
        if resolved > 0 {
            info!(node = %id.short(), resolved, "late parent resolved waiting links");
        }
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn get(&self, id: &MessageId) -> Option<&DagNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn thread_ids(&self) -> impl Iterator<Item = &ThreadId> {
        self.threads.keys()
    }

    /// Nodes of a thread in topological (insertion) order.
    pub fn thread_nodes(&self, thread: &ThreadId) -> Vec<&DagNode> {
        self.threads
            .get(thread)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Nodes of a thread with no links.
    pub fn roots(&self, thread: &ThreadId) -> Vec<&DagNode> {
        self.thread_nodes(thread)
            .into_iter()
            .filter(|n| n.is_root())
            .collect()
    }

    /// Nodes of a thread that nothing links to yet.
    pub fn heads(&self, thread: &ThreadId) -> Vec<&DagNode> {
        self.thread_nodes(thread)
            .into_iter()
            .filter(|n| self.children.get(&n.id).map_or(true, |c| c.is_empty()))
            .collect()
    }

    /// Every node reachable by following links, nearest first. Excludes `id`.
    pub fn ancestors(&self, id: &MessageId) -> Vec<&DagNode> {
        let Some(start) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut visited = HashSet::from([*id]);
        let mut queue: VecDeque<MessageId> = start.link_ids().copied().collect();
        let mut result = Vec::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                result.push(node);
                queue.extend(node.link_ids().copied());
            }
        }
        result
    }

    /// Every node that reaches `id` by following links, nearest first.
    /// Excludes `id`.
    pub fn descendants(&self, id: &MessageId) -> Vec<&DagNode> {
        let mut visited = HashSet::from([*id]);
        let mut queue: VecDeque<MessageId> = self
            .children
            .get(id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();
        let mut result = Vec::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                result.push(node);
                if let Some(children) = self.children.get(&current) {
                    queue.extend(children.iter().copied());
                }
            }
        }
        result
    }

    // ---------------------------------------------------------------
    // Verification
    // ---------------------------------------------------------------

    /// Recompute every node's identifier from the bytes in `store` and
    /// check that every link resolves.
    ///
    /// Content checks run in parallel across scoped worker threads. Every
    /// intact descendant of a failed node is reported as
    /// [`IntegrityIssue::CorruptAncestor`].
    pub fn verify_thread(
        &self,
        thread: &ThreadId,
        store: &dyn ContentStore,
    ) -> DagResult<IntegrityReport> {
        let nodes = self.thread_nodes(thread);
        if nodes.is_empty() {
            return Err(DagError::ThreadNotFound(*thread));
        }

        let content = check_content(&nodes, store)?;
        let mut errors = Vec::new();
        let mut failed = Vec::new();
        for (node, issue) in nodes.iter().zip(content) {
            let mut node_failed = false;
            if let Some(issue) = issue {
                errors.push(issue);
                node_failed = true;
            }
            for link in &node.links {
                let issue = match self.nodes.get(&link.id) {
                    None => IntegrityIssue::DanglingLink {
                        node: node.id,
                        missing: link.id,
                    },
                    Some(target) if target.node_hash != link.hash => IntegrityIssue::StaleLink {
                        node: node.id,
                        target: link.id,
                    },
                    Some(_) => continue,
                };
                errors.push(issue);
                node_failed = true;
            }
            if node_failed {
                failed.push(node.id);
            }
        }

        let failed_set: HashSet<MessageId> = failed.iter().copied().collect();
        let mut flagged = HashSet::new();
        for ancestor in &failed {
            for descendant in self.descendants(ancestor) {
                if descendant.thread == *thread
                    && !failed_set.contains(&descendant.id)
                    && flagged.insert(descendant.id)
                {
                    errors.push(IntegrityIssue::CorruptAncestor {
                        node: descendant.id,
                        ancestor: *ancestor,
                    });
                }
            }
        }

        for issue in errors.iter().filter(|e| e.is_direct()) {
            error!(thread = %thread, %issue, "thread integrity violation");
        }
        let report = IntegrityReport::new(*thread, nodes.len(), errors);
        info!(
            thread = %thread.short(),
            nodes = report.node_count,
            errors = report.errors.len(),
            valid = report.valid,
            "verified thread"
        );
        Ok(report)
    }

    // ---------------------------------------------------------------
    // Proofs
    // ---------------------------------------------------------------

    /// Path from `id` to its thread root along primary links.
    pub fn proof(&self, id: &MessageId) -> DagResult<ThreadProof> {
        let target = self.nodes.get(id).ok_or(DagError::NodeNotFound(*id))?;
        let mut steps = Vec::new();
        let mut current = target;
        loop {
            steps.push(ProofStep {
                id: current.id,
                links: current.links.clone(),
                node_hash: current.node_hash,
            });
            let Some(link) = current.primary_link() else {
                break;
            };
            // The graph is acyclic, so the walk terminates.
            current = match self.nodes.get(&link.id) {
                Some(parent) if !link.is_dangling() => parent,
                _ => {
                    return Err(DagError::DanglingLink {
                        node: current.id,
                        missing: link.id,
                    })
                }
            };
        }
        steps.reverse();
        Ok(ThreadProof {
            thread: target.thread,
            target: target.id,
            steps,
        })
    }
}

fn check_node(node: &DagNode, store: &dyn ContentStore) -> DagResult<Option<IntegrityIssue>> {
    match store.get(node.id.as_identifier()) {
        Ok(bytes) if hasher::verify(node.id.as_identifier(), &bytes) => Ok(None),
        Ok(_) => Ok(Some(IntegrityIssue::ContentMismatch { node: node.id })),
        Err(StoreError::NotFound(_)) => Ok(Some(IntegrityIssue::MissingContent { node: node.id })),
        Err(e) => Err(e.into()),
    }
}

/// Per-node content check, results in the order of `nodes`.
fn check_content(
    nodes: &[&DagNode],
    store: &dyn ContentStore,
) -> DagResult<Vec<Option<IntegrityIssue>>> {
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let chunk = nodes.len().div_ceil(workers).max(1);
    thread::scope(|scope| {
        let handles: Vec<_> = nodes
            .chunks(chunk)
            .map(|part| {
                scope.spawn(move || {
                    part.iter()
                        .map(|node| check_node(node, store))
                        .collect::<DagResult<Vec<_>>>()
                })
            })
            .collect();
        let mut results = Vec::with_capacity(nodes.len());
        for handle in handles {
            results.extend(handle.join().map_err(|_| DagError::WorkerPanicked)??);
        }
        Ok(results)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strand_store::InMemoryContentStore;
    use strand_types::{AccountId, MessageIdentity, MessageKind, PlatformBinding};

    fn account() -> AccountId {
        hasher::account_id(&PlatformBinding::new("chat", "ana")).unwrap()
    }

    fn thread(name: &str) -> ThreadId {
        hasher::thread_id("chat", name).unwrap()
    }

    fn input(thread: ThreadId, text: &str, reply_to: Option<MessageId>) -> NodeInput {
        let identity = MessageIdentity {
            account_id: account(),
            content: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            kind: MessageKind::Text,
        };
        NodeInput {
            id: hasher::message_id(&identity).unwrap(),
            thread,
            reply_to,
            content: hasher::message_identity_bytes(&identity).unwrap(),
        }
    }

    /// Add to the graph and persist content, like the facade does.
    fn add(graph: &mut ThreadGraph, store: &InMemoryContentStore, input: NodeInput) -> MessageId {
        store.put(input.id.as_identifier(), &input.content).unwrap();
        graph.add(input).unwrap().id
    }

    #[test]
    fn first_message_is_root_and_later_ones_link_to_latest() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = add(&mut graph, &store, input(t, "hello", None));
        let m2 = add(&mut graph, &store, input(t, "second", None));
        let m3 = add(&mut graph, &store, input(t, "third", None));

        assert!(graph.get(&m1).unwrap().is_root());
        assert_eq!(graph.get(&m2).unwrap().primary_link().unwrap().id, m1);
        assert_eq!(graph.get(&m3).unwrap().primary_link().unwrap().id, m2);
        assert_eq!(graph.roots(&t).len(), 1);
        assert_eq!(graph.heads(&t).iter().map(|n| n.id).collect::<Vec<_>>(), vec![m3]);
    }

    #[test]
    fn explicit_replies_branch() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let root = add(&mut graph, &store, input(t, "question", None));
        let a = add(&mut graph, &store, input(t, "answer a", Some(root)));
        let b = add(&mut graph, &store, input(t, "answer b", Some(root)));

        let heads: Vec<_> = graph.heads(&t).iter().map(|n| n.id).collect();
        assert_eq!(heads, vec![a, b]);
        let descendants: Vec<_> = graph.descendants(&root).iter().map(|n| n.id).collect();
        assert_eq!(descendants, vec![a, b]);
        assert_eq!(graph.ancestors(&b).len(), 1);
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut graph = ThreadGraph::new();
        let t = thread("general");
        graph.add(input(t, "hello", None)).unwrap();
        assert!(matches!(
            graph.add(input(t, "hello", None)),
            Err(DagError::DuplicateNode(_))
        ));
    }

    #[test]
    fn content_must_hash_to_id() {
        let mut graph = ThreadGraph::new();
        let mut bad = input(thread("general"), "hello", None);
        bad.content = b"something else".to_vec();
        let err = graph.add(bad).unwrap_err();
        assert_eq!(err.class(), strand_types::ErrorClass::Integrity);
    }

    #[test]
    fn two_message_thread_verifies() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = add(&mut graph, &store, input(t, "hello", None));
        add(&mut graph, &store, input(t, "hi back", Some(m1)));

        let report = graph.verify_thread(&t, &store).unwrap();
        assert!(report.valid);
        assert_eq!(report.node_count, 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn long_thread_verifies_in_parallel() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("long");
        for i in 0..200 {
            add(&mut graph, &store, input(t, &format!("message {i}"), None));
        }
        let report = graph.verify_thread(&t, &store).unwrap();
        assert!(report.valid);
        assert_eq!(report.node_count, 200);
    }

    #[test]
    fn tampered_root_taints_descendants() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = add(&mut graph, &store, input(t, "hello", None));
        let m2 = add(&mut graph, &store, input(t, "reply", Some(m1)));

        let mut bytes = store.get(m1.as_identifier()).unwrap();
        bytes[0] ^= 0x01;
        store.tamper(m1.as_identifier(), bytes);

        let report = graph.verify_thread(&t, &store).unwrap();
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                IntegrityIssue::ContentMismatch { node: m1 },
                IntegrityIssue::CorruptAncestor { node: m2, ancestor: m1 },
            ]
        );
        assert_eq!(report.failed_nodes().into_iter().collect::<Vec<_>>(), vec![m1]);
    }

    #[test]
    fn missing_content_is_reported() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = graph.add(input(t, "never stored", None)).unwrap().id;
        let report = graph.verify_thread(&t, &store).unwrap();
        assert_eq!(report.errors, vec![IntegrityIssue::MissingContent { node: m1 }]);
    }

    #[test]
    fn dangling_reply_is_kept_and_reported() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let ghost = input(thread("elsewhere"), "never added", None).id;
        let m1 = add(&mut graph, &store, input(t, "orphan reply", Some(ghost)));

        assert!(!graph.get(&m1).unwrap().is_root());
        let report = graph.verify_thread(&t, &store).unwrap();
        assert_eq!(
            report.errors,
            vec![IntegrityIssue::DanglingLink { node: m1, missing: ghost }]
        );
        assert!(matches!(graph.proof(&m1), Err(DagError::DanglingLink { .. })));
    }

    #[test]
    fn late_parent_resolves_the_waiting_reply() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let parent = input(t, "question", None);
        let reply = add(&mut graph, &store, input(t, "answer", Some(parent.id)));
        let parent = add(&mut graph, &store, parent);

        assert!(graph.get(&parent).unwrap().is_root());
        let link = *graph.get(&reply).unwrap().primary_link().unwrap();
        assert_eq!(link.id, parent);
        assert_eq!(link.hash, graph.get(&parent).unwrap().node_hash);
        assert!(graph.ancestors(&parent).is_empty());

        let report = graph.verify_thread(&t, &store).unwrap();
        assert!(report.valid, "{:?}", report.errors);
        let proof = graph.proof(&reply).unwrap();
        assert_eq!(proof.steps.iter().map(|s| s.id).collect::<Vec<_>>(), vec![parent, reply]);
        assert!(proof.verify());
    }

    #[test]
    fn resolution_cascades_to_grandchildren() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let root = input(t, "root", None);
        let middle = input(t, "middle", Some(root.id));
        let leaf = add(&mut graph, &store, input(t, "leaf", Some(middle.id)));
        let middle = add(&mut graph, &store, middle);
        let root = add(&mut graph, &store, root);

        assert!(graph.verify_thread(&t, &store).unwrap().valid);
        let proof = graph.proof(&leaf).unwrap();
        assert_eq!(proof.steps.iter().map(|s| s.id).collect::<Vec<_>>(), vec![root, middle, leaf]);
        assert!(proof.verify());
    }

    #[test]
    fn new_node_never_links_to_its_descendant() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let earlier = add(&mut graph, &store, input(t, "earlier", None));
        let parent = input(t, "parent", None);
        let reply = add(&mut graph, &store, input(t, "reply", Some(parent.id)));
        let parent = add(&mut graph, &store, parent);

        assert_eq!(graph.get(&parent).unwrap().primary_link().unwrap().id, earlier);
        assert!(!graph.ancestors(&parent).iter().any(|n| n.id == reply));
        for id in [earlier, parent, reply] {
            assert!(graph.proof(&id).unwrap().verify());
        }
        assert!(graph.verify_thread(&t, &store).unwrap().valid);
    }

    #[test]
    fn stale_link_hash_is_reported() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = add(&mut graph, &store, input(t, "hello", None));
        let m2 = add(&mut graph, &store, input(t, "reply", Some(m1)));
        graph.nodes.get_mut(&m2).unwrap().links[0].hash = LinkHash::DANGLING;

        let report = graph.verify_thread(&t, &store).unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors, vec![IntegrityIssue::StaleLink { node: m2, target: m1 }]);
        assert!(graph.proof(&m2).is_err());
    }

    #[test]
    fn unknown_thread_is_not_found() {
        let graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let err = graph.verify_thread(&thread("nope"), &store).unwrap_err();
        assert_eq!(err.class(), strand_types::ErrorClass::NotFound);
    }

    #[test]
    fn proof_walks_to_root_and_verifies() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = add(&mut graph, &store, input(t, "hello", None));
        let m2 = add(&mut graph, &store, input(t, "two", None));
        let side = add(&mut graph, &store, input(t, "side", Some(m1)));
        let m4 = add(&mut graph, &store, input(t, "four", Some(m2)));

        let proof = graph.proof(&m4).unwrap();
        assert_eq!(proof.steps.iter().map(|s| s.id).collect::<Vec<_>>(), vec![m1, m2, m4]);
        assert_eq!(proof.root(), Some(&m1));
        assert!(proof.verify());
        assert!(proof.verify_with_content(&graph.get(&m4).unwrap().content));
        assert!(!proof.verify_with_content(b"forged"));
        assert!(graph.proof(&side).unwrap().verify());
    }

    #[test]
    fn altered_proof_fails() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        let m1 = add(&mut graph, &store, input(t, "hello", None));
        let m2 = add(&mut graph, &store, input(t, "two", Some(m1)));

        let mut proof = graph.proof(&m2).unwrap();
        proof.steps[0].node_hash[0] ^= 0xff;
        assert!(!proof.verify());

        let mut truncated = graph.proof(&m2).unwrap();
        truncated.steps.remove(0);
        assert!(!truncated.verify());
    }

    #[test]
    fn report_serializes_with_kind_tags() {
        let mut graph = ThreadGraph::new();
        let store = InMemoryContentStore::new();
        let t = thread("general");
        graph.add(input(t, "hello", None)).unwrap();
        let report = graph.verify_thread(&t, &store).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["kind"], "missing_content");
    }
}
