//! Positional inverted index with BM25 ranking.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use strand_types::MessageId;

use crate::query::Query;
use crate::text;

const K1: f32 = 1.2;
const B: f32 = 0.75;

#[derive(Debug)]
struct DocStats {
    len: u32,
    terms: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LexicalIndex {
    /// term -> doc -> positions
    postings: HashMap<String, BTreeMap<MessageId, Vec<u32>>>,
    docs: HashMap<MessageId, DocStats>,
    total_len: u64,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.docs.contains_key(id)
    }

    /// Index `text` under `id`, replacing any earlier text.
    pub fn insert(&mut self, id: MessageId, text: &str) {
        self.remove(&id);
        let tokens = text::tokenize(text);
        let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for token in &tokens {
            positions
                .entry(token.term.clone())
                .or_default()
                .push(token.position);
        }
        let len = tokens.len() as u32;
        let terms = positions.keys().cloned().collect();
        for (term, pos) in positions {
            self.postings.entry(term).or_default().insert(id, pos);
        }
        self.docs.insert(id, DocStats { len, terms });
        self.total_len += u64::from(len);
    }

    pub fn remove(&mut self, id: &MessageId) -> bool {
        let Some(stats) = self.docs.remove(id) else {
            return false;
        };
        for term in &stats.terms {
            if let Some(docs) = self.postings.get_mut(term) {
                docs.remove(id);
                if docs.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_len -= u64::from(stats.len);
        true
    }

    /// Documents matching `query`, best first. Ties break on id.
    pub fn search(&self, query: &Query) -> Vec<(MessageId, f32)> {
        let matched = self.matching(query);
        let terms = query.positive_terms();
        let mut scored: Vec<(MessageId, f32)> = matched
            .into_iter()
            .map(|id| (id, self.bm25(&id, &terms)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
    }

    fn all_docs(&self) -> BTreeSet<MessageId> {
        self.docs.keys().copied().collect()
    }

    fn term_docs(&self, term: &str) -> BTreeSet<MessageId> {
        self.postings
            .get(term)
            .map(|docs| docs.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Unranked set of documents matching `query`.
    pub fn matching(&self, query: &Query) -> BTreeSet<MessageId> {
        match query {
            Query::Empty => BTreeSet::new(),
            Query::Term(term) => self.term_docs(term),
            Query::Phrase(terms) => self.phrase_docs(terms),
            Query::Not(inner) => {
                let excluded = self.matching(inner);
                self.all_docs().difference(&excluded).copied().collect()
            }
            Query::Or(items) => items.iter().flat_map(|q| self.matching(q)).collect(),
            Query::And(items) => {
                let (negative, positive): (Vec<&Query>, Vec<&Query>) =
                    items.iter().partition(|q| matches!(q, Query::Not(_)));
                let mut result = match positive.split_first() {
                    Some((first, rest)) => rest.iter().fold(self.matching(first), |acc, q| {
                        acc.intersection(&self.matching(q)).copied().collect()
                    }),
                    None => self.all_docs(),
                };
                for q in negative {
                    if let Query::Not(inner) = q {
                        for id in self.matching(inner) {
                            result.remove(&id);
                        }
                    }
                }
                result
            }
        }
    }

    fn phrase_docs(&self, terms: &[(String, u32)]) -> BTreeSet<MessageId> {
        let Some(((first, _), rest)) = terms.split_first() else {
            return BTreeSet::new();
        };
        let Some(first_docs) = self.postings.get(first) else {
            return BTreeSet::new();
        };
        first_docs
            .iter()
            .filter(|(id, starts)| {
                starts.iter().any(|start| {
                    rest.iter().all(|(term, offset)| {
                        self.postings
                            .get(term)
                            .and_then(|docs| docs.get(*id))
                            .is_some_and(|pos| pos.binary_search(&(start + offset)).is_ok())
                    })
                })
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn bm25(&self, id: &MessageId, terms: &[&str]) -> f32 {
        let Some(doc) = self.docs.get(id) else {
            return 0.0;
        };
        let n = self.docs.len() as f32;
        let avg_len = (self.total_len as f32 / n).max(1.0);
        terms
            .iter()
            .filter_map(|term| {
                let docs = self.postings.get(*term)?;
                let tf = docs.get(id)?.len() as f32;
                let df = docs.len() as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                let norm = K1 * (1.0 - B + B * doc.len as f32 / avg_len);
                Some(idf * tf * (K1 + 1.0) / (tf + norm))
            })
            .sum()
    }
}
