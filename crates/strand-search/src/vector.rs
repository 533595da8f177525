//! Brute-force cosine index.

use std::collections::HashMap;

use strand_types::MessageId;

use crate::embedding::{check_dimensions, cosine};
use crate::error::SearchResult;

#[derive(Debug)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: HashMap<MessageId, Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.vectors.contains_key(id)
    }

    pub fn insert(&mut self, id: MessageId, vector: Vec<f32>) -> SearchResult<()> {
        check_dimensions(self.dimensions, &vector)?;
        self.vectors.insert(id, vector);
        Ok(())
    }

    pub fn remove(&mut self, id: &MessageId) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// Documents with positive similarity to `query`, most similar first.
    pub fn search(&self, query: &[f32]) -> SearchResult<Vec<(MessageId, f32)>> {
        check_dimensions(self.dimensions, query)?;
        let mut hits: Vec<(MessageId, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (*id, cosine(query, v)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_crypto::hasher;
    use strand_types::{Namespace, Profile};

    fn id(n: u8) -> MessageId {
        MessageId::new(hasher::identify(Namespace::Message, Profile::SelfDescribing, &[n])).unwrap()
    }

    #[test]
    fn ranks_by_similarity() {
        let mut index = VectorIndex::new(2);
        index.insert(id(1), vec![1.0, 0.0]).unwrap();
        index.insert(id(2), vec![0.7, 0.7]).unwrap();
        index.insert(id(3), vec![-1.0, 0.0]).unwrap();
        let hits = index.search(&[1.0, 0.1]).unwrap();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![id(1), id(2)]);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut index = VectorIndex::new(3);
        assert!(index.insert(id(1), vec![1.0]).is_err());
        assert!(index.search(&[1.0]).is_err());
    }
}
