//! Embedding backends and vector math.

use crate::error::{SearchError, SearchResult};
use crate::text;

/// Turns text into a fixed-length vector.
pub trait EmbeddingBackend: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> SearchResult<Vec<f32>>;
}

/// Feature-hashing embedder over stemmed tokens and token bigrams.
///
/// Deterministic and local, so semantic search works without a model
/// service. Texts sharing vocabulary land close together.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 256;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let hash = blake3::hash(feature.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[..8]);
        let h = u64::from_le_bytes(word);
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        ((h % self.dimensions as u64) as usize, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
        let tokens = text::tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];
        for token in &tokens {
            let (i, sign) = self.bucket(&token.term);
            vector[i] += sign;
        }
        for pair in tokens.windows(2) {
            let (i, sign) = self.bucket(&format!("{} {}", pair[0].term, pair[1].term));
            vector[i] += 0.5 * sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

/// Scale to unit length; the zero vector is left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity; 0 when either vector is zero or lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

pub(crate) fn check_dimensions(expected: usize, vector: &[f32]) -> SearchResult<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(SearchError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn embeddings_are_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed("release notes for version two").unwrap();
        let b = e.embed("release notes for version two").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HashingEmbedder::DEFAULT_DIMENSIONS);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_is_closer() {
        let e = HashingEmbedder::default();
        let q = e.embed("database migration failed").unwrap();
        let near = e.embed("the database migration failed again").unwrap();
        let far = e.embed("birthday cake recipe").unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
        let e = HashingEmbedder::new(8);
        assert!(e.embed("the of and").unwrap().iter().all(|x| *x == 0.0));
    }

    proptest! {
        #[test]
        fn cosine_is_bounded(a in proptest::collection::vec(-10.0f32..10.0, 4), b in proptest::collection::vec(-10.0f32..10.0, 4)) {
            let c = cosine(&a, &b);
            prop_assert!((-1.0001..=1.0001).contains(&c));
        }
    }
}
