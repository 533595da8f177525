//! The combined search index.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_types::{AccountId, MessageId, MessageKind, ThreadId};
use tracing::{debug, warn};

use crate::embedding::EmbeddingBackend;
use crate::error::{SearchError, SearchResult};
use crate::lexical::LexicalIndex;
use crate::query::Query;
use crate::vector::VectorIndex;

/// Reciprocal-rank fusion constant.
pub const RRF_K: f32 = 60.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Semantic,
    #[default]
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(SearchError::InvalidQuery(format!("unknown search mode {other:?}"))),
        }
    }
}

/// Filterable attributes stored alongside each document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub thread_id: ThreadId,
    pub account_id: AccountId,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub thread_id: Option<ThreadId>,
    pub account_id: Option<AccountId>,
    pub kind: Option<MessageKind>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.thread_id.is_none() && self.account_id.is_none() && self.kind.is_none()
    }

    fn accepts(&self, meta: Option<&DocMetadata>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(meta) = meta else {
            return false;
        };
        self.thread_id.map_or(true, |t| t == meta.thread_id)
            && self.account_id.map_or(true, |a| a == meta.account_id)
            && self.kind.map_or(true, |k| k == meta.kind)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub limit: usize,
    #[serde(default)]
    pub filter: SearchFilter,
}

impl SearchOptions {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn in_thread(mut self, thread_id: ThreadId) -> Self {
        self.filter.thread_id = Some(thread_id);
        self
    }

    pub fn by_account(mut self, account_id: AccountId) -> Self {
        self.filter.account_id = Some(account_id);
        self
    }

    pub fn of_kind(mut self, kind: MessageKind) -> Self {
        self.filter.kind = Some(kind);
        self
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::default(),
            limit: Self::DEFAULT_LIMIT,
            filter: SearchFilter::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: MessageId,
    pub score: f32,
    /// 1-based rank in the lexical ranking, if the document appeared there.
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// The mode that actually produced `hits`.
    pub mode: SearchMode,
    pub degraded: bool,
    pub warnings: Vec<String>,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<MessageId> {
        self.hits.iter().map(|h| h.id).collect()
    }
}

/// What happened when a document was indexed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Lexical and, when a backend is configured, semantic.
    Indexed,
    /// The embedding backend failed; the document is lexically searchable.
    LexicalOnly(SearchError),
}

impl IndexOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::LexicalOnly(_))
    }
}

/// Lexical and vector indexes with shared document metadata.
pub struct SearchIndex {
    lexical: RwLock<LexicalIndex>,
    vectors: Option<RwLock<VectorIndex>>,
    metadata: RwLock<HashMap<MessageId, DocMetadata>>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
}

impl SearchIndex {
    /// Index without a semantic side; semantic queries always degrade.
    pub fn lexical_only() -> Self {
        Self {
            lexical: RwLock::new(LexicalIndex::new()),
            vectors: None,
            metadata: RwLock::new(HashMap::new()),
            embedder: None,
        }
    }

    pub fn with_embedder(embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            vectors: Some(RwLock::new(VectorIndex::new(embedder.dimensions()))),
            embedder: Some(embedder),
            ..Self::lexical_only()
        }
    }

    pub fn embedder_name(&self) -> Option<&str> {
        self.embedder.as_deref().map(|e| e.name())
    }

    pub fn len(&self) -> usize {
        self.lexical.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.lexical.read().expect("lock poisoned").contains(id)
    }

    /// Index or re-index a document.
    pub fn index(&self, id: MessageId, content: &str, metadata: DocMetadata) -> IndexOutcome {
        self.lexical
            .write()
            .expect("lock poisoned")
            .insert(id, content);
        self.metadata
            .write()
            .expect("lock poisoned")
            .insert(id, metadata);

        let (Some(embedder), Some(vectors)) = (&self.embedder, &self.vectors) else {
            return IndexOutcome::Indexed;
        };
        let embedded = embedder
            .embed(content)
            .and_then(|v| vectors.write().expect("lock poisoned").insert(id, v));
        match embedded {
            Ok(()) => {
                debug!(id = %id.short(), "indexed document");
                IndexOutcome::Indexed
            }
            Err(e) => {
                warn!(id = %id.short(), backend = embedder.name(), error = %e, "embedding failed; document indexed lexically only");
                vectors.write().expect("lock poisoned").remove(&id);
                IndexOutcome::LexicalOnly(e)
            }
        }
    }

    pub fn remove(&self, id: &MessageId) -> bool {
        let removed = self.lexical.write().expect("lock poisoned").remove(id);
        self.metadata.write().expect("lock poisoned").remove(id);
        if let Some(vectors) = &self.vectors {
            vectors.write().expect("lock poisoned").remove(id);
        }
        removed
    }

    pub fn search(&self, text: &str, options: &SearchOptions) -> SearchResult<SearchResponse> {
        let query = Query::parse(text)?;
        let mut warnings = Vec::new();

        let lexical = self.lexical_ranking(&query, &options.filter);
        let semantic = match options.mode {
            SearchMode::Lexical => None,
            SearchMode::Semantic | SearchMode::Hybrid => {
                match self.semantic_ranking(text, &query, &options.filter) {
                    Ok(ranking) => Some(ranking),
                    Err(e) => {
                        warn!(mode = ?options.mode, error = %e, "semantic search unavailable; using lexical results");
                        warnings.push(format!("{}: semantic ranking skipped: {e}", e.class()));
                        None
                    }
                }
            }
        };

        let (mode, mut hits) = match (options.mode, semantic) {
            (SearchMode::Semantic, Some(semantic)) => (SearchMode::Semantic, semantic_hits(semantic)),
            (SearchMode::Hybrid, Some(semantic)) => (SearchMode::Hybrid, fuse(&lexical, &semantic)),
            _ => (SearchMode::Lexical, lexical_hits(lexical)),
        };
        hits.truncate(options.limit);

        Ok(SearchResponse {
            hits,
            mode,
            degraded: !warnings.is_empty(),
            warnings,
        })
    }

    fn lexical_ranking(&self, query: &Query, filter: &SearchFilter) -> Vec<(MessageId, f32)> {
        let ranked = self.lexical.read().expect("lock poisoned").search(query);
        let metadata = self.metadata.read().expect("lock poisoned");
        ranked
            .into_iter()
            .filter(|(id, _)| filter.accepts(metadata.get(id)))
            .collect()
    }

    fn semantic_ranking(
        &self,
        text: &str,
        query: &Query,
        filter: &SearchFilter,
    ) -> SearchResult<Vec<(MessageId, f32)>> {
        let (Some(embedder), Some(vectors)) = (&self.embedder, &self.vectors) else {
            return Err(SearchError::Embedding("no embedding backend configured".into()));
        };
        if query.positive_terms().is_empty() {
            return Ok(Vec::new());
        }
        let vector = embedder.embed(&semantic_text(text))?;
        let ranked = vectors.read().expect("lock poisoned").search(&vector)?;

        let excluded: BTreeSet<MessageId> = {
            let lexical = self.lexical.read().expect("lock poisoned");
            query
                .negations()
                .into_iter()
                .flat_map(|q| lexical.matching(q))
                .collect()
        };
        let metadata = self.metadata.read().expect("lock poisoned");
        Ok(ranked
            .into_iter()
            .filter(|(id, _)| !excluded.contains(id) && filter.accepts(metadata.get(id)))
            .collect())
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("documents", &self.len())
            .field("embedder", &self.embedder_name())
            .finish()
    }
}

/// Query text with operators and negated words removed.
fn semantic_text(text: &str) -> String {
    let mut words = Vec::new();
    let mut skip_next = false;
    for word in text.split_whitespace() {
        if skip_next {
            skip_next = false;
            continue;
        }
        match word {
            "AND" | "OR" => {}
            "NOT" => skip_next = true,
            w if w.starts_with('-') => {}
            w => words.push(w),
        }
    }
    words.join(" ")
}

fn lexical_hits(ranking: Vec<(MessageId, f32)>) -> Vec<SearchHit> {
    ranking
        .into_iter()
        .enumerate()
        .map(|(i, (id, score))| SearchHit {
            id,
            score,
            lexical_rank: Some(i + 1),
            semantic_rank: None,
        })
        .collect()
}

fn semantic_hits(ranking: Vec<(MessageId, f32)>) -> Vec<SearchHit> {
    ranking
        .into_iter()
        .enumerate()
        .map(|(i, (id, score))| SearchHit {
            id,
            score,
            lexical_rank: None,
            semantic_rank: Some(i + 1),
        })
        .collect()
}

/// Reciprocal-rank fusion: `score(d) = sum over rankings of 1 / (k + rank)`.
fn fuse(lexical: &[(MessageId, f32)], semantic: &[(MessageId, f32)]) -> Vec<SearchHit> {
    let mut fused: HashMap<MessageId, SearchHit> = HashMap::new();
    for (i, (id, _)) in lexical.iter().enumerate() {
        let hit = fused.entry(*id).or_insert_with(|| empty_hit(*id));
        hit.lexical_rank = Some(i + 1);
        hit.score += 1.0 / (RRF_K + (i + 1) as f32);
    }
    for (i, (id, _)) in semantic.iter().enumerate() {
        let hit = fused.entry(*id).or_insert_with(|| empty_hit(*id));
        hit.semantic_rank = Some(i + 1);
        hit.score += 1.0 / (RRF_K + (i + 1) as f32);
    }
    let mut hits: Vec<SearchHit> = fused.into_values().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    hits
}

fn empty_hit(id: MessageId) -> SearchHit {
    SearchHit {
        id,
        score: 0.0,
        lexical_rank: None,
        semantic_rank: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use strand_crypto::hasher;
    use strand_types::{ErrorClass, Namespace, Profile};

    fn id(n: u8) -> MessageId {
        MessageId::new(hasher::identify(Namespace::Message, Profile::SelfDescribing, &[n])).unwrap()
    }

    fn thread(n: u8) -> ThreadId {
        ThreadId::new(hasher::identify(Namespace::Thread, Profile::Compact, &[n])).unwrap()
    }

    fn account(n: u8) -> AccountId {
        AccountId::new(hasher::identify(Namespace::Account, Profile::Compact, &[n])).unwrap()
    }

    fn meta(t: u8, a: u8, kind: MessageKind) -> DocMetadata {
        DocMetadata {
            thread_id: thread(t),
            account_id: account(a),
            kind,
            created_at: Utc::now(),
        }
    }

    struct Broken;

    impl EmbeddingBackend for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn embed(&self, _text: &str) -> SearchResult<Vec<f32>> {
            Err(SearchError::Embedding("model offline".into()))
        }
    }

    fn corpus(index: &SearchIndex) {
        index.index(id(1), "database migration failed on staging", meta(1, 1, MessageKind::Text));
        index.index(id(2), "migration of the database finished", meta(1, 2, MessageKind::Text));
        index.index(id(3), "lunch at noon?", meta(2, 1, MessageKind::Text));
        index.index(id(4), "staging database snapshot attached", meta(2, 2, MessageKind::Media));
    }

    fn hashing() -> SearchIndex {
        SearchIndex::with_embedder(Arc::new(HashingEmbedder::default()))
    }

    #[test]
    fn lexical_mode_ranks_with_bm25() {
        let index = hashing();
        corpus(&index);
        let resp = index
            .search("migration", &SearchOptions::new(SearchMode::Lexical))
            .unwrap();
        assert_eq!(resp.mode, SearchMode::Lexical);
        assert!(!resp.degraded);
        let ids: BTreeSet<_> = resp.ids().into_iter().collect();
        assert_eq!(ids, BTreeSet::from([id(1), id(2)]));
        assert!(resp.hits.iter().all(|h| h.lexical_rank.is_some()));
    }

    #[test]
    fn filters_apply_to_every_mode() {
        let index = hashing();
        corpus(&index);
        for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
            let opts = SearchOptions::new(mode).in_thread(thread(2));
            let resp = index.search("database", &opts).unwrap();
            assert!(!resp.hits.is_empty(), "{mode:?}");
            assert!(resp.hits.iter().all(|h| h.id == id(4) || h.id == id(3)), "{mode:?}");

            let opts = SearchOptions::new(mode).of_kind(MessageKind::Media);
            let resp = index.search("database", &opts).unwrap();
            assert_eq!(resp.ids(), vec![id(4)], "{mode:?}");

            let opts = SearchOptions::new(mode).by_account(account(1)).in_thread(thread(1));
            let resp = index.search("database", &opts).unwrap();
            assert_eq!(resp.ids(), vec![id(1)], "{mode:?}");
        }
    }

    #[test]
    fn hybrid_fuses_both_rankings() {
        let index = hashing();
        corpus(&index);
        let resp = index
            .search("database migration", &SearchOptions::new(SearchMode::Hybrid))
            .unwrap();
        assert_eq!(resp.mode, SearchMode::Hybrid);
        let top = &resp.hits[0];
        assert!(top.lexical_rank.is_some() && top.semantic_rank.is_some());
        let best = 2.0 / (RRF_K + 1.0);
        assert!(top.score <= best + f32::EPSILON);
        for pair in resp.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn negation_excludes_semantic_candidates() {
        let index = hashing();
        corpus(&index);
        let resp = index
            .search("database -staging", &SearchOptions::new(SearchMode::Semantic))
            .unwrap();
        assert!(!resp.ids().contains(&id(1)));
        assert!(!resp.ids().contains(&id(4)));
    }

    #[test]
    fn failing_backend_keeps_documents_lexical() {
        let index = SearchIndex::with_embedder(Arc::new(Broken));
        let outcome = index.index(id(1), "quarterly report draft", meta(1, 1, MessageKind::Text));
        assert!(outcome.is_degraded());
        assert!(index.contains(&id(1)));

        let resp = index
            .search("report", &SearchOptions::new(SearchMode::Hybrid))
            .unwrap();
        assert!(resp.degraded);
        assert_eq!(resp.mode, SearchMode::Lexical);
        assert_eq!(resp.ids(), vec![id(1)]);
        assert!(resp.warnings[0].starts_with(&ErrorClass::DegradedService.to_string()));
    }

    #[test]
    fn lexical_only_index_degrades_semantic_queries() {
        let index = SearchIndex::lexical_only();
        corpus(&index);
        let resp = index
            .search("lunch", &SearchOptions::new(SearchMode::Semantic))
            .unwrap();
        assert!(resp.degraded);
        assert_eq!(resp.ids(), vec![id(3)]);
    }

    #[test]
    fn removal_and_limits() {
        let index = hashing();
        corpus(&index);
        assert!(index.remove(&id(1)));
        assert!(!index.remove(&id(1)));
        let resp = index
            .search("database", &SearchOptions::new(SearchMode::Hybrid).with_limit(1))
            .unwrap();
        assert_eq!(resp.hits.len(), 1);
        assert_ne!(resp.hits[0].id, id(1));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn invalid_queries_are_structural() {
        let index = hashing();
        let err = index.search("", &SearchOptions::default()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Structural);
        let resp = index.search("the", &SearchOptions::default()).unwrap();
        assert!(resp.hits.is_empty());
    }

    #[test]
    fn semantic_text_drops_operators() {
        assert_eq!(semantic_text("alpha AND beta NOT gamma -delta"), "alpha beta");
        assert_eq!("HYBRID".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
    }
}
