use ndarray::Array2;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use super::keyword::KeywordIndex;
use super::{KeywordMatcher, Matcher, MatcherMode, SearchHit, SemanticMatcher};
use crate::embeddings::EmbeddingModel;
use crate::error::AssistResult;
use crate::knowledge::KnowledgeRecord;

/// An immutable, fully built view of the knowledge base.
///
/// When `vectors` is present it has exactly one row per record.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    records: Vec<KnowledgeRecord>,
    keywords: KeywordIndex,
    vectors: Option<Array2<f32>>,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn keyword_only(records: Vec<KnowledgeRecord>) -> Self {
        Self {
            keywords: KeywordIndex::build(&records),
            records,
            vectors: None,
        }
    }

    pub fn with_vectors(records: Vec<KnowledgeRecord>, vectors: Array2<f32>) -> Self {
        debug_assert_eq!(records.len(), vectors.nrows());
        Self {
            keywords: KeywordIndex::build(&records),
            records,
            vectors: Some(vectors),
        }
    }

    pub fn records(&self) -> &[KnowledgeRecord] {
        &self.records
    }

    pub fn vectors(&self) -> Option<&Array2<f32>> {
        self.vectors.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keyword_hit(&self, query: &str) -> Option<SearchHit> {
        let (position, score) = self.keywords.best_match(query);
        position.map(|position| SearchHit {
            record: self.records[position].clone(),
            similarity: score,
            position,
        })
    }
}

/// The searchable knowledge base.
///
/// Readers clone an `Arc` to the current snapshot; `load` builds a new
/// snapshot off to the side and swaps it in, so a half-built index is
/// never visible.
pub struct KnowledgeIndex {
    matcher: Box<dyn Matcher>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl KnowledgeIndex {
    pub fn new(matcher: Box<dyn Matcher>) -> Self {
        Self {
            matcher,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty())),
        }
    }

    pub fn keyword() -> Self {
        Self::new(Box::new(KeywordMatcher::new()))
    }

    pub fn semantic(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self::new(Box::new(SemanticMatcher::new(embedder)))
    }

    /// Replace the record set. The new snapshot is published even when some
    /// records had to be dropped; the drop is reported as `IndexBuild`.
    pub fn load(&self, records: Vec<KnowledgeRecord>) -> AssistResult<usize> {
        let total = records.len();
        let outcome = self.matcher.build(records);
        let indexed = outcome.snapshot.len();
        *self.snapshot.write() = Arc::new(outcome.snapshot);

        match outcome.error {
            Some(e) => {
                warn!(error = %e, indexed, "Knowledge index built with errors");
                Err(e)
            }
            None => {
                info!(records = total, mode = ?self.matcher.mode(), "Knowledge index rebuilt");
                Ok(indexed)
            }
        }
    }

    /// Top `top_k` hits, best first. Never fails; degrades to keyword search.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let snapshot = self.current();
        if snapshot.is_empty() {
            warn!("Knowledge index is empty, using keyword search");
            return snapshot.keyword_hit(query).into_iter().collect();
        }
        self.matcher.search(&snapshot, query, top_k)
    }

    /// Best record by token overlap and its score in [0, 1].
    pub fn keyword_search(&self, query: &str) -> (Option<KnowledgeRecord>, f32) {
        match self.current().keyword_hit(query) {
            Some(hit) => (Some(hit.record), hit.similarity),
            None => (None, 0.0),
        }
    }

    pub fn current(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn mode(&self) -> MatcherMode {
        self.matcher.mode()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::{BrokenEmbedder, HashEmbedder};
    use crate::error::AssistError;
    use crate::knowledge::sources::builtin_records;

    #[test]
    fn empty_index_falls_back_to_keyword_search() {
        let index = KnowledgeIndex::semantic(Arc::new(HashEmbedder { dim: 32 }));
        assert!(index.search("ngân hàng đề thi", 3).is_empty());
        assert_eq!(index.keyword_search("ngân hàng đề thi"), (None, 0.0));
    }

    #[test]
    fn load_swaps_in_new_records() {
        let index = KnowledgeIndex::keyword();
        assert_eq!(index.load(builtin_records()).unwrap(), 4);
        let before = index.current();
        index.load(builtin_records()[..1].to_vec()).unwrap();
        assert_eq!(before.len(), 4);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn semantic_search_uses_vectors() {
        let index = KnowledgeIndex::semantic(Arc::new(HashEmbedder { dim: 64 }));
        index.load(builtin_records()).unwrap();
        let hits = index.search("tạp chí khoa học", 2);
        assert_eq!(hits[0].record.question, "tạp chí khoa học");
        assert_eq!(index.mode(), MatcherMode::Semantic);
    }

    #[test]
    fn broken_backend_degrades_to_keywords() {
        let index = KnowledgeIndex::semantic(Arc::new(BrokenEmbedder));
        let result = index.load(builtin_records());
        assert!(matches!(result, Err(AssistError::IndexBuild { dropped: 4, total: 4, .. })));
        let hits = index.search("thi đua khen thưởng", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.question, "thi đua khen thưởng");
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let index = Arc::new(KnowledgeIndex::keyword());
        index.load(builtin_records()).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if i == 0 {
                            index.load(builtin_records()[..2].to_vec()).unwrap();
                            index.load(builtin_records()).unwrap();
                        } else {
                            let len = index.current().len();
                            assert!(len == 2 || len == 4);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
