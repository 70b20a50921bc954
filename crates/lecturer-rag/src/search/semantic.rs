use ndarray::{Array1, Array2};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{BuildOutcome, IndexSnapshot, Matcher, MatcherMode, SearchHit};
use crate::embeddings::{l2_normalize, EmbeddingModel};
use crate::error::AssistError;
use crate::knowledge::KnowledgeRecord;

/// Exact inner-product search over L2-normalized question embeddings.
pub struct SemanticMatcher {
    embedder: Arc<dyn EmbeddingModel>,
}

impl SemanticMatcher {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self { embedder }
    }

    /// Embed every question, one by one if the batch call fails, so that
    /// only the records that really cannot be embedded are dropped.
    fn embed_questions(&self, records: &[KnowledgeRecord]) -> Vec<Option<Vec<f32>>> {
        let dim = self.embedder.dimension();
        let questions: Vec<&str> = records.iter().map(|r| r.question.as_str()).collect();

        let valid = |v: Vec<f32>| (v.len() == dim).then(|| l2_normalize(v));

        match self.embedder.embed_batch(&questions) {
            Ok(vectors) if vectors.len() == records.len() => {
                vectors.into_iter().map(valid).collect()
            }
            Ok(vectors) => {
                warn!(
                    expected = records.len(),
                    got = vectors.len(),
                    "Batch embedding returned wrong count, retrying per record"
                );
                self.embed_each(&questions, valid)
            }
            Err(e) => {
                warn!(error = %e, "Batch embedding failed, retrying per record");
                self.embed_each(&questions, valid)
            }
        }
    }

    fn embed_each(
        &self,
        questions: &[&str],
        valid: impl Fn(Vec<f32>) -> Option<Vec<f32>>,
    ) -> Vec<Option<Vec<f32>>> {
        questions
            .iter()
            .map(|q| self.embedder.embed(q).ok().and_then(&valid))
            .collect()
    }
}

impl Matcher for SemanticMatcher {
    fn mode(&self) -> MatcherMode {
        MatcherMode::Semantic
    }

    fn build(&self, records: Vec<KnowledgeRecord>) -> BuildOutcome {
        let total = records.len();
        if total == 0 {
            return BuildOutcome {
                snapshot: IndexSnapshot::empty(),
                error: None,
            };
        }

        let dim = self.embedder.dimension();
        let embedded = self.embed_questions(&records);

        let mut kept = Vec::with_capacity(total);
        let mut flat = Vec::with_capacity(total * dim);
        for (record, vector) in records.iter().zip(embedded) {
            if let Some(vector) = vector {
                kept.push(record.clone());
                flat.extend(vector);
            }
        }
        let dropped = total - kept.len();

        if kept.is_empty() {
            warn!(total, "No record could be embedded, index is keyword-only");
            return BuildOutcome {
                snapshot: IndexSnapshot::keyword_only(records),
                error: Some(AssistError::IndexBuild {
                    reason: "embedding backend failed for every record".into(),
                    dropped,
                    total,
                }),
            };
        }

        let vectors = match Array2::from_shape_vec((kept.len(), dim), flat) {
            Ok(vectors) => vectors,
            Err(e) => {
                return BuildOutcome {
                    snapshot: IndexSnapshot::keyword_only(records),
                    error: Some(AssistError::IndexBuild {
                        reason: format!("embedding matrix: {}", e),
                        dropped: total,
                        total,
                    }),
                }
            }
        };

        let error = (dropped > 0).then(|| AssistError::IndexBuild {
            reason: "some questions could not be embedded".into(),
            dropped,
            total,
        });
        debug!(records = kept.len(), dropped, "Built semantic index");

        BuildOutcome {
            snapshot: IndexSnapshot::with_vectors(kept, vectors),
            error,
        }
    }

    fn search(&self, snapshot: &IndexSnapshot, query: &str, top_k: usize) -> Vec<SearchHit> {
        let Some(vectors) = snapshot.vectors() else {
            debug!("No vector index, using keyword search");
            return snapshot.keyword_hit(query).into_iter().collect();
        };
        if snapshot.is_empty() {
            return Vec::new();
        }

        let query_vec = match self.embedder.embed(query) {
            Ok(v) if v.len() == vectors.ncols() => Array1::from(l2_normalize(v)),
            Ok(v) => {
                warn!(
                    expected = vectors.ncols(),
                    got = v.len(),
                    "Query embedding has wrong dimension, using keyword search"
                );
                return snapshot.keyword_hit(query).into_iter().collect();
            }
            Err(e) => {
                warn!(error = %e, "Query embedding failed, using keyword search");
                return snapshot.keyword_hit(query).into_iter().collect();
            }
        };

        let scores = vectors.dot(&query_vec);
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        // Stable sort keeps load order among equal scores.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(position, similarity)| SearchHit {
                record: snapshot.records()[position].clone(),
                similarity: similarity.clamp(-1.0, 1.0),
                position,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::{BrokenEmbedder, HashEmbedder, PickyEmbedder};
    use crate::knowledge::SourcePriority;

    fn records() -> Vec<KnowledgeRecord> {
        ["ngân hàng đề thi", "kê khai nhiệm vụ năm học", "tạp chí khoa học", "ngân hàng đề thi"]
            .iter()
            .map(|q| KnowledgeRecord::new(*q, format!("trả lời {}", q), "Giảng viên", SourcePriority::Dataset))
            .collect()
    }

    #[test]
    fn exact_question_ranks_first_and_ties_keep_load_order() {
        let matcher = SemanticMatcher::new(Arc::new(HashEmbedder { dim: 64 }));
        let outcome = matcher.build(records());
        assert!(outcome.error.is_none());
        let hits = matcher.search(&outcome.snapshot, "ngân hàng đề thi", 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 3);
        assert!((hits[0].similarity - 1.0).abs() < 1e-5);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn unembeddable_records_are_dropped() {
        let matcher = SemanticMatcher::new(Arc::new(PickyEmbedder {
            inner: HashEmbedder { dim: 32 },
            poison: "tạp chí",
        }));
        let outcome = matcher.build(records());
        assert!(matches!(
            outcome.error,
            Some(AssistError::IndexBuild { dropped: 1, total: 4, .. })
        ));
        assert_eq!(outcome.snapshot.len(), 3);
        assert_eq!(outcome.snapshot.vectors().map(|v| v.nrows()), Some(3));
    }

    #[test]
    fn total_embedding_failure_keeps_keyword_index() {
        let matcher = SemanticMatcher::new(Arc::new(BrokenEmbedder));
        let outcome = matcher.build(records());
        assert!(outcome.error.is_some());
        assert_eq!(outcome.snapshot.len(), 4);
        assert!(outcome.snapshot.vectors().is_none());

        let hits = matcher.search(&outcome.snapshot, "kê khai nhiệm vụ", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 1);
    }
}
