use rayon::prelude::*;
use std::collections::HashSet;

use super::normalizer::{fold_diacritics, tokenize};
use super::{BuildOutcome, IndexSnapshot, Matcher, MatcherMode, SearchHit};
use crate::knowledge::KnowledgeRecord;

fn token_set(text: &str) -> HashSet<String> {
    tokenize(&fold_diacritics(&text.to_lowercase()))
        .into_iter()
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let common = a.intersection(b).count();
    if common == 0 {
        return 0.0;
    }
    common as f32 / a.union(b).count() as f32
}

/// Pre-tokenized questions and answers, diacritics folded.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    entries: Vec<(HashSet<String>, HashSet<String>)>,
}

impl KeywordIndex {
    pub fn build(records: &[KnowledgeRecord]) -> Self {
        let entries = records
            .par_iter()
            .map(|r| (token_set(&r.question), token_set(&r.answer)))
            .collect();
        Self { entries }
    }

    /// Best record by question/answer token overlap.
    ///
    /// Score is `(2 * jaccard(query, question) + jaccard(query, answer)) / 3`,
    /// so it stays in [0, 1]. Ties keep the earlier record. `(None, 0.0)`
    /// when nothing overlaps.
    pub fn best_match(&self, query: &str) -> (Option<usize>, f32) {
        let query_tokens = token_set(query);
        if query_tokens.is_empty() {
            return (None, 0.0);
        }

        let mut best = None;
        let mut best_score = 0.0f32;
        for (position, (question, answer)) in self.entries.iter().enumerate() {
            let score =
                (2.0 * jaccard(&query_tokens, question) + jaccard(&query_tokens, answer)) / 3.0;
            if score > best_score {
                best_score = score;
                best = Some(position);
            }
        }
        (best, best_score)
    }
}

/// Token-overlap retrieval, used when no embedding backend is available.
#[derive(Debug, Default)]
pub struct KeywordMatcher;

impl KeywordMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Matcher for KeywordMatcher {
    fn mode(&self) -> MatcherMode {
        MatcherMode::Keyword
    }

    fn build(&self, records: Vec<KnowledgeRecord>) -> BuildOutcome {
        BuildOutcome {
            snapshot: IndexSnapshot::keyword_only(records),
            error: None,
        }
    }

    fn search(&self, snapshot: &IndexSnapshot, query: &str, _top_k: usize) -> Vec<SearchHit> {
        snapshot.keyword_hit(query).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::SourcePriority;

    fn records() -> Vec<KnowledgeRecord> {
        vec![
            KnowledgeRecord::new("học phí bao nhiêu", "Học phí khoảng 20 triệu", "Tài chính", SourcePriority::Dataset),
            KnowledgeRecord::new("nộp ngân hàng đề thi", "Nộp về Phòng Khảo thí", "Giảng viên", SourcePriority::Dataset),
            KnowledgeRecord::new("học phí bao nhiêu", "Bản sao", "Tài chính", SourcePriority::Dataset),
        ]
    }

    #[test]
    fn question_overlap_wins() {
        let index = KeywordIndex::build(&records());
        let (best, score) = index.best_match("ngân hàng đề thi nộp khi nào");
        assert_eq!(best, Some(1));
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn ties_keep_first_record() {
        let index = KeywordIndex::build(&records());
        let (best, _) = index.best_match("học phí bao nhiêu");
        assert_eq!(best, Some(0));
    }

    #[test]
    fn unaccented_queries_match() {
        let index = KeywordIndex::build(&records());
        assert_eq!(index.best_match("hoc phi").0, Some(0));
    }

    #[test]
    fn no_overlap_returns_none() {
        let index = KeywordIndex::build(&records());
        assert_eq!(index.best_match("thời tiết"), (None, 0.0));
        assert_eq!(index.best_match(""), (None, 0.0));
    }

    #[test]
    fn exact_question_scores_at_most_one() {
        let records = vec![KnowledgeRecord::new("đề thi", "đề thi", "x", SourcePriority::Dataset)];
        let (_, score) = KeywordIndex::build(&records).best_match("đề thi");
        assert!((score - 1.0).abs() < 1e-6);
    }
}
