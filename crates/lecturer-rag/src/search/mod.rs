pub mod keyword;
pub mod knowledge_index;
pub mod normalizer;
pub mod semantic;

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeRecord;

pub use keyword::{KeywordIndex, KeywordMatcher};
pub use knowledge_index::{IndexSnapshot, KnowledgeIndex};
pub use normalizer::TextNormalizer;
pub use semantic::SemanticMatcher;

/// A retrieved record with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: KnowledgeRecord,
    /// Cosine similarity in [-1, 1] for semantic hits, overlap score in [0, 1] for keyword hits.
    pub similarity: f32,
    /// Position of the record in load order.
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherMode {
    Semantic,
    Keyword,
}

/// Outcome of building a snapshot: the snapshot to publish plus the error
/// to report when some records could not be embedded.
pub struct BuildOutcome {
    pub snapshot: IndexSnapshot,
    pub error: Option<crate::error::AssistError>,
}

/// Retrieval strategy, chosen once when the index is constructed.
pub trait Matcher: Send + Sync {
    fn mode(&self) -> MatcherMode;

    /// Build a complete snapshot for `records`. Never publishes anything itself.
    fn build(&self, records: Vec<KnowledgeRecord>) -> BuildOutcome;

    /// Ranked hits for `query`, best first. Must not fail.
    fn search(&self, snapshot: &IndexSnapshot, query: &str, top_k: usize) -> Vec<SearchHit>;
}
