use serde::{Deserialize, Serialize};

use crate::config::TrustThresholds;
use crate::error::QueryRejection;
use crate::knowledge::KnowledgeRecord;
use crate::rag::decision::DecisionKind;
use crate::rag::entities::EntityBag;
use crate::rag::intent::{ClassifierMode, IntentResult};
use crate::rag::strategy::StrategyKind;
use crate::search::{MatcherMode, SearchHit};

/// A knowledge record that backed a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub question: String,
    pub category: String,
    pub similarity: f32,
}

impl From<&SearchHit> for SourceRef {
    fn from(hit: &SearchHit) -> Self {
        let KnowledgeRecord {
            question, category, ..
        } = &hit.record;
        Self {
            question: question.clone(),
            category: category.clone(),
            similarity: hit.similarity,
        }
    }
}

/// Result of one `process_query` call. Always well formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub session_id: String,
    pub response_text: String,
    /// Similarity of the best retrieved record, 0 when nothing was retrieved.
    pub confidence: f32,
    /// `None` when the query was rejected before entering the pipeline.
    pub decision_kind: Option<DecisionKind>,
    pub intent: IntentResult,
    pub entities: EntityBag,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    /// Whether `response_text` came from the text generator.
    pub generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<QueryRejection>,
    pub processing_time_ms: u64,
}

impl QueryResponse {
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

/// Snapshot of the assistant's runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantStatus {
    pub matcher_mode: MatcherMode,
    pub knowledge_records: usize,
    pub classifier_mode: ClassifierMode,
    pub intents: usize,
    /// Name of the text generation backend, if any.
    pub generator: Option<String>,
    pub active_sessions: usize,
    pub thresholds: TrustThresholds,
}
