//! The lecturer assistant service: owns the knowledge index, classifier,
//! decision policy, memory and generation backend, and runs the per-query
//! pipeline.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::embeddings::{EmbeddingModel, SbertEmbeddings};
use crate::error::{AssistError, AssistResult, QueryRejection};
use crate::knowledge::{
    merge_sources, BuiltinSource, CsvSource, JsonSource, KnowledgeRecord, KnowledgeSource,
};
use crate::llm::{GeminiGenerator, GenerationGuard, TextGenerator};
use crate::memory::{ConversationContext, ConversationMemory};
use crate::rag::decision::{DecisionContext, DecisionEngine, DecisionKind, DecisionPayload, Retrieval};
use crate::rag::intent::{IntentClassifier, IntentResult};
use crate::rag::prompts;
use crate::rag::strategy::{ResponseStrategySelector, StrategyKind};
use crate::search::normalizer::clean;
use crate::search::{KnowledgeIndex, SearchHit};
use crate::types::{AssistantStatus, QueryResponse, SourceRef};

const TOO_LONG_REPLY: &str = "Dạ thầy/cô, câu hỏi hơi dài, thầy/cô có thể tóm tắt ngắn gọn hơn để em hỗ trợ chính xác không ạ? 🎓";

pub struct LecturerAssistant {
    config: AssistantConfig,
    index: KnowledgeIndex,
    classifier: IntentClassifier,
    decisions: DecisionEngine,
    selector: ResponseStrategySelector,
    memory: ConversationMemory,
    generation: Option<GenerationGuard>,
}

/// Wires collaborators into a [`LecturerAssistant`]. Anything not supplied
/// runs in its degraded mode: keyword search, keyword-only intents and
/// templated replies.
pub struct AssistantBuilder {
    config: AssistantConfig,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    generation: Option<GenerationGuard>,
}

impl AssistantBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingModel>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generation = Some(GenerationGuard::new(
            generator,
            self.config.generation_timeout(),
            self.config.generation.max_retries,
        ));
        self
    }

    pub fn generation_guard(mut self, guard: GenerationGuard) -> Self {
        self.generation = Some(guard);
        self
    }

    pub fn build(self) -> AssistResult<LecturerAssistant> {
        let config = self.config;
        config.validate()?;

        let (index, classifier) = match self.embedder {
            Some(embedder) => (
                KnowledgeIndex::semantic(Arc::clone(&embedder)),
                IntentClassifier::with_embedder(config.intent.clone(), embedder),
            ),
            None => (
                KnowledgeIndex::keyword(),
                IntentClassifier::new(config.intent.clone()),
            ),
        };

        info!(
            matcher = ?index.mode(),
            classifier = ?classifier.mode(),
            generator = self.generation.as_ref().map(|g| g.backend_name()),
            "Lecturer assistant initialized"
        );

        Ok(LecturerAssistant {
            decisions: DecisionEngine::new(config.thresholds, config.memory.sticky_window),
            selector: ResponseStrategySelector::new(),
            memory: ConversationMemory::new(config.memory.clone()),
            index,
            classifier,
            generation: self.generation,
            config,
        })
    }
}

impl LecturerAssistant {
    pub fn builder(config: AssistantConfig) -> AssistantBuilder {
        AssistantBuilder {
            config,
            embedder: None,
            generation: None,
        }
    }

    /// Build with the backends the configuration points at. A missing
    /// embedding model or API key is logged and the assistant runs without it.
    pub fn from_config(config: AssistantConfig) -> AssistResult<Self> {
        let mut builder = Self::builder(config.clone());

        if config.embedding.enabled {
            match SbertEmbeddings::from_settings(&config.embedding) {
                Ok(embedder) => builder = builder.embedder(Arc::new(embedder)),
                Err(e) => warn!(error = %e, "Embedding model not available, using keyword search"),
            }
        }

        if config.generation.enabled {
            match GeminiGenerator::from_config(&config.generation) {
                Ok(generator) => builder = builder.generator(Arc::new(generator)),
                Err(e) => warn!(error = %e, "Text generation not available, using templates"),
            }
        }

        builder.build()
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Load the configured knowledge sources, curated first.
    ///
    /// Source failures are logged and skipped. An index build error is
    /// returned after the (partial or keyword-only) index has been published.
    pub fn load_knowledge(&self) -> AssistResult<usize> {
        let knowledge = &self.config.knowledge;
        let mut sources: Vec<Box<dyn KnowledgeSource>> = Vec::new();
        if let Some(path) = knowledge.curated_path.as_ref().filter(|p| p.exists()) {
            sources.push(Box::new(JsonSource::new(path, knowledge.default_category.clone())));
        }
        if let Some(path) = knowledge.dataset_path.as_ref().filter(|p| p.exists()) {
            sources.push(Box::new(CsvSource::new(path, knowledge.default_category.clone())));
        }
        if sources.is_empty() {
            sources.push(Box::new(BuiltinSource));
        }

        let (records, failures) = merge_sources(&sources);
        for failure in &failures {
            warn!(error = %failure, "Skipped knowledge source");
        }
        self.load_records(records)
    }

    /// Replace the knowledge base with `records`.
    pub fn load_records(&self, records: Vec<KnowledgeRecord>) -> AssistResult<usize> {
        self.index.load(records)
    }

    /// Answer one query. Never fails: invalid input, backend outages and
    /// timeouts all come back as a well-formed [`QueryResponse`].
    pub async fn process_query(&self, query: &str, session_id: &str) -> QueryResponse {
        let started = Instant::now();
        let query = clean(query);

        if let Err(rejection) = self.validate_query(&query) {
            debug!(session_id, error = %AssistError::from(rejection), "Query rejected");
            let response_text = match rejection {
                QueryRejection::TooLong { .. } => TOO_LONG_REPLY.to_string(),
                QueryRejection::Empty | QueryRejection::TooShort { .. } => {
                    prompts::GREETING_PROMPT.to_string()
                }
            };
            return QueryResponse {
                session_id: session_id.to_string(),
                response_text,
                confidence: 0.0,
                decision_kind: None,
                intent: self.classifier.classify(""),
                entities: Default::default(),
                sources: Vec::new(),
                strategy: None,
                generated: false,
                rejection: Some(rejection),
                processing_time_ms: started.elapsed().as_millis() as u64,
            };
        }

        let analysis = self.classifier.analyze(&query);
        let hits = self.index.search(&query, self.config.search.top_k);
        let retrieval = hits
            .first()
            .map(|hit| Retrieval::new(Some(hit.record.answer.clone()), hit.similarity))
            .unwrap_or_default();

        let context = self.memory.get_context(session_id);
        let decision = self.decisions.decide(&query, &retrieval, &analysis.intent, &context);

        let strategy = decision.should_respond.then(|| {
            self.selector.select(
                &query,
                context.last_query(),
                retrieval.similarity,
                &analysis.intent,
            )
        });

        let (response_text, generated) = self
            .compose_response(&query, &decision, strategy, &analysis.intent, &context)
            .await;

        self.memory.append(
            session_id,
            &query,
            &response_text,
            &analysis.intent.intent,
            analysis.entities.clone(),
            decision.kind,
            self.decisions.is_in_scope(&query),
        );

        info!(
            session_id,
            decision = decision.kind.as_str(),
            similarity = retrieval.similarity,
            intent = %analysis.intent.intent,
            strategy = strategy.map(|s| s.as_str()),
            generated,
            "Query processed"
        );

        QueryResponse {
            session_id: session_id.to_string(),
            response_text,
            confidence: retrieval.similarity,
            decision_kind: Some(decision.kind),
            intent: analysis.intent,
            entities: analysis.entities,
            sources: self.sources(&hits),
            strategy,
            generated,
            rejection: None,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn validate_query(&self, query: &str) -> Result<(), QueryRejection> {
        let limits = &self.config.query;
        let chars = query.chars().count();
        if chars == 0 {
            Err(QueryRejection::Empty)
        } else if chars < limits.min_chars {
            Err(QueryRejection::TooShort { min: limits.min_chars })
        } else if chars > limits.max_chars {
            Err(QueryRejection::TooLong { max: limits.max_chars })
        } else {
            Ok(())
        }
    }

    /// Generated text for elaborations, templates for everything else and
    /// for any generation failure.
    async fn compose_response(
        &self,
        query: &str,
        decision: &DecisionContext,
        strategy: Option<StrategyKind>,
        intent: &IntentResult,
        context: &ConversationContext,
    ) -> (String, bool) {
        let templated = || prompts::templated_response(decision, intent, context);

        let (DecisionPayload::Enhance { answer, .. }, Some(strategy), Some(guard)) =
            (&decision.payload, strategy, self.generation.as_ref())
        else {
            return (templated(), false);
        };

        let Some(profile) = self.config.strategies.resolve(strategy) else {
            return (templated(), false);
        };
        let prompt =
            prompts::build_prompt(&self.config.strategies, strategy, query, answer, context);

        match guard.generate(&prompt, &profile.generation).await {
            Ok(text) => (prompts::polish(&text), true),
            Err(e) => {
                warn!(error = %e, strategy = strategy.as_str(), "Falling back to templated response");
                (templated(), false)
            }
        }
    }

    fn sources(&self, hits: &[SearchHit]) -> Vec<SourceRef> {
        hits.iter()
            .filter(|h| h.similarity > self.config.search.source_min_similarity)
            .take(self.config.search.max_sources)
            .map(SourceRef::from)
            .collect()
    }

    pub fn status(&self) -> AssistantStatus {
        AssistantStatus {
            matcher_mode: self.index.mode(),
            knowledge_records: self.index.len(),
            classifier_mode: self.classifier.mode(),
            intents: self.classifier.catalog_len(),
            generator: self.generation.as_ref().map(|g| g.backend_name().to_string()),
            active_sessions: self.memory.session_count(),
            thresholds: self.decisions.thresholds(),
        }
    }

    /// Recent context of one session; empty for an unknown id.
    pub fn conversation(&self, session_id: &str) -> ConversationContext {
        self.memory.get_context(session_id)
    }

    /// Clear one session, or all of them with `None`.
    pub fn clear_memory(&self, session_id: Option<&str>) {
        self.memory.clear(session_id);
    }

    /// Decision recorded for the latest turn of `session_id`.
    pub fn last_decision(&self, session_id: &str) -> Option<DecisionKind> {
        self.memory.get_context(session_id).history.last().map(|i| i.decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::{BrokenEmbedder, HashEmbedder};
    use crate::knowledge::{sources::builtin_records, SourcePriority};
    use crate::llm::testing::{CannedGenerator, SleepyGenerator};
    use crate::search::MatcherMode;
    use std::time::Duration;

    fn records() -> Vec<KnowledgeRecord> {
        let mut records = vec![
            KnowledgeRecord::new(
                "học phí bao nhiêu",
                "Học phí khoảng 20 triệu mỗi năm tùy ngành.",
                "Tài chính",
                SourcePriority::Curated,
            ),
            KnowledgeRecord::new(
                "giờ chuẩn giảng dạy của giảng viên cơ hữu",
                "Giảng viên cơ hữu thực hiện 270 giờ chuẩn mỗi năm học.",
                "Giảng viên",
                SourcePriority::Curated,
            ),
        ];
        records.extend(builtin_records());
        records
    }

    fn assistant() -> LecturerAssistant {
        let assistant = LecturerAssistant::builder(AssistantConfig::default())
            .embedder(Arc::new(HashEmbedder { dim: 4096 }))
            .build()
            .unwrap();
        assistant.load_records(records()).unwrap();
        assistant
    }

    #[tokio::test]
    async fn confident_match_is_answered_from_knowledge() {
        let assistant = assistant();
        let response = assistant.process_query("Học phí bao nhiêu?", "s1").await;
        assert_eq!(response.decision_kind, Some(DecisionKind::UseRetrievalDirect));
        assert!(response.confidence > 0.7);
        assert!(response.response_text.contains("20 triệu"));
        assert!(response.response_text.starts_with(prompts::OPENER));
        assert_eq!(response.sources[0].question, "học phí bao nhiêu");
        assert!(response.sources.len() <= 2);
        assert!(!response.generated);
    }

    #[tokio::test]
    async fn off_topic_query_is_refused_and_remembered() {
        let assistant = assistant();
        let response = assistant.process_query("thời tiết hôm nay", "s1").await;
        assert_eq!(response.decision_kind, Some(DecisionKind::RejectOutOfScope));
        assert!(response.strategy.is_none());
        assert!(response.response_text.contains("chỉ hỗ trợ"));
        assert_eq!(assistant.last_decision("s1"), Some(DecisionKind::RejectOutOfScope));
    }

    #[tokio::test]
    async fn follow_up_uses_session_context() {
        let assistant = assistant();
        assistant.process_query("ngân hàng đề thi nộp khi nào", "s1").await;
        let response = assistant.process_query("thời tiết hôm nay", "s1").await;
        assert_ne!(response.decision_kind, Some(DecisionKind::RejectOutOfScope));

        let other = assistant.process_query("thời tiết hôm nay", "s2").await;
        assert_eq!(other.decision_kind, Some(DecisionKind::RejectOutOfScope));
    }

    #[tokio::test]
    async fn invalid_queries_are_rejected_politely() {
        let assistant = assistant();
        let empty = assistant.process_query("   ", "s1").await;
        assert_eq!(empty.rejection, Some(QueryRejection::Empty));
        assert_eq!(empty.response_text, prompts::GREETING_PROMPT);

        let short = assistant.process_query("a", "s1").await;
        assert_eq!(short.rejection, Some(QueryRejection::TooShort { min: 2 }));

        let long = assistant.process_query(&"học phí ".repeat(300), "s1").await;
        assert_eq!(long.rejection, Some(QueryRejection::TooLong { max: 1000 }));
        assert!(assistant.conversation("s1").history.is_empty());
    }

    #[tokio::test]
    async fn medium_match_is_generated_and_polished() {
        let generator = Arc::new(CannedGenerator::new("**Giờ chuẩn** là 270 giờ. Bạn nhớ nộp đúng hạn."));
        let assistant = LecturerAssistant::builder(AssistantConfig::default())
            .generator(generator.clone())
            .build()
            .unwrap();
        assistant
            .load_records(vec![KnowledgeRecord::new(
                "giờ chuẩn giảng viên",
                "Mỗi năm 270 giờ chuẩn.",
                "Giảng viên",
                SourcePriority::Curated,
            )])
            .unwrap();

        // Keyword overlap: question 4/5, answer 2/8 -> (1.6 + 0.25) / 3 ~ 0.62.
        let response = assistant.process_query("giờ chuẩn giảng viên cơ", "s1").await;
        assert_eq!(response.decision_kind, Some(DecisionKind::EnhanceRetrieval));
        assert!(response.generated);
        assert!(response.response_text.starts_with("Dạ thầy/cô, Giờ chuẩn là 270 giờ."));
        assert!(response.response_text.ends_with(prompts::CLOSING));
        assert!(!response.response_text.contains("Bạn"));
        let prompt = generator.last_prompt.lock().clone().unwrap();
        assert!(prompt.contains("Mỗi năm 270 giờ chuẩn."));
    }

    #[tokio::test]
    async fn generation_timeout_falls_back_to_template() {
        let guard = GenerationGuard::new(Arc::new(SleepyGenerator), Duration::from_millis(50), 0);
        let assistant = LecturerAssistant::builder(AssistantConfig::default())
            .generation_guard(guard)
            .build()
            .unwrap();
        assistant
            .load_records(vec![KnowledgeRecord::new(
                "giờ chuẩn giảng viên",
                "Mỗi năm 270 giờ chuẩn.",
                "Giảng viên",
                SourcePriority::Curated,
            )])
            .unwrap();

        let response = assistant.process_query("giờ chuẩn giảng viên cơ", "s1").await;
        assert_eq!(response.decision_kind, Some(DecisionKind::EnhanceRetrieval));
        assert!(!response.generated);
        assert_eq!(response.response_text, prompts::direct_answer("Mỗi năm 270 giờ chuẩn."));
    }

    #[tokio::test]
    async fn builder_applies_configured_timeout() {
        let mut config = AssistantConfig::default();
        config.generation.timeout_secs = 1;
        config.generation.max_retries = 0;
        let assistant = LecturerAssistant::builder(config)
            .generator(Arc::new(SleepyGenerator))
            .build()
            .unwrap();
        assistant
            .load_records(vec![KnowledgeRecord::new(
                "giờ chuẩn giảng viên",
                "Mỗi năm 270 giờ chuẩn.",
                "Giảng viên",
                SourcePriority::Curated,
            )])
            .unwrap();

        let started = Instant::now();
        let response = assistant.process_query("giờ chuẩn giảng viên cơ", "s1").await;
        assert!(!response.generated);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(assistant.status().generator.as_deref(), Some("sleepy"));
    }

    #[tokio::test]
    async fn unknown_answer_routes_to_department() {
        let assistant = assistant();
        let response = assistant.process_query("lịch họp hội đồng tuần sau", "s1").await;
        assert_eq!(response.decision_kind, Some(DecisionKind::SayUnknown));
        assert!(response.response_text.contains("info@bdu.edu.vn"));
    }

    #[tokio::test]
    async fn broken_embedder_still_answers() {
        let assistant = LecturerAssistant::builder(AssistantConfig::default())
            .embedder(Arc::new(BrokenEmbedder))
            .build()
            .unwrap();
        assert!(assistant.load_records(records()).is_err());
        let response = assistant.process_query("thi đua khen thưởng", "s1").await;
        assert!(response.decision_kind.is_some());
        assert!(!response.response_text.is_empty());
        assert_eq!(assistant.status().knowledge_records, records().len());
    }

    #[tokio::test]
    async fn empty_index_does_not_fail() {
        let assistant = LecturerAssistant::builder(AssistantConfig::default()).build().unwrap();
        let response = assistant.process_query("học phí bao nhiêu?", "s1").await;
        assert_eq!(response.decision_kind, Some(DecisionKind::SayUnknown));
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn status_and_memory_controls() {
        let assistant = assistant();
        assistant.process_query("học phí bao nhiêu?", "a").await;
        assistant.process_query("học phí bao nhiêu?", "b").await;

        let status = assistant.status();
        assert_eq!(status.matcher_mode, MatcherMode::Semantic);
        assert_eq!(status.knowledge_records, records().len());
        assert_eq!(status.active_sessions, 2);
        assert!(status.generator.is_none());

        assert_eq!(assistant.conversation("a").history.len(), 1);
        assistant.clear_memory(Some("a"));
        assert!(assistant.conversation("a").history.is_empty());
        assistant.clear_memory(None);
        assert_eq!(assistant.status().active_sessions, 0);
    }

    #[test]
    fn builtin_knowledge_loads_without_files() {
        let mut config = AssistantConfig::default();
        config.knowledge.curated_path = None;
        config.knowledge.dataset_path = None;
        let assistant = LecturerAssistant::builder(config).build().unwrap();
        assert_eq!(assistant.load_knowledge().unwrap(), 4);
    }
}
