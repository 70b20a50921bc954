//! Intent classification over a fixed catalog of lecturer intents.
//!
//! Scoring is keyword driven: every normalized variant of the query is scored
//! against every intent, contextual boosts are added, and when an embedding
//! backend is present the score is blended with the cosine similarity between
//! the query and a synthesized description of the intent.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use super::entities::{analyze_signals, EntityBag, EntityExtractor, QuerySignals};
use crate::config::IntentConfig;
use crate::embeddings::EmbeddingModel;
use crate::search::normalizer::{clean, tokenize, TermPosition, TermSet, TextNormalizer};

pub const GENERAL_INTENT: &str = "general";
pub const GREETING_INTENT: &str = "greeting";
pub const CLARIFICATION_INTENT: &str = "clarification_needed";

const EXACT_WEIGHT: f32 = 2.0;
const EDGE_WEIGHT: f32 = 1.5;
const INNER_WEIGHT: f32 = 1.0;
const PRIORITY_WEIGHT: f32 = 2.5;

// ============================================================================
// Catalog
// ============================================================================

/// One entry of the intent catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCategory {
    pub name: String,
    pub keywords: Vec<String>,
    pub confidence_threshold: f32,
    pub description: String,
    pub style_tag: String,
    /// Lecturer-specific intents score every keyword hit at the priority weight.
    #[serde(default)]
    pub domain_priority: bool,
}

impl IntentCategory {
    fn new(
        name: &str,
        threshold: f32,
        description: &str,
        style_tag: &str,
        domain_priority: bool,
        keywords: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            confidence_threshold: threshold,
            description: description.to_string(),
            style_tag: style_tag.to_string(),
            domain_priority,
        }
    }

    /// Text embedded to represent the intent: description plus its first keywords.
    fn synthesized_text(&self) -> String {
        let head: Vec<&str> = self.keywords.iter().take(5).map(|k| k.as_str()).collect();
        format!("{} {}", self.description, head.join(" "))
    }
}

pub fn default_catalog() -> Vec<IntentCategory> {
    vec![
        IntentCategory::new(
            GREETING_INTENT,
            0.6,
            "Chào hỏi",
            "friendly",
            false,
            &[
                "xin chào",
                "hello",
                "hi",
                "chào thầy",
                "chào cô",
                "halo",
                "chào",
                "hey",
            ],
        ),
        IntentCategory::new(
            "bank_exam_questions",
            0.4,
            "Ngân hàng đề thi",
            "detailed",
            true,
            &[
                "ngân hàng đề thi",
                "ngan hang de thi",
                "đề thi",
                "de thi",
                "báo cáo đề thi",
                "bao cao de thi",
                "kế hoạch đề thi",
                "ke hoach de thi",
                "file mềm",
                "file mem",
            ],
        ),
        IntentCategory::new(
            "annual_task_declaration",
            0.4,
            "Kê khai nhiệm vụ năm học",
            "informative",
            true,
            &[
                "kê khai nhiệm vụ",
                "ke khai nhiem vu",
                "nhiệm vụ năm học",
                "nhiem vu nam hoc",
                "kê khai",
                "ke khai",
                "giờ chuẩn",
                "gio chuan",
                "giảng viên cơ hữu",
                "giang vien co huu",
                "thỉnh giảng",
                "thinh giang",
            ],
        ),
        IntentCategory::new(
            "academic_journal",
            0.4,
            "Tạp chí khoa học",
            "detailed",
            true,
            &[
                "tạp chí",
                "tap chi",
                "tạp chí khoa học",
                "tap chi khoa hoc",
                "bài viết",
                "bai viet",
                "nghiên cứu",
                "nghien cuu",
                "khoa học công nghệ",
                "khoa hoc cong nghe",
                "gửi bài",
                "gui bai",
            ],
        ),
        IntentCategory::new(
            "competition_awards",
            0.4,
            "Thi đua khen thưởng",
            "encouraging",
            true,
            &[
                "thi đua",
                "thi dua",
                "khen thưởng",
                "khen thuong",
                "danh hiệu",
                "danh hieu",
                "bằng khen",
                "bang khen",
                "lễ khen thưởng",
                "le khen thuong",
                "chiến sĩ thi đua",
                "chien si thi dua",
                "lao động tiên tiến",
                "lao dong tien tien",
            ],
        ),
        IntentCategory::new(
            "reports_deadlines",
            0.4,
            "Báo cáo và thủ tục",
            "urgent",
            false,
            &[
                "báo cáo",
                "bao cao",
                "nộp",
                "nop",
                "hạn cuối",
                "han cuoi",
                "deadline",
                "thời hạn",
                "thoi han",
                "gửi về",
                "gui ve",
                "phòng đảm bảo chất lượng",
                "phong dam bao chat luong",
            ],
        ),
        IntentCategory::new(
            "teaching_schedule",
            0.4,
            "Lịch giảng dạy",
            "informative",
            false,
            &[
                "lịch giảng dạy",
                "lich giang day",
                "thời khóa biểu",
                "thoi khoa bieu",
                "lịch học",
                "lich hoc",
                "cập nhật dữ liệu",
                "cap nhat du lieu",
                "phần mềm quản lý",
                "phan mem quan ly",
                "đào tạo",
                "dao tao",
            ],
        ),
        IntentCategory::new(
            "quality_assurance",
            0.5,
            "Đảm bảo chất lượng",
            "detailed",
            false,
            &[
                "đảm bảo chất lượng",
                "dam bao chat luong",
                "kiểm tra",
                "kiem tra",
                "giám sát",
                "giam sat",
                "đánh giá",
                "danh gia",
                "chuẩn đầu ra",
                "chuan dau ra",
                "tiêu chuẩn",
                "tieu chuan",
            ],
        ),
        IntentCategory::new(
            "departments_contacts",
            0.4,
            "Thông tin phòng ban",
            "helpful",
            false,
            &[
                "phòng ban",
                "phong ban",
                "liên hệ",
                "lien he",
                "email",
                "phone",
                "contact",
                "phòng tổ chức",
                "phong to chuc",
                "phòng nghiên cứu",
                "phong nghien cuu",
                "phòng khảo thí",
                "phong khao thi",
            ],
        ),
        IntentCategory::new(
            "admission_general",
            0.5,
            "Thông tin tuyển sinh chung",
            "informative",
            false,
            &[
                "tuyển sinh",
                "tuyen sinh",
                "nhập học",
                "đăng ký học",
                "vào trường",
                "điều kiện tuyển sinh",
                "xét tuyển",
            ],
        ),
        IntentCategory::new(
            "tuition_general",
            0.4,
            "Học phí chung",
            "informative",
            false,
            &[
                "học phí",
                "hoc phi",
                "hp",
                "chi phí",
                "chi phi",
                "tiền học",
                "tien hoc",
                "mức phí",
                "muc phi",
                "phí học tập",
                "phi hoc tap",
            ],
        ),
        IntentCategory::new(
            "programs",
            0.5,
            "Chương trình đào tạo",
            "informative",
            false,
            &[
                "ngành",
                "nganh",
                "chuyên ngành",
                "chuyen nganh",
                "đào tạo",
                "dao tao",
                "chương trình học",
                "chuong trinh hoc",
            ],
        ),
        IntentCategory::new(
            "facilities",
            0.6,
            "Cơ sở vật chất",
            "descriptive",
            false,
            &[
                "cơ sở vật chất",
                "co so vat chat",
                "phòng học",
                "phong hoc",
                "thư viện",
                "thu vien",
                "lab",
                "ký túc xá",
                "ky tuc xa",
                "tiện ích",
                "tien ich",
            ],
        ),
        IntentCategory::new(
            CLARIFICATION_INTENT,
            0.2,
            "Cần làm rõ",
            "clarifying",
            false,
            &[
                "gì",
                "gi",
                "sao",
                "nào",
                "nao",
                "như thế nào",
                "nhu the nao",
                "làm sao",
                "lam sao",
                "cách nào",
                "cach nao",
                "thế nào",
                "the nao",
            ],
        ),
        IntentCategory::new(
            GENERAL_INTENT,
            0.2,
            "Câu hỏi chung",
            "neutral",
            false,
            &[
                "thông tin",
                "thong tin",
                "hỗ trợ",
                "ho tro",
                "giúp",
                "giup",
                "hướng dẫn",
                "huong dan",
                "bdu",
                "đại học bình dương",
                "dai hoc binh duong",
            ],
        ),
    ]
}

/// Extra score granted to intents when trigger phrases appear in the normalized query.
struct ContextBoost {
    triggers: TermSet,
    boosts: &'static [(&'static str, f32)],
}

static CONTEXT_BOOSTS: LazyLock<Vec<ContextBoost>> = LazyLock::new(|| {
    let table: [(&[&str], &'static [(&'static str, f32)]); 6] = [
        (
            &["phong dam bao", "phong khao thi"],
            &[("bank_exam_questions", 0.4), ("quality_assurance", 0.3)],
        ),
        (
            &["phong to chuc", "phong can bo"],
            &[("annual_task_declaration", 0.4), ("competition_awards", 0.3)],
        ),
        (
            &["han cuoi", "deadline", "gap", "khan cap"],
            &[("reports_deadlines", 0.5)],
        ),
        (
            &["nghien cuu", "bai viet", "tap chi"],
            &[("academic_journal", 0.4)],
        ),
        (
            &["giang day", "lich hoc", "thoi khoa bieu"],
            &[("teaching_schedule", 0.4)],
        ),
        (
            &["thi dua", "khen thuong", "danh hieu"],
            &[("competition_awards", 0.4)],
        ),
    ];
    table
        .into_iter()
        .map(|(triggers, boosts)| ContextBoost {
            triggers: TermSet::new(triggers),
            boosts,
        })
        .collect()
});

const QUESTION_BOOST: (&[&str], f32) = (
    &["bank_exam_questions", "annual_task_declaration", "academic_journal", "reports_deadlines"],
    0.2,
);
const VAGUE_SHORT_BOOST: f32 = 0.3;
const VAGUE_SHORT_MAX_WORDS: usize = 5;

static VAGUE_INDICATORS: LazyLock<TermSet> =
    LazyLock::new(|| TermSet::new(&["gi", "sao", "nao", "nhu the nao"]));

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f32,
    pub description: String,
    pub style_tag: String,
}

impl IntentResult {
    fn general(confidence: f32) -> Self {
        Self {
            intent: GENERAL_INTENT.to_string(),
            confidence,
            description: "Câu hỏi chung".to_string(),
            style_tag: "neutral".to_string(),
        }
    }

    pub fn is_greeting_or_general(&self) -> bool {
        self.intent == GREETING_INTENT || self.intent == GENERAL_INTENT
    }
}

/// Everything the classifier can say about one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: IntentResult,
    pub entities: EntityBag,
    #[serde(flatten)]
    pub signals: QuerySignals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Semantic,
    KeywordOnly,
}

// ============================================================================
// Classifier
// ============================================================================

struct CompiledIntent {
    category: IntentCategory,
    keywords: TermSet,
    /// Present only when the classifier runs with an embedding backend.
    vector: Option<Vec<f32>>,
}

pub struct IntentClassifier {
    intents: Vec<CompiledIntent>,
    config: IntentConfig,
    normalizer: TextNormalizer,
    entities: EntityExtractor,
    embedder: Option<Arc<dyn EmbeddingModel>>,
}

impl IntentClassifier {
    /// Keyword-only classifier over the default catalog.
    pub fn new(config: IntentConfig) -> Self {
        Self::with_catalog(default_catalog(), config, None)
    }

    /// Blends embedding similarity into the keyword scores. Falls back to
    /// keyword-only mode if the intent descriptions cannot be embedded.
    pub fn with_embedder(config: IntentConfig, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self::with_catalog(default_catalog(), config, Some(embedder))
    }

    pub fn with_catalog(
        catalog: Vec<IntentCategory>,
        config: IntentConfig,
        embedder: Option<Arc<dyn EmbeddingModel>>,
    ) -> Self {
        let vectors = embedder.as_ref().and_then(|e| {
            let texts: Vec<String> = catalog.iter().map(|c| c.synthesized_text()).collect();
            let refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
            match e.embed_batch(&refs) {
                Ok(vectors) if vectors.len() == catalog.len() => Some(vectors),
                Ok(_) => {
                    warn!("Intent embedding count mismatch, classifier is keyword-only");
                    None
                }
                Err(err) => {
                    warn!(error = %err, "Intent embedding failed, classifier is keyword-only");
                    None
                }
            }
        });
        let embedder = if vectors.is_some() { embedder } else { None };

        let mut vectors = vectors.map(|v| v.into_iter());
        let intents = catalog
            .into_iter()
            .map(|category| CompiledIntent {
                keywords: TermSet::new(&category.keywords),
                vector: vectors.as_mut().and_then(|v| v.next()),
                category,
            })
            .collect();

        Self {
            intents,
            config,
            normalizer: TextNormalizer::new(),
            entities: EntityExtractor::new(),
            embedder,
        }
    }

    pub fn mode(&self) -> ClassifierMode {
        if self.embedder.is_some() {
            ClassifierMode::Semantic
        } else {
            ClassifierMode::KeywordOnly
        }
    }

    pub fn catalog_len(&self) -> usize {
        self.intents.len()
    }

    pub fn classify(&self, query: &str) -> IntentResult {
        if query.trim().is_empty() {
            return IntentResult::general(self.config.general_confidence);
        }

        let normalized = self.normalizer.normalize(query);
        let variant_tokens: Vec<Vec<String>> = self
            .normalizer
            .variants(query)
            .iter()
            .map(|v| tokenize(v))
            .collect();

        let mut scores: Vec<f32> = self
            .intents
            .iter()
            .map(|intent| {
                variant_tokens
                    .iter()
                    .map(|tokens| self.keyword_score(intent, tokens))
                    .fold(0.0f32, f32::max)
            })
            .collect();

        self.apply_context_boosts(&normalized, &mut scores);
        for score in &mut scores {
            *score = score.clamp(0.0, 1.0);
        }
        // Sentence encoders are trained on accented text, so the embedded form keeps diacritics.
        self.blend_semantic(&clean(&query.to_lowercase()), &mut scores);

        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in scores.iter().enumerate() {
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }

        let multiplier = match self.mode() {
            ClassifierMode::Semantic => self.config.semantic_multiplier,
            ClassifierMode::KeywordOnly => self.config.fallback_multiplier,
        };

        if let Some((i, score)) = best {
            let category = &self.intents[i].category;
            let threshold = category.confidence_threshold * multiplier;
            debug!(intent = %category.name, score, threshold, "Best intent candidate");
            if score > 0.0 && score >= threshold {
                return IntentResult {
                    intent: category.name.clone(),
                    confidence: score,
                    description: category.description.clone(),
                    style_tag: category.style_tag.clone(),
                };
            }
        }
        IntentResult::general(self.config.general_confidence)
    }

    /// Tiered keyword score of one intent against one tokenized variant.
    fn keyword_score(&self, intent: &CompiledIntent, tokens: &[String]) -> f32 {
        let mut score = 0.0f32;
        let mut matches = 0usize;
        for keyword in intent.keywords.iter() {
            let Some(position) = keyword.position_in(tokens) else {
                continue;
            };
            score += if intent.category.domain_priority {
                PRIORITY_WEIGHT
            } else {
                match position {
                    TermPosition::Exact => EXACT_WEIGHT,
                    TermPosition::Edge => EDGE_WEIGHT,
                    TermPosition::Inner => INNER_WEIGHT,
                }
            };
            matches += 1;
        }
        if matches == 0 || intent.keywords.is_empty() {
            return 0.0;
        }

        let mut base = score / intent.keywords.len() as f32;
        if matches > 1 {
            base *= 1.0 + (matches - 1) as f32 * self.config.multi_match_bonus;
        }
        base.min(1.0)
    }

    fn apply_context_boosts(&self, normalized: &str, scores: &mut [f32]) {
        let tokens = tokenize(normalized);
        let mut add = |name: &str, bonus: f32| {
            if let Some(i) = self.intents.iter().position(|c| c.category.name == name) {
                scores[i] += bonus;
            }
        };

        for boost in CONTEXT_BOOSTS.iter() {
            if boost.triggers.any_match(&tokens) {
                for (name, bonus) in boost.boosts {
                    add(name, *bonus);
                }
            }
        }
        if normalized.ends_with('?') {
            for name in QUESTION_BOOST.0 {
                add(name, QUESTION_BOOST.1);
            }
        }
        if VAGUE_INDICATORS.any_match(&tokens) && tokens.len() <= VAGUE_SHORT_MAX_WORDS {
            add(CLARIFICATION_INTENT, VAGUE_SHORT_BOOST);
        }
    }

    fn blend_semantic(&self, lowered: &str, scores: &mut [f32]) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let query_vec = match embedder.embed(lowered) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed, keeping keyword scores");
                return;
            }
        };

        let weight = self.config.embedding_weight;
        for (score, intent) in scores.iter_mut().zip(&self.intents) {
            if let Some(vector) = &intent.vector {
                let similarity = cosine(&query_vec, vector).clamp(0.0, 1.0);
                *score = *score * (1.0 - weight) + similarity * weight;
            }
        }
    }

    pub fn extract_entities(&self, query: &str) -> EntityBag {
        self.entities.extract(query)
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let intent = self.classify(query);
        let entities = self.extract_entities(query);
        let signals = analyze_signals(query, &entities);
        QueryAnalysis {
            intent,
            entities,
            signals,
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < 1e-12 || nb < 1e-12 {
        0.0
    } else {
        dot / (na * nb)
    }
}
