//! Confidence-gated decision policy.
//!
//! Given the query, the best retrieval hit and the session context, decide
//! whether to refuse, ask for clarification, answer from the knowledge base
//! (as is or elaborated), or admit not knowing and route to a department.
//! Everything here is pure: same inputs, same [`DecisionContext`].

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use super::intent::IntentResult;
use crate::config::TrustThresholds;
use crate::memory::ConversationContext;
use crate::search::normalizer::{tokenize, TermSet, TextNormalizer};

// ============================================================================
// Types
// ============================================================================

/// Trust bucket of a similarity score. Ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    NoTrust,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    RejectOutOfScope,
    AskClarification,
    UseRetrievalDirect,
    EnhanceRetrieval,
    SayUnknown,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::RejectOutOfScope => "reject_out_of_scope",
            DecisionKind::AskClarification => "ask_clarification",
            DecisionKind::UseRetrievalDirect => "use_retrieval_direct",
            DecisionKind::EnhanceRetrieval => "enhance_retrieval",
            DecisionKind::SayUnknown => "say_unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    /// Short query made of vague words, or vague with weak retrieval.
    VagueQuery,
    /// Retrieval landed in the low-trust tier.
    LowConfidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRoute {
    pub department: String,
    pub contact: String,
}

/// Branch-specific data produced alongside a [`DecisionKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPayload {
    OutOfScope {
        /// Summary of the session's current topic, if the session has history.
        topic_hint: Option<String>,
    },
    Clarification {
        query: String,
        similarity: f32,
        /// Retrieved answer offered as a hint when retrieval was weak but not empty.
        hint: Option<String>,
        reason: ClarificationReason,
    },
    Direct {
        answer: String,
        similarity: f32,
    },
    Enhance {
        answer: String,
        similarity: f32,
    },
    Unknown {
        similarity: f32,
        routing: DepartmentRoute,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub kind: DecisionKind,
    pub tier: ConfidenceTier,
    pub payload: DecisionPayload,
    pub should_respond: bool,
}

/// The retrieval evidence the policy looks at.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Retrieval {
    pub answer: Option<String>,
    pub similarity: f32,
}

impl Retrieval {
    pub fn new(answer: Option<String>, similarity: f32) -> Self {
        Self { answer, similarity }
    }
}

// ============================================================================
// Tables
// ============================================================================

static DOMAIN_KEYWORDS: LazyLock<TermSet> = LazyLock::new(|| {
    TermSet::new(&[
        // general education
        "học", "trường", "sinh viên", "tuyển sinh", "học phí", "ngành", "đại học", "bdu", "gv",
        "giảng viên", "dạy", "quy định", "khoa", "chương trình", "đào tạo", "lịch",
        "thời khóa biểu", "phòng", "lớp",
        // fees, diplomas, paperwork
        "lệ phí", "phí", "tiền", "bằng", "văn bằng", "tốt nghiệp", "nhận bằng", "chuyển khoản",
        "thanh toán", "nộp tiền", "đóng phí", "thu ngân", "kế toán", "tài chính", "điểm",
        "transcript", "bảng điểm", "thủ tục", "giấy tờ", "hồ sơ", "đăng ký", "xin cấp",
        // lecturer work
        "hội đồng", "nghiên cứu", "công tác", "báo cáo", "đánh giá", "thi đua", "thành tích",
        "khen thưởng", "xét", "nhiệm vụ", "chức năng", "tiêu chuẩn", "tiêu chí", "định mức",
        "kiểm tra", "giám sát", "quản lý", "kết quả", "hiệu quả", "phân công", "trách nhiệm",
        "chuẩn đầu ra", "học kỳ", "năm học", "kỳ thi", "bài giảng", "giáo án", "lớp học",
        "môn học", "học phần", "tín chỉ", "cố vấn", "ngân hàng đề thi", "đề thi", "file mềm",
        "nộp", "hạn cuối", "kê khai", "giờ chuẩn", "thỉnh giảng", "cơ hữu", "tạp chí",
        "bài viết", "bằng khen", "danh hiệu", "thầy", "cô", "phụ trách", "giảng dạy", "bộ môn",
        "chuyên ngành",
        // unaccented spellings
        "le phi", "phi", "tien", "bang", "van bang", "tot nghiep", "nhan bang", "chuyen khoan",
        "thanh toan", "nop tien", "dong phi", "thu ngan", "ke toan", "tai chinh", "diem",
        "bang diem", "hoc", "truong", "sinh vien", "tuyen sinh", "hoc phi", "nganh", "dai hoc",
        "giang vien", "quy dinh", "chuong trinh", "dao tao", "thi dua", "thanh tich",
        "khen thuong", "xet", "ca nhan", "tap the", "hoan thanh", "nhiem vu", "chuc nang",
        "tieu chuan", "tieu chi", "dinh muc", "chat luong", "kiem tra", "giam sat", "quan ly",
        "van hanh", "ket qua", "hieu qua", "thuc hien", "hoat dong", "phan cong",
        "giao nhiem vu", "trach nhiem", "chuan dau ra", "muc tieu", "chi tieu", "ke hoach",
        "hoc ky", "nam hoc", "ky thi", "thi cu", "diem so", "bai giang", "giao an", "tai lieu",
        "giao trinh", "lop hoc", "mon hoc", "hoc phan", "tin chi", "co van", "huong dan",
        "tu van", "ho tro", "dong nghiep", "ngan hang de thi", "file mem", "bao cao", "nop",
        "han cuoi", "ke khai", "gio chuan", "thinh giang", "co huu", "tap chi",
        "khoa hoc cong nghe", "bai viet", "nghien cuu", "le khen thuong", "bang khen",
        "danh hieu", "cong nhan", "phu trach", "giang day", "chuyen nganh",
    ])
});

static DOMAIN_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"\bphí\b.*\b(?:học|tốt nghiệp|nhận|cấp)\b",
        r"\b(?:học|phí|tiền)\b.*\b(?:phí|học|cấp|nhận)\b",
        r"\b(?:bằng|văn bằng|tốt nghiệp)\b",
        r"\b(?:thủ tục|quy trình|cách thức)\b",
        r"\b(?:bdu|đại học|trường)\b",
        r"\b(?:sinh viên|học sinh)\b",
        r"\b(?:giảng viên|thầy|cô|gv)\b",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).expect("domain pattern is valid"))
    .collect()
});

static VAGUE_KEYWORDS: LazyLock<TermSet> = LazyLock::new(|| {
    TermSet::new(&[
        "làm sao", "như thế nào", "cách nào", "thủ tục", "quy trình", "thông tin", "chi tiết",
        "hướng dẫn", "giúp đỡ", "hỗ trợ", "gì", "nào", "khi nào", "ở đâu", "ai", "sao",
        "có phải", "lam sao", "nhu the nao", "cach nao", "thu tuc", "quy trinh", "thong tin",
        "chi tiet", "huong dan", "giup do", "ho tro",
    ])
});

struct RouteRule {
    triggers: TermSet,
    department: &'static str,
    contact: &'static str,
}

static DEPARTMENT_ROUTES: LazyLock<Vec<RouteRule>> = LazyLock::new(|| {
    let table: [(&[&str], &str, &str); 4] = [
        (
            &["ngân hàng đề", "đề thi", "khảo thí", "ngan hang de", "de thi", "khao thi"],
            "Phòng Đảm bảo chất lượng và Khảo thí",
            "ldkham@bdu.edu.vn",
        ),
        (
            &["kê khai", "nhiệm vụ", "giờ chuẩn", "ke khai", "nhiem vu", "gio chuan"],
            "Phòng Tổ chức - Cán bộ",
            "tcccb@bdu.edu.vn",
        ),
        (
            &["tạp chí", "nghiên cứu", "khoa học", "tap chi", "nghien cuu", "khoa hoc"],
            "Phòng Nghiên cứu - Hợp tác",
            "nghiencuu@bdu.edu.vn",
        ),
        (
            &["khen thưởng", "thi đua", "khen thuong", "thi dua"],
            "Phòng Tổ chức - Cán bộ",
            "tcccb@bdu.edu.vn",
        ),
    ];
    table
        .into_iter()
        .map(|(triggers, department, contact)| RouteRule {
            triggers: TermSet::new(triggers),
            department,
            contact,
        })
        .collect()
});

const DEFAULT_DEPARTMENT: &str = "phòng ban liên quan";
const DEFAULT_CONTACT: &str = "info@bdu.edu.vn";

const VAGUE_SHORT_MIN_HITS: usize = 2;
const VAGUE_SHORT_MAX_WORDS: usize = 5;
/// Longest query that counts as vague when every word in it is a question word.
const ONLY_VAGUE_MAX_WORDS: usize = 5;

/// First department whose trigger words appear in the query, else the general office.
pub fn route_department(query: &str) -> DepartmentRoute {
    let tokens = tokenize(query);
    DEPARTMENT_ROUTES
        .iter()
        .find(|rule| rule.triggers.any_match(&tokens))
        .map(|rule| DepartmentRoute {
            department: rule.department.to_string(),
            contact: rule.contact.to_string(),
        })
        .unwrap_or_else(|| DepartmentRoute {
            department: DEFAULT_DEPARTMENT.to_string(),
            contact: DEFAULT_CONTACT.to_string(),
        })
}

/// True when every token is itself a vague word, as in "gì?" or "sao?".
///
/// Such a query asks for clarification at any retrieval similarity, even
/// though it has a single vague hit and so misses the two-hit rule.
fn is_only_vague(tokens: &[String]) -> bool {
    !tokens.is_empty()
        && tokens
            .iter()
            .all(|t| VAGUE_KEYWORDS.any_match(std::slice::from_ref(t)))
}

// ============================================================================
// Engine
// ============================================================================

pub struct DecisionEngine {
    thresholds: TrustThresholds,
    sticky_window: usize,
    normalizer: TextNormalizer,
}

impl DecisionEngine {
    pub fn new(thresholds: TrustThresholds, sticky_window: usize) -> Self {
        Self {
            thresholds,
            sticky_window,
            normalizer: TextNormalizer::new(),
        }
    }

    pub fn thresholds(&self) -> TrustThresholds {
        self.thresholds
    }

    /// Step function over the tier cut points, lower bounds inclusive.
    pub fn categorize(&self, similarity: f32) -> ConfidenceTier {
        let t = &self.thresholds;
        if similarity >= t.high {
            ConfidenceTier::High
        } else if similarity >= t.medium {
            ConfidenceTier::Medium
        } else if similarity >= t.low {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::NoTrust
        }
    }

    /// Domain check on the query alone: a curated keyword or a domain pattern.
    pub fn is_in_scope(&self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        let lowered = query.to_lowercase();
        let forms = [lowered.clone(), self.normalizer.normalize(query)];
        if forms.iter().any(|f| DOMAIN_KEYWORDS.any_match(&tokenize(f))) {
            return true;
        }
        DOMAIN_PATTERNS.iter().any(|p| p.is_match(&lowered))
    }

    /// Domain check with the sticky override: recent in-scope turns admit the query.
    pub fn is_in_scope_with_context(&self, query: &str, context: &ConversationContext) -> bool {
        if self.is_in_scope(query) {
            return true;
        }
        let recent = context.history.len().saturating_sub(self.sticky_window);
        let sticky = context.history[recent..].iter().any(|i| i.in_scope);
        if sticky {
            debug!("Accepting query through recent in-scope context");
        }
        sticky
    }

    pub fn vague_hits(&self, query: &str) -> usize {
        VAGUE_KEYWORDS.count_matches(&tokenize(query))
    }

    pub fn needs_clarification(&self, query: &str, confidence: f32) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        let tokens = tokenize(query);
        let vague = VAGUE_KEYWORDS.count_matches(&tokens);
        let words = query.split_whitespace().count();
        (is_only_vague(&tokens) && words <= ONLY_VAGUE_MAX_WORDS)
            || (vague >= VAGUE_SHORT_MIN_HITS && words <= VAGUE_SHORT_MAX_WORDS)
            || (confidence < self.thresholds.low && vague >= 1)
    }

    /// Apply the policy: scope, then vagueness, then the trust tier.
    pub fn decide(
        &self,
        query: &str,
        retrieval: &Retrieval,
        intent: &IntentResult,
        context: &ConversationContext,
    ) -> DecisionContext {
        let similarity = retrieval.similarity;
        let tier = self.categorize(similarity);

        if !self.is_in_scope_with_context(query, context) {
            let topic_hint = (!context.history.is_empty()).then(|| context.topic_summary.clone());
            return DecisionContext {
                kind: DecisionKind::RejectOutOfScope,
                tier,
                payload: DecisionPayload::OutOfScope { topic_hint },
                should_respond: false,
            };
        }

        if self.needs_clarification(query, similarity) {
            return DecisionContext {
                kind: DecisionKind::AskClarification,
                tier,
                payload: DecisionPayload::Clarification {
                    query: query.to_string(),
                    similarity,
                    hint: None,
                    reason: ClarificationReason::VagueQuery,
                },
                should_respond: true,
            };
        }

        let answer = retrieval.answer.clone().unwrap_or_default();
        let (kind, payload) = match tier {
            ConfidenceTier::High => (
                DecisionKind::UseRetrievalDirect,
                DecisionPayload::Direct { answer, similarity },
            ),
            ConfidenceTier::Medium => (
                DecisionKind::EnhanceRetrieval,
                DecisionPayload::Enhance { answer, similarity },
            ),
            ConfidenceTier::Low => (
                DecisionKind::AskClarification,
                DecisionPayload::Clarification {
                    query: query.to_string(),
                    similarity,
                    hint: retrieval.answer.clone(),
                    reason: ClarificationReason::LowConfidence,
                },
            ),
            ConfidenceTier::NoTrust => (
                DecisionKind::SayUnknown,
                DecisionPayload::Unknown {
                    similarity,
                    routing: route_department(query),
                },
            ),
        };

        debug!(
            decision = kind.as_str(),
            similarity,
            intent = %intent.intent,
            "Decision made"
        );
        DecisionContext {
            kind,
            tier,
            payload,
            should_respond: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Interaction;
    use crate::rag::entities::EntityBag;
    use crate::rag::intent::IntentClassifier;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(TrustThresholds::default(), 3)
    }

    fn intent(query: &str) -> IntentResult {
        IntentClassifier::new(Default::default()).classify(query)
    }

    fn context_with(queries: &[(&str, bool)]) -> ConversationContext {
        let mut context = ConversationContext::empty();
        for (query, in_scope) in queries {
            context.history.push(Interaction::new(
                *query,
                "trả lời",
                "general",
                EntityBag::new(),
                DecisionKind::UseRetrievalDirect,
                *in_scope,
            ));
        }
        context.topic_summary = "Đang hỏi về ngân hàng đề thi".to_string();
        context
    }

    #[test]
    fn categorize_cut_points_are_inclusive() {
        let e = engine();
        assert_eq!(e.categorize(0.70), ConfidenceTier::High);
        assert_eq!(e.categorize(0.6999), ConfidenceTier::Medium);
        assert_eq!(e.categorize(0.50), ConfidenceTier::Medium);
        assert_eq!(e.categorize(0.25), ConfidenceTier::Low);
        assert_eq!(e.categorize(0.2499), ConfidenceTier::NoTrust);
        assert_eq!(e.categorize(-1.0), ConfidenceTier::NoTrust);
        assert_eq!(e.categorize(f32::NAN), ConfidenceTier::NoTrust);
    }

    #[test]
    fn categorize_is_monotonic() {
        let e = engine();
        let mut previous = ConfidenceTier::NoTrust;
        for step in -100..=100 {
            let tier = e.categorize(step as f32 / 100.0);
            assert!(tier >= previous, "tier dropped at {}", step);
            previous = tier;
        }
        assert_eq!(previous, ConfidenceTier::High);
    }

    #[test]
    fn scope_uses_keywords_and_patterns() {
        let e = engine();
        assert!(e.is_in_scope("học phí bao nhiêu?"));
        assert!(e.is_in_scope("hoc phi bao nhieu"));
        assert!(e.is_in_scope("quy trình xin nghỉ phép"));
        assert!(!e.is_in_scope("thời tiết hôm nay"));
        assert!(!e.is_in_scope("công thức nấu phở"));
        assert!(!e.is_in_scope(""));
    }

    #[test]
    fn scope_is_sticky_within_window() {
        let e = engine();
        let context = context_with(&[("ngân hàng đề thi nộp khi nào", true)]);
        assert!(e.is_in_scope_with_context("thời tiết hôm nay", &context));

        let stale = context_with(&[
            ("ngân hàng đề thi nộp khi nào", true),
            ("thời tiết", false),
            ("bóng đá", false),
            ("ca nhạc", false),
        ]);
        assert!(!e.is_in_scope_with_context("thời tiết hôm nay", &stale));
    }

    #[test]
    fn high_similarity_uses_retrieval_directly() {
        let query = "học phí bao nhiêu?";
        let retrieval = Retrieval::new(Some("Học phí khoảng 20 triệu/năm".into()), 0.82);
        let decision = engine().decide(query, &retrieval, &intent(query), &ConversationContext::empty());
        assert_eq!(decision.kind, DecisionKind::UseRetrievalDirect);
        assert!(decision.should_respond);
        assert_eq!(
            decision.payload,
            DecisionPayload::Direct {
                answer: "Học phí khoảng 20 triệu/năm".into(),
                similarity: 0.82
            }
        );
    }

    #[test]
    fn short_vague_query_asks_for_clarification() {
        let query = "thủ tục làm sao?";
        for similarity in [0.0, 0.3, 0.6, 0.95] {
            let retrieval = Retrieval::new(Some("x".into()), similarity);
            let decision = engine().decide(query, &retrieval, &intent(query), &ConversationContext::empty());
            assert_eq!(decision.kind, DecisionKind::AskClarification);
        }
    }

    #[test]
    fn bare_vague_follow_up_asks_for_clarification() {
        let query = "gì?";
        let context = context_with(&[("ngân hàng đề thi nộp khi nào", true)]);
        for similarity in [0.1, 0.6, 0.95] {
            let retrieval = Retrieval::new(Some("a".into()), similarity);
            let decision = engine().decide(query, &retrieval, &intent(query), &context);
            assert_eq!(decision.kind, DecisionKind::AskClarification);
        }
    }

    #[test]
    fn only_question_words_count_as_vague() {
        let e = engine();
        assert!(e.needs_clarification("gì?", 0.95));
        assert!(e.needs_clarification("sao", 0.95));
        assert!(!e.needs_clarification("đề thi gì", 0.95));
        assert!(!e.needs_clarification("gì gì gì gì gì gì", 0.95));
    }

    #[test]
    fn off_topic_query_is_rejected() {
        let query = "thời tiết hôm nay";
        let decision = engine().decide(query, &Retrieval::new(None, 0.0), &intent(query), &ConversationContext::empty());
        assert_eq!(decision.kind, DecisionKind::RejectOutOfScope);
        assert!(!decision.should_respond);
        assert_eq!(decision.payload, DecisionPayload::OutOfScope { topic_hint: None });
    }

    #[test]
    fn no_trust_routes_to_a_department() {
        let query = "hạn nộp đề thi cho khảo thí";
        let decision = engine().decide(query, &Retrieval::new(Some("x".into()), 0.05), &intent(query), &ConversationContext::empty());
        assert_eq!(decision.kind, DecisionKind::SayUnknown);
        match decision.payload {
            DecisionPayload::Unknown { routing, .. } => {
                assert_eq!(routing.contact, "ldkham@bdu.edu.vn");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn low_tier_offers_retrieved_hint() {
        let query = "quy định giờ chuẩn";
        let decision = engine().decide(query, &Retrieval::new(Some("Giờ chuẩn là...".into()), 0.3), &intent(query), &ConversationContext::empty());
        assert_eq!(decision.kind, DecisionKind::AskClarification);
        assert!(matches!(
            decision.payload,
            DecisionPayload::Clarification { hint: Some(_), reason: ClarificationReason::LowConfidence, .. }
        ));
    }

    #[test]
    fn medium_tier_enhances() {
        let query = "kê khai nhiệm vụ năm học";
        let decision = engine().decide(query, &Retrieval::new(Some("a".into()), 0.55), &intent(query), &ConversationContext::empty());
        assert_eq!(decision.kind, DecisionKind::EnhanceRetrieval);
    }

    #[test]
    fn decide_is_idempotent() {
        let e = engine();
        let context = context_with(&[("thi đua khen thưởng", true)]);
        for (query, similarity) in [("học phí?", 0.9), ("thời tiết", 0.1), ("gì?", 0.3), ("đề thi", 0.05)] {
            let retrieval = Retrieval::new(Some("a".into()), similarity);
            let i = intent(query);
            assert_eq!(e.decide(query, &retrieval, &i, &context), e.decide(query, &retrieval, &i, &context));
        }
    }

    #[test]
    fn routing_defaults_to_general_office() {
        assert_eq!(route_department("lương tháng này").contact, "info@bdu.edu.vn");
        assert_eq!(route_department("thi đua cuối năm").contact, "tcccb@bdu.edu.vn");
    }
}
