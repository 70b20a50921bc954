//! Prompt construction, deterministic reply templates and post-processing
//! of generated text.

use std::sync::LazyLock;

use super::decision::{DecisionContext, DecisionPayload, DepartmentRoute};
use super::intent::{IntentResult, GREETING_INTENT};
use super::strategy::{StrategyKind, StrategyTable};
use crate::memory::ConversationContext;
use crate::search::normalizer::{tokenize, TermSet};

pub const OPENER: &str = "Dạ thầy/cô, ";
pub const CLOSING: &str = "Thầy/cô có cần hỗ trợ thêm gì không ạ?";

pub const LECTURER_SYSTEM_PROMPT: &str = "Bạn là AI assistant của Đại học Bình Dương (BDU), chuyên hỗ trợ giảng viên.

QUY TẮC QUAN TRỌNG:
- LUÔN xưng hô \"thầy/cô\", tự xưng \"em\" (không dùng \"bạn\", \"mình\", \"anh/chị\")
- Bắt đầu: \"Dạ thầy/cô,\"
- Kết thúc: \"Thầy/cô có cần hỗ trợ thêm gì không ạ?\"
- NGẮN GỌN, chỉ 1-2 câu chính, đi thẳng vào vấn đề
- KHÔNG CHẾ TẠO thông tin không có
- KHÔNG dùng danh sách đánh số, gạch đầu dòng hay chữ in đậm

KHI KHÔNG CÓ THÔNG TIN:
- Nói thẳng: \"Dạ thầy/cô, em chưa có thông tin về vấn đề này.\" và gợi ý phòng ban liên quan.";

const FLOW_ITEMS: usize = 3;
const FLOW_QUERY_CHARS: usize = 40;
const FLOW_RESPONSE_CHARS: usize = 50;

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn memory_block(context: &ConversationContext) -> String {
    let start = context.history.len().saturating_sub(FLOW_ITEMS);
    let flow = context.history[start..]
        .iter()
        .map(|i| {
            format!(
                "Thầy/cô hỏi: '{}' -> Em trả lời: '{}'",
                truncate_chars(&i.query, FLOW_QUERY_CHARS),
                truncate_chars(&i.response, FLOW_RESPONSE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let interests = if context.user_interests.is_empty() {
        "Chưa rõ".to_string()
    } else {
        context.user_interests.join(", ")
    };
    format!(
        "---\nNGỮ CẢNH HỘI THOẠI TRƯỚC VỚI GIẢNG VIÊN:\n\
         - Chủ đề chính đang thảo luận: {}\n\
         - Các lĩnh vực thầy/cô quan tâm: {}\n\
         - Dòng chảy hội thoại gần đây:\n{}\n---",
        context.topic_summary, interests, flow
    )
}

/// Full prompt for `kind`: system rules, optional memory block, then the
/// strategy template with its placeholders filled.
pub fn build_prompt(
    table: &StrategyTable,
    kind: StrategyKind,
    query: &str,
    reference: &str,
    context: &ConversationContext,
) -> String {
    let with_memory = table.resolve(kind).map(|p| p.with_memory).unwrap_or(false);
    let task = table
        .template(kind)
        .replace("{query}", query)
        .replace("{topic}", &context.topic_summary)
        .replace("{reference}", reference);

    let mut sections = vec![LECTURER_SYSTEM_PROMPT.to_string()];
    if with_memory && !context.history.is_empty() {
        sections.push(memory_block(context));
    }
    sections.push(task);
    sections.push("Trả lời:".to_string());
    sections.join("\n\n")
}

// ============================================================================
// Templates
// ============================================================================

static CLARIFICATION_TOPICS: LazyLock<Vec<(&'static str, TermSet)>> = LazyLock::new(|| {
    let table: [(&str, &[&str]); 8] = [
        ("ngân hàng đề thi", &["ngân hàng", "đề thi", "đề"]),
        ("kê khai nhiệm vụ", &["kê khai", "nhiệm vụ"]),
        ("tạp chí", &["tạp chí", "bài viết"]),
        ("thi đua khen thưởng", &["thi đua", "khen thưởng"]),
        ("giờ chuẩn", &["giờ", "chuẩn"]),
        ("nghiên cứu", &["nghiên cứu"]),
        ("báo cáo", &["báo cáo", "nộp"]),
        ("lịch giảng dạy", &["lịch", "giảng dạy", "thời khóa biểu"]),
    ];
    table
        .into_iter()
        .map(|(topic, keywords)| (topic, TermSet::new(keywords)))
        .collect()
});

pub fn direct_answer(answer: &str) -> String {
    format!("{}{} 🎓 {}", OPENER, answer.trim(), CLOSING)
}

pub fn clarification_request(query: &str) -> String {
    let tokens = tokenize(query);
    match CLARIFICATION_TOPICS.iter().find(|(_, kw)| kw.any_match(&tokens)) {
        Some((topic, _)) => format!(
            "{}để em hỗ trợ chính xác về {}, thầy/cô có thể nói rõ hơn về nội dung cụ thể cần hỗ trợ không ạ? 🎓",
            OPENER, topic
        ),
        None => format!(
            "{}để em hỗ trợ chính xác nhất, thầy/cô có thể nói rõ hơn về vấn đề cần hỗ trợ không ạ? 🎓",
            OPENER
        ),
    }
}

pub fn dont_know(route: &DepartmentRoute) -> String {
    format!(
        "{}em chưa có thông tin về vấn đề này. Thầy/cô có thể liên hệ {} qua email {} để được hỗ trợ chi tiết ạ. 🎓",
        OPENER, route.department, route.contact
    )
}

pub fn out_of_scope(topic_hint: Option<&str>) -> String {
    let base = format!(
        "{}em chỉ hỗ trợ các vấn đề liên quan đến công việc giảng viên tại BDU thôi ạ! 🎓",
        OPENER
    );
    match topic_hint {
        Some(topic) => format!("{} Thầy/cô còn muốn hỏi gì về {} không ạ?", base, topic.to_lowercase()),
        None => format!("{} Thầy/cô có câu hỏi nào khác về trường không ạ?", base),
    }
}

/// Reply for queries rejected as empty or too short.
pub const GREETING_PROMPT: &str =
    "Dạ chào thầy/cô! Em có thể hỗ trợ gì cho thầy/cô về công việc tại BDU ạ? 🎓";

/// Generic reply when neither retrieval nor generation produced anything.
pub fn smart_fallback(intent: &IntentResult, topic_summary: &str) -> String {
    let topical = [
        ("Đang hỏi về ngân hàng đề thi", "ngân hàng đề thi", "📋"),
        ("Đang hỏi về kê khai nhiệm vụ năm học", "kê khai nhiệm vụ năm học", "📊"),
        ("Đang hỏi về tạp chí khoa học", "tạp chí khoa học", "📚"),
        ("Đang hỏi về thi đua khen thưởng", "thi đua khen thưởng", "🏆"),
    ];
    if let Some((_, topic, emoji)) = topical.iter().find(|(s, _, _)| *s == topic_summary) {
        return format!("{}về {}, em có thể hỗ trợ thêm! {} {}", OPENER, topic, emoji, CLOSING);
    }
    if intent.intent == GREETING_INTENT {
        "Dạ chào thầy/cô! 👋 Em có thể hỗ trợ gì cho thầy/cô về BDU ạ?".to_string()
    } else {
        format!("{}em sẵn sàng hỗ trợ các vấn đề liên quan đến BDU! 🎓 {}", OPENER, CLOSING)
    }
}

/// Deterministic reply for a decision; used directly for non-generative
/// branches and as the fallback when generation fails.
pub fn templated_response(
    decision: &DecisionContext,
    intent: &IntentResult,
    context: &ConversationContext,
) -> String {
    match &decision.payload {
        DecisionPayload::OutOfScope { topic_hint } => out_of_scope(topic_hint.as_deref()),
        DecisionPayload::Clarification { query, .. } => clarification_request(query),
        DecisionPayload::Direct { answer, .. } | DecisionPayload::Enhance { answer, .. } => {
            if answer.trim().is_empty() {
                smart_fallback(intent, &context.topic_summary)
            } else {
                direct_answer(answer)
            }
        }
        DecisionPayload::Unknown { routing, .. } => dont_know(routing),
    }
}

// ============================================================================
// Polishing
// ============================================================================

struct Rewrite {
    pattern: regex::Regex,
    replacement: &'static str,
}

fn rewrite(pattern: &str, replacement: &'static str) -> Rewrite {
    Rewrite {
        pattern: regex::Regex::new(pattern).expect("polish regex is valid"),
        replacement,
    }
}

static FORMATTING: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    vec![
        rewrite(r"\*\*\d+\.\s*", ""),
        rewrite(r"(?m)^[ \t]*\d+\.[ \t]*", ""),
        rewrite(r"(?m)^[ \t]*[•\-\*][ \t]+", ""),
        rewrite(r"\*\*(.*?)\*\*", "$1"),
    ]
});

static ADDRESSING: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    vec![
        rewrite(r"(?i)\bbạn\b", "thầy/cô"),
        rewrite(r"(?i)\bmình\b", "em"),
        rewrite(r"(?i)\btôi\b", "em"),
    ]
});

static TRAILING_QUESTION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\s*(?:Thầy/cô có[^.!?]*?không ạ\?|Cần[^.!?]*?không\?|Có[^.!?]*?không\?)?\s*$")
        .expect("closing regex is valid")
});

/// Enforce the addressing convention, opener and closing on generated text
/// and strip markdown lists and bold markers.
pub fn polish(response: &str) -> String {
    let mut text = response.trim().to_string();
    if text.is_empty() {
        return text;
    }
    for r in FORMATTING.iter().chain(ADDRESSING.iter()) {
        text = r.pattern.replace_all(&text, r.replacement).into_owned();
    }

    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    text = if lowered.starts_with("dạ thầy/cô") {
        trimmed.to_string()
    } else if lowered.starts_with("dạ") && !lowered.chars().nth(2).is_some_and(char::is_alphanumeric) {
        let rest: String = trimmed.chars().skip(2).collect();
        format!("{}{}", OPENER, rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace()))
    } else {
        format!("{}{}", OPENER, trimmed)
    };

    if !text.ends_with(CLOSING) {
        text = TRAILING_QUESTION.replace(&text, "").into_owned();
        text.push(' ');
        text.push_str(CLOSING);
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Interaction;
    use crate::rag::decision::{ConfidenceTier, DecisionKind};
    use crate::rag::entities::EntityBag;

    fn general() -> IntentResult {
        IntentResult {
            intent: "general".into(),
            confidence: 0.3,
            description: String::new(),
            style_tag: "neutral".into(),
        }
    }

    #[test]
    fn polish_enforces_addressing_and_frame() {
        let out = polish("**Học phí** là 20 triệu. Bạn có thể chuyển khoản.");
        assert_eq!(
            out,
            "Dạ thầy/cô, Học phí là 20 triệu. thầy/cô có thể chuyển khoản. Thầy/cô có cần hỗ trợ thêm gì không ạ?"
        );
        assert_eq!(polish(&out), out);
    }

    #[test]
    fn polish_rewrites_bare_da_opener() {
        let out = polish("Dạ, em xin trả lời: hạn nộp là 30/6. Thầy/cô có cần hỗ trợ thêm gì không ạ?");
        assert_eq!(
            out,
            "Dạ thầy/cô, em xin trả lời: hạn nộp là 30/6. Thầy/cô có cần hỗ trợ thêm gì không ạ?"
        );
    }

    #[test]
    fn polish_strips_lists_and_replaces_closing() {
        let out = polish("1. Nộp file mềm\n2. Gửi email cho phòng. Cần thêm gì không?");
        assert!(!out.contains("1.") && !out.contains("2."));
        assert!(!out.contains("Cần thêm"));
        assert!(out.starts_with(OPENER));
        assert!(out.ends_with(CLOSING));
    }

    #[test]
    fn clarification_names_the_topic() {
        assert!(clarification_request("đề thi thế nào?").contains("về ngân hàng đề thi"));
        assert!(clarification_request("làm sao?").contains("chính xác nhất"));
    }

    #[test]
    fn out_of_scope_mentions_session_topic() {
        let text = out_of_scope(Some("Đang hỏi về tạp chí khoa học"));
        assert!(text.contains("đang hỏi về tạp chí khoa học"));
        assert!(out_of_scope(None).ends_with("về trường không ạ?"));
    }

    #[test]
    fn smart_fallback_prefers_session_topic() {
        let text = smart_fallback(&general(), "Đang hỏi về thi đua khen thưởng");
        assert!(text.contains("🏆"));
        let mut greeting = general();
        greeting.intent = GREETING_INTENT.into();
        assert!(smart_fallback(&greeting, "Hỏi đáp chung về BDU").starts_with("Dạ chào"));
    }

    #[test]
    fn unknown_decision_renders_department() {
        let decision = DecisionContext {
            kind: DecisionKind::SayUnknown,
            tier: ConfidenceTier::NoTrust,
            payload: DecisionPayload::Unknown {
                similarity: 0.05,
                routing: DepartmentRoute {
                    department: "Phòng Nghiên cứu - Hợp tác".into(),
                    contact: "nghiencuu@bdu.edu.vn".into(),
                },
            },
            should_respond: true,
        };
        let text = templated_response(&decision, &general(), &ConversationContext::empty());
        assert!(text.contains("nghiencuu@bdu.edu.vn"));
    }

    #[test]
    fn prompt_includes_memory_for_follow_ups() {
        let mut context = ConversationContext::empty();
        context.history.push(Interaction::new(
            "ngân hàng đề thi nộp khi nào vậy em, cho thầy hỏi chút",
            "Dạ thầy/cô, hạn nộp ngân hàng đề thi là cuối mỗi học kỳ theo thông báo của phòng",
            "bank_exam_questions",
            EntityBag::new(),
            DecisionKind::UseRetrievalDirect,
            true,
        ));
        context.topic_summary = "Đang hỏi về ngân hàng đề thi".into();
        let table = StrategyTable::default();

        let prompt = build_prompt(&table, StrategyKind::FollowUpContinuation, "còn gì nữa", "", &context);
        assert!(prompt.contains("NGỮ CẢNH HỘI THOẠI"));
        assert!(prompt.contains("chủ đề \"Đang hỏi về ngân hàng đề thi\""));
        assert!(prompt.contains("..."));

        let balanced = build_prompt(&table, StrategyKind::Balanced, "học phí", "20 triệu", &context);
        assert!(!balanced.contains("NGỮ CẢNH HỘI THOẠI"));
        assert!(balanced.contains("20 triệu"));
    }
}
