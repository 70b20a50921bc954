//! Dialogue strategy selection and the table of per-strategy generation
//! profiles and prompt templates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use super::intent::IntentResult;
use super::topics::detect_topic;
use crate::search::normalizer::{tokenize, TermSet};

pub const BALANCED: &str = "balanced";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    QuickClarify,
    DirectEnhance,
    ConversationalBrief,
    StructuredInfo,
    SupportiveBrief,
    FollowUpContinuation,
    FollowUpClarification,
    TopicShift,
    MemoryReference,
    Balanced,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 10] = [
        StrategyKind::QuickClarify,
        StrategyKind::DirectEnhance,
        StrategyKind::ConversationalBrief,
        StrategyKind::StructuredInfo,
        StrategyKind::SupportiveBrief,
        StrategyKind::FollowUpContinuation,
        StrategyKind::FollowUpClarification,
        StrategyKind::TopicShift,
        StrategyKind::MemoryReference,
        StrategyKind::Balanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::QuickClarify => "quick_clarify",
            StrategyKind::DirectEnhance => "direct_enhance",
            StrategyKind::ConversationalBrief => "conversational_brief",
            StrategyKind::StructuredInfo => "structured_info",
            StrategyKind::SupportiveBrief => "supportive_brief",
            StrategyKind::FollowUpContinuation => "follow_up_continuation",
            StrategyKind::FollowUpClarification => "follow_up_clarification",
            StrategyKind::TopicShift => "topic_shift",
            StrategyKind::MemoryReference => "memory_reference",
            StrategyKind::Balanced => BALANCED,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Sampling parameters handed to the text generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationProfile {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationProfile {
    pub const fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
        }
    }
}

/// One row of the strategy table.
///
/// `template` may use `{query}`, `{topic}` and `{reference}` placeholders.
/// Strategies without a template borrow the `balanced` one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    #[serde(flatten)]
    pub generation: GenerationProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Whether the conversation memory block is included in the prompt.
    #[serde(default = "default_true")]
    pub with_memory: bool,
}

fn default_true() -> bool {
    true
}

const CONTINUATION_TEMPLATE: &str = "NHIỆM VỤ: Thầy/cô đang hỏi tiếp về CÙNG CHỦ ĐỀ.\n\
KIỂM TRA: Thầy/cô hỏi \"{query}\". Đây là câu hỏi tiếp nối về chủ đề \"{topic}\".\n\
HÀNH ĐỘNG: Cung cấp thông tin BỔ SUNG, đừng lặp lại ý cũ. Trả lời ngắn gọn.\n\
DỮ LIỆU THAM KHẢO (nếu có): {reference}";

const CLARIFICATION_TEMPLATE: &str = "NHIỆM VỤ: Thầy/cô muốn làm RÕ HƠN về CÙNG CHỦ ĐỀ.\n\
KIỂM TRA: Thầy/cô hỏi \"{query}\". Đây là yêu cầu làm rõ về chủ đề \"{topic}\".\n\
HÀNH ĐỘNG: Giải thích chi tiết, cụ thể hơn.\n\
DỮ LIỆU THAM KHẢO (nếu có): {reference}";

const TOPIC_SHIFT_TEMPLATE: &str = "NHIỆM VỤ: Thầy/cô đã CHUYỂN SANG một chủ đề MỚI.\n\
KIỂM TRA: Thầy/cô hỏi \"{query}\". Chủ đề này khác với chủ đề trước đó.\n\
HÀNH ĐỘNG: Trả lời trực tiếp vào chủ đề mới, không dùng các cụm từ như \"như đã nói\", \"ngoài ra\".\n\
DỮ LIỆU THAM KHẢO (nếu có): {reference}";

const MEMORY_TEMPLATE: &str = "NHIỆM VỤ: Thầy/cô đang hỏi về những gì đã trao đổi.\n\
KIỂM TRA: Thầy/cô hỏi \"{query}\".\n\
HÀNH ĐỘNG: Dựa vào dòng chảy hội thoại gần đây để tóm tắt ngắn gọn 1-2 ý chính đã trao đổi.";

const BALANCED_TEMPLATE: &str = "NHIỆM VỤ: Trả lời câu hỏi của thầy/cô một cách tự nhiên, cân bằng.\n\
KIỂM TRA: Thầy/cô hỏi \"{query}\".\n\
HÀNH ĐỘNG: Trả lời trực tiếp, ngắn gọn, không tham chiếu hội thoại trước trừ khi thật sự liên quan.\n\
DỮ LIỆU THAM KHẢO (nếu có): {reference}";

/// Strategy name to profile. Adding a row needs no change to selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyTable(BTreeMap<String, StrategyProfile>);

impl StrategyTable {
    pub fn get(&self, name: &str) -> Option<&StrategyProfile> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, profile: StrategyProfile) {
        self.0.insert(name.into(), profile);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Profile for `kind`, or the `balanced` row when the table has none.
    pub fn resolve(&self, kind: StrategyKind) -> Option<&StrategyProfile> {
        self.get(kind.as_str()).or_else(|| self.get(BALANCED))
    }

    /// Template for `kind`, falling back to the `balanced` template.
    pub fn template(&self, kind: StrategyKind) -> &str {
        self.resolve(kind)
            .and_then(|p| p.template.as_deref())
            .or_else(|| self.get(BALANCED).and_then(|p| p.template.as_deref()))
            .unwrap_or(BALANCED_TEMPLATE)
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        let rows: [(StrategyKind, f32, u32, Option<&str>, bool); 10] = [
            (StrategyKind::QuickClarify, 0.3, 60, None, true),
            (StrategyKind::DirectEnhance, 0.4, 120, None, true),
            (StrategyKind::ConversationalBrief, 0.6, 90, None, true),
            (StrategyKind::StructuredInfo, 0.2, 200, None, true),
            (StrategyKind::SupportiveBrief, 0.5, 150, None, true),
            (StrategyKind::FollowUpContinuation, 0.4, 120, Some(CONTINUATION_TEMPLATE), true),
            (StrategyKind::FollowUpClarification, 0.3, 180, Some(CLARIFICATION_TEMPLATE), true),
            (StrategyKind::TopicShift, 0.5, 120, Some(TOPIC_SHIFT_TEMPLATE), true),
            (StrategyKind::MemoryReference, 0.2, 100, Some(MEMORY_TEMPLATE), true),
            (StrategyKind::Balanced, 0.5, 150, Some(BALANCED_TEMPLATE), false),
        ];
        Self(
            rows.into_iter()
                .map(|(kind, temperature, max_tokens, template, with_memory)| {
                    (
                        kind.as_str().to_string(),
                        StrategyProfile {
                            generation: GenerationProfile::new(temperature, max_tokens),
                            template: template.map(str::to_string),
                            with_memory,
                        },
                    )
                })
                .collect(),
        )
    }
}

// ============================================================================
// Selection
// ============================================================================

struct Markers {
    continuation: TermSet,
    clarify: TermSet,
    memory_probe: TermSet,
    urgency: TermSet,
}

static MARKERS: LazyLock<Markers> = LazyLock::new(|| Markers {
    continuation: TermSet::new(&["còn", "thêm", "nữa", "khác", "và", "tiếp theo"]),
    clarify: TermSet::new(&["cụ thể hơn", "rõ hơn", "chi tiết hơn", "giải thích thêm"]),
    memory_probe: TermSet::new(&["nhớ không", "hỏi gì", "nói gì trước", "vừa nói", "tổng hợp"]),
    urgency: TermSet::new(&["khó khăn", "cần gấp", "hạn cuối", "urgent"]),
});

const HIGH_CONFIDENCE: f32 = 0.7;
const SHORT_QUERY_WORDS: usize = 5;

/// Stateless: every input arrives with the call.
#[derive(Debug, Clone, Default)]
pub struct ResponseStrategySelector;

impl ResponseStrategySelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(
        &self,
        query: &str,
        last_query: Option<&str>,
        confidence: f32,
        intent: &IntentResult,
    ) -> StrategyKind {
        let lowered = query.to_lowercase();
        let tokens = tokenize(&lowered);

        if let Some(last) = last_query {
            let last_topic = detect_topic(last).map(|t| t.label);
            let own_topic = detect_topic(&lowered).map(|t| t.label);
            // A follow-up without topic words stays on the previous topic.
            let current_topic = own_topic.or(last_topic);
            let same_topic = last_topic.is_some() && last_topic == current_topic;

            let markers = &*MARKERS;
            let chosen = if markers.continuation.any_match(&tokens) && same_topic {
                Some(StrategyKind::FollowUpContinuation)
            } else if markers.clarify.any_match(&tokens) && same_topic {
                Some(StrategyKind::FollowUpClarification)
            } else if markers.memory_probe.any_match(&tokens) {
                Some(StrategyKind::MemoryReference)
            } else if matches!((last_topic, own_topic), (Some(a), Some(b)) if a != b) {
                Some(StrategyKind::TopicShift)
            } else {
                None
            };

            if let Some(kind) = chosen {
                debug!(strategy = kind.as_str(), ?last_topic, ?current_topic, "Follow-up strategy");
                return kind;
            }
        }

        self.default_strategy(query, &tokens, confidence, intent)
    }

    fn default_strategy(
        &self,
        query: &str,
        tokens: &[String],
        confidence: f32,
        intent: &IntentResult,
    ) -> StrategyKind {
        if confidence > HIGH_CONFIDENCE {
            StrategyKind::DirectEnhance
        } else if intent.is_greeting_or_general()
            && query.split_whitespace().count() <= SHORT_QUERY_WORDS
        {
            StrategyKind::QuickClarify
        } else if MARKERS.urgency.any_match(tokens) {
            StrategyKind::SupportiveBrief
        } else {
            StrategyKind::Balanced
        }
    }
}
