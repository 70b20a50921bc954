//! Entity extraction and lightweight query signals (urgency, complexity, sentiment).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::search::normalizer::{tokenize, TermPosition, TermSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Position,
    DocumentType,
    Activity,
    Major,
    TimeExpression,
    Emotion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub value: String,
    /// Match confidence; for emotions this is the intensity.
    pub confidence: f32,
}

/// At most one entity per kind, produced fresh for every query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityBag(BTreeMap<EntityKind, Entity>);

impl EntityBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, value: impl Into<String>, confidence: f32) {
        self.0.insert(
            kind,
            Entity {
                value: value.into(),
                confidence,
            },
        );
    }

    pub fn get(&self, kind: EntityKind) -> Option<&Entity> {
        self.0.get(&kind)
    }

    pub fn value(&self, kind: EntityKind) -> Option<&str> {
        self.get(kind).map(|e| e.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKind, &Entity)> {
        self.0.iter()
    }
}

/// Confidence for a whole-query match and for a partial match.
struct PatternList {
    kind: EntityKind,
    terms: TermSet,
    exact_confidence: f32,
    partial_confidence: f32,
}

const URGENT_EMOTIONS: &[&str] = &["cần gấp", "khẩn cấp", "urgent", "can gap", "khan cap"];
const IMPORTANCE_EMOTIONS: &[&str] = &["quan trọng", "ưu tiên", "quan trong", "uu tien"];
const DISTRESS_EMOTIONS: &[&str] = &["lo lắng", "khó khăn", "lo lang", "kho khan"];

static PATTERNS: LazyLock<Vec<PatternList>> = LazyLock::new(|| {
    let table: [(EntityKind, f32, f32, &[&str]); 6] = [
        (EntityKind::Department, 1.0, 0.9, &[
            "phòng đảm bảo chất lượng", "phòng khảo thí", "phòng tổ chức cán bộ",
            "phòng nghiên cứu hợp tác", "phòng đào tạo", "phòng công tác sinh viên",
            "phong dam bao chat luong", "phong khao thi", "phong to chuc can bo",
            "phong nghien cuu hop tac", "phong dao tao", "phong cong tac sinh vien",
        ]),
        (EntityKind::Position, 1.0, 0.8, &[
            "giảng viên", "giảng viên cơ hữu", "giảng viên thỉnh giảng", "phó giáo sư",
            "tiến sĩ", "thạc sĩ", "trưởng khoa", "phó khoa", "giang vien", "giang vien co huu",
            "giang vien thinh giang", "pho giao su", "tien si", "thac si", "truong khoa",
            "pho khoa",
        ]),
        (EntityKind::DocumentType, 1.0, 1.0, &[
            "báo cáo", "kế hoạch", "thông báo", "quyết định", "file mềm", "bao cao", "ke hoach",
            "thong bao", "quyet dinh", "file mem", "văn bản", "hồ sơ", "tài liệu", "van ban",
            "ho so", "tai lieu",
        ]),
        (EntityKind::Activity, 1.0, 1.0, &[
            "giảng dạy", "nghiên cứu khoa học", "phục vụ cộng đồng", "giang day",
            "nghien cuu khoa hoc", "phuc vu cong dong", "thi đua", "khen thưởng", "đánh giá",
            "thi dua", "khen thuong", "danh gia",
        ]),
        (EntityKind::Major, 1.0, 0.8, &[
            "công nghệ thông tin", "cntt", "it", "khoa học máy tính", "tin học", "kinh tế",
            "quản trị kinh doanh", "marketing", "tài chính ngân hàng", "kế toán", "luật",
            "luật học", "pháp lý", "luật kinh tế", "y khoa", "y học", "bác sĩ", "điều dưỡng",
            "dược", "y tế", "kỹ thuật", "xây dựng", "cơ khí", "điện", "điện tử", "oto",
        ]),
        (EntityKind::TimeExpression, 1.0, 1.0, &[
            "năm học 2023-2024", "học kỳ I", "học kỳ II", "kỳ hè", "nam hoc 2023-2024",
            "hoc ky I", "hoc ky II", "ky he", "trước ngày", "hạn cuối", "deadline", "truoc ngay",
            "han cuoi",
        ]),
    ];
    table
        .into_iter()
        .map(|(kind, exact_confidence, partial_confidence, terms)| PatternList {
            kind,
            terms: TermSet::new(terms),
            exact_confidence,
            partial_confidence,
        })
        .collect()
});

static EMOTIONS: LazyLock<TermSet> = LazyLock::new(|| {
    TermSet::new(&[
        "cần gấp", "khẩn cấp", "urgent", "quan trọng", "ưu tiên", "can gap", "khan cap",
        "quan trong", "uu tien", "lo lắng", "khó khăn", "căng thẳng", "stress", "lo lang",
        "kho khan", "cang thang",
    ])
});

fn emotion_intensity(emotion: &str) -> f32 {
    if URGENT_EMOTIONS.contains(&emotion) {
        0.9
    } else if IMPORTANCE_EMOTIONS.contains(&emotion) {
        0.8
    } else if DISTRESS_EMOTIONS.contains(&emotion) {
        0.7
    } else {
        0.6
    }
}

/// First-match-wins extraction over fixed, ordered pattern lists.
#[derive(Debug, Clone, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, query: &str) -> EntityBag {
        let mut bag = EntityBag::new();
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return bag;
        }

        for list in PATTERNS.iter() {
            if let Some(term) = list.terms.first_match(&tokens) {
                let confidence = if term.position_in(&tokens) == Some(TermPosition::Exact) {
                    list.exact_confidence
                } else {
                    list.partial_confidence
                };
                bag.insert(list.kind, term.text.clone(), confidence);
            }
        }

        if let Some(term) = EMOTIONS.first_match(&tokens) {
            bag.insert(EntityKind::Emotion, term.text.clone(), emotion_intensity(&term.text));
        }
        bag
    }
}

// ============================================================================
// Signals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Complex,
    Medium,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Urgent,
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySignals {
    pub urgency: Urgency,
    pub complexity: Complexity,
    pub sentiment: Sentiment,
    pub is_question: bool,
    pub char_length: usize,
    pub word_count: usize,
}

struct SignalTables {
    urgent: TermSet,
    medium_urgent: TermSet,
    technical: TermSet,
    positive: TermSet,
    negative: TermSet,
    urgent_sentiment: TermSet,
}

static SIGNALS: LazyLock<SignalTables> = LazyLock::new(|| SignalTables {
    urgent: TermSet::new(&[
        "gấp", "urgent", "khẩn cấp", "cần ngay", "hạn cuối", "deadline", "gap", "khan cap",
        "can ngay", "han cuoi",
    ]),
    medium_urgent: TermSet::new(&[
        "sớm", "nhanh chóng", "ưu tiên", "quan trọng", "som", "nhanh chong", "uu tien",
        "quan trong",
    ]),
    technical: TermSet::new(&[
        "ngân hàng đề thi", "kê khai nhiệm vụ", "tạp chí khoa học", "đảm bảo chất lượng",
        "phần mềm quản lý",
    ]),
    positive: TermSet::new(&[
        "tốt", "hay", "thích", "muốn", "quan tâm", "hào hứng", "hỗ trợ", "tot", "thich",
        "quan tam", "hao hung", "ho tro",
    ]),
    negative: TermSet::new(&[
        "khó khăn", "lo lắng", "không", "chán", "tệ", "vấn đề", "lỗi", "kho khan", "lo lang",
        "khong", "chan", "te", "van de", "loi",
    ]),
    urgent_sentiment: TermSet::new(&[
        "gấp", "khẩn cấp", "cần ngay", "gap", "khan cap", "can ngay",
    ]),
});

const COMPLEX_WORDS: usize = 20;
const MEDIUM_WORDS: usize = 10;

/// Urgency, complexity and sentiment of `query`, with emotion hints from `entities`.
pub fn analyze_signals(query: &str, entities: &EntityBag) -> QuerySignals {
    let tokens = tokenize(query);
    let word_count = query.split_whitespace().count();
    let tables = &*SIGNALS;

    let urgency = if tables.urgent.any_match(&tokens) {
        Urgency::High
    } else if tables.medium_urgent.any_match(&tokens) {
        Urgency::Medium
    } else {
        Urgency::Normal
    };

    let question_marks = query.matches('?').count();
    let complexity = if word_count > COMPLEX_WORDS
        || question_marks > 1
        || tables.technical.any_match(&tokens)
    {
        Complexity::Complex
    } else if word_count > MEDIUM_WORDS {
        Complexity::Medium
    } else {
        Complexity::Simple
    };

    let mut positive = tables.positive.count_matches(&tokens);
    let mut negative = tables.negative.count_matches(&tokens);
    let mut urgent = tables.urgent_sentiment.count_matches(&tokens);
    if let Some(emotion) = entities.value(EntityKind::Emotion) {
        if IMPORTANCE_EMOTIONS.contains(&emotion) {
            positive += 1;
        } else if DISTRESS_EMOTIONS.contains(&emotion) {
            negative += 2;
        } else if URGENT_EMOTIONS.contains(&emotion) && emotion != "urgent" {
            urgent += 2;
        }
    }

    let sentiment = if urgent > 0 {
        Sentiment::Urgent
    } else if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    QuerySignals {
        urgency,
        complexity,
        sentiment,
        is_question: query.contains('?'),
        char_length: query.chars().count(),
        word_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins_per_kind() {
        let bag = EntityExtractor::new().extract("Giảng viên cơ hữu nộp báo cáo cho phòng khảo thí");
        assert_eq!(bag.value(EntityKind::Position), Some("giảng viên"));
        assert_eq!(bag.get(EntityKind::Position).unwrap().confidence, 0.8);
        assert_eq!(bag.value(EntityKind::Department), Some("phòng khảo thí"));
        assert_eq!(bag.value(EntityKind::DocumentType), Some("báo cáo"));
    }

    #[test]
    fn whole_query_match_is_fully_confident() {
        let bag = EntityExtractor::new().extract("kế toán");
        assert_eq!(bag.get(EntityKind::Major).unwrap().confidence, 1.0);
    }

    #[test]
    fn emotion_intensity_follows_table() {
        let extractor = EntityExtractor::new();
        let urgent = extractor.extract("cần gấp thông tin");
        assert_eq!(urgent.get(EntityKind::Emotion).unwrap().confidence, 0.9);
        let important = extractor.extract("việc này quan trọng");
        assert_eq!(important.get(EntityKind::Emotion).unwrap().confidence, 0.8);
        let distress = extractor.extract("em đang khó khăn");
        assert_eq!(distress.get(EntityKind::Emotion).unwrap().confidence, 0.7);
        let stress = extractor.extract("stress quá");
        assert_eq!(stress.get(EntityKind::Emotion).unwrap().confidence, 0.6);
    }

    #[test]
    fn short_tokens_do_not_match_inside_words() {
        let bag = EntityExtractor::new().extract("lịch thi đợt này");
        assert!(bag.get(EntityKind::Major).is_none());
    }

    #[test]
    fn empty_query_has_no_entities() {
        assert!(EntityExtractor::new().extract("").is_empty());
    }

    #[test]
    fn complexity_tiers() {
        let empty = EntityBag::new();
        assert_eq!(analyze_signals("học phí?", &empty).complexity, Complexity::Simple);
        assert_eq!(
            analyze_signals("một hai ba bốn năm sáu bảy tám chín mười mười một", &empty).complexity,
            Complexity::Medium
        );
        assert_eq!(analyze_signals("a? b?", &empty).complexity, Complexity::Complex);
        assert_eq!(
            analyze_signals("hỏi về ngân hàng đề thi", &empty).complexity,
            Complexity::Complex
        );
    }

    #[test]
    fn urgent_sentiment_wins() {
        let query = "cần gấp, em thích nhưng đang lo lắng";
        let bag = EntityExtractor::new().extract(query);
        assert_eq!(analyze_signals(query, &bag).sentiment, Sentiment::Urgent);
    }

    #[test]
    fn distress_hint_tips_sentiment_negative() {
        let query = "em muốn hỏi nhưng đang khó khăn";
        let bag = EntityExtractor::new().extract(query);
        let signals = analyze_signals(query, &bag);
        assert_eq!(signals.sentiment, Sentiment::Negative);
        assert_eq!(signals.urgency, Urgency::Normal);
    }

    #[test]
    fn balanced_counts_are_neutral() {
        let empty = EntityBag::new();
        assert_eq!(analyze_signals("tốt nhưng lỗi", &empty).sentiment, Sentiment::Neutral);
    }
}
