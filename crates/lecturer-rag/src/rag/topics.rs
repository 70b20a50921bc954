//! Ordered topic table shared by the session summary and the strategy selector.

use std::sync::LazyLock;

use crate::search::normalizer::{tokenize, TermSet};

/// Summary used when no topic in the table matches.
pub const DEFAULT_SUMMARY: &str = "Hỏi đáp chung về BDU";

#[derive(Debug)]
pub struct Topic {
    pub label: &'static str,
    pub summary: &'static str,
    keywords: TermSet,
}

/// First entry whose keyword set intersects the text wins.
pub static TOPICS: LazyLock<Vec<Topic>> = LazyLock::new(|| {
    let table: [(&str, &str, &[&str]); 10] = [
        (
            "ngân hàng đề thi",
            "Đang hỏi về ngân hàng đề thi",
            &["ngân hàng", "đề thi", "đề", "khảo thí", "ngan hang", "de thi", "khao thi"],
        ),
        (
            "kê khai nhiệm vụ",
            "Đang hỏi về kê khai nhiệm vụ năm học",
            &["kê khai", "nhiệm vụ", "giờ chuẩn", "ke khai", "nhiem vu", "gio chuan"],
        ),
        (
            "tạp chí khoa học",
            "Đang hỏi về tạp chí khoa học",
            &["tạp chí", "bài viết", "nghiên cứu", "tap chi", "bai viet", "nghien cuu"],
        ),
        (
            "thi đua khen thưởng",
            "Đang hỏi về thi đua khen thưởng",
            &["thi đua", "khen thưởng", "danh hiệu", "thi dua", "khen thuong", "danh hieu"],
        ),
        (
            "báo cáo",
            "Đang hỏi về báo cáo và thủ tục",
            &["báo cáo", "nộp", "hạn cuối", "bao cao", "nop", "han cuoi"],
        ),
        (
            "lịch giảng dạy",
            "Đang hỏi về lịch giảng dạy",
            &["lịch", "giảng dạy", "thời khóa biểu", "lich", "giang day", "thoi khoa bieu"],
        ),
        (
            "cơ sở vật chất",
            "Đang hỏi về cơ sở vật chất",
            &["cơ sở", "phòng", "trang thiết bị", "co so", "trang thiet bi"],
        ),
        (
            "học phí",
            "Đang quan tâm học phí",
            &["học phí", "phí", "tiền học", "chi phí", "tiền", "hoc phi", "tien hoc", "chi phi"],
        ),
        (
            "tuyển sinh",
            "Đang hỏi về tuyển sinh",
            &["tuyển sinh", "nhập học", "đăng ký", "điểm", "xét tuyển", "tuyen sinh", "xet tuyen"],
        ),
        (
            "ngành học",
            "Đang tìm hiểu về ngành học",
            &["ngành", "chuyên ngành", "khoa", "đào tạo", "nganh", "chuyen nganh", "dao tao"],
        ),
    ];

    table
        .into_iter()
        .map(|(label, summary, keywords)| Topic {
            label,
            summary,
            keywords: TermSet::new(keywords),
        })
        .collect()
});

/// First topic whose keywords appear in `text`.
pub fn detect_topic(text: &str) -> Option<&'static Topic> {
    let tokens = tokenize(text);
    TOPICS.iter().find(|t| t.keywords.any_match(&tokens))
}

/// Summary over the concatenation of `queries`, or [`DEFAULT_SUMMARY`].
pub fn summarize<'a>(queries: impl IntoIterator<Item = &'a str>) -> &'static str {
    let joined = queries.into_iter().collect::<Vec<_>>().join(" ");
    detect_topic(&joined)
        .map(|t| t.summary)
        .unwrap_or(DEFAULT_SUMMARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_decides_ties() {
        let topic = detect_topic("nộp ngân hàng đề thi").unwrap();
        assert_eq!(topic.label, "ngân hàng đề thi");
    }

    #[test]
    fn unknown_text_has_no_topic() {
        assert!(detect_topic("thời tiết hôm nay").is_none());
        assert_eq!(summarize(["thời tiết hôm nay"]), DEFAULT_SUMMARY);
    }

    #[test]
    fn summary_scans_all_given_queries() {
        let summary = summarize(["xin chào", "kê khai giờ chuẩn thế nào"]);
        assert_eq!(summary, "Đang hỏi về kê khai nhiệm vụ năm học");
    }

    #[test]
    fn unaccented_spelling_resolves() {
        assert_eq!(detect_topic("hoc phi nam nay").unwrap().label, "học phí");
    }
}
