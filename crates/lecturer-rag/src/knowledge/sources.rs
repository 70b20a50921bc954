use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{KnowledgeRecord, KnowledgeSource, SourcePriority};

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    category: Option<String>,
}

impl RawRecord {
    fn into_record(self, default_category: &str, priority: SourcePriority) -> Option<KnowledgeRecord> {
        let question = self.question.trim();
        if question.is_empty() {
            return None;
        }
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_category.to_string());
        Some(KnowledgeRecord::new(question, self.answer.trim(), category, priority))
    }
}

/// `question,answer[,category]` CSV with a header row.
pub struct CsvSource {
    path: PathBuf,
    default_category: String,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, default_category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_category: default_category.into(),
        }
    }

    pub fn from_reader<R: Read>(reader: R, default_category: &str) -> Result<Vec<KnowledgeRecord>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers().context("CSV has no header row")?;
        if !headers.iter().any(|h| h == "question") || !headers.iter().any(|h| h == "answer") {
            return Err(anyhow!("CSV must have 'question' and 'answer' columns"));
        }

        let mut records = Vec::new();
        for row in csv_reader.deserialize::<RawRecord>() {
            let raw = row.context("Malformed CSV row")?;
            records.extend(raw.into_record(default_category, SourcePriority::Dataset));
        }
        Ok(records)
    }
}

impl KnowledgeSource for CsvSource {
    fn name(&self) -> &str {
        "dataset"
    }

    fn priority(&self) -> SourcePriority {
        SourcePriority::Dataset
    }

    fn load(&self) -> Result<Vec<KnowledgeRecord>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        Self::from_reader(file, &self.default_category)
    }
}

/// JSON array of `{question, answer, category?}` objects.
pub struct JsonSource {
    path: PathBuf,
    default_category: String,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>, default_category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_category: default_category.into(),
        }
    }

    pub fn parse(content: &str, default_category: &str) -> Result<Vec<KnowledgeRecord>> {
        let raw: Vec<RawRecord> =
            serde_json::from_str(content).context("Failed to parse curated knowledge")?;
        Ok(raw
            .into_iter()
            .filter_map(|r| r.into_record(default_category, SourcePriority::Curated))
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeSource for JsonSource {
    fn name(&self) -> &str {
        "curated"
    }

    fn priority(&self) -> SourcePriority {
        SourcePriority::Curated
    }

    fn load(&self) -> Result<Vec<KnowledgeRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Self::parse(&content, &self.default_category)
    }
}

/// The four lecturer records compiled into the crate.
pub struct BuiltinSource;

impl KnowledgeSource for BuiltinSource {
    fn name(&self) -> &str {
        "builtin"
    }

    fn priority(&self) -> SourcePriority {
        SourcePriority::Builtin
    }

    fn load(&self) -> Result<Vec<KnowledgeRecord>> {
        Ok(builtin_records())
    }
}

pub fn builtin_records() -> Vec<KnowledgeRecord> {
    const CATEGORY: &str = "Giảng viên";
    [
        (
            "ngân hàng đề thi",
            "Giảng viên cần báo cáo kết quả xây dựng ngân hàng đề thi kết thúc học phần và lập kế hoạch cho học kỳ tiếp theo. Nộp về Phòng Đảm bảo chất lượng và Khảo thí qua email ldkham@bdu.edu.vn trước hạn quy định.",
        ),
        (
            "kê khai nhiệm vụ năm học",
            "Giảng viên cơ hữu và thỉnh giảng cần kê khai nhiệm vụ năm học bao gồm giảng dạy, nghiên cứu khoa học và các hoạt động khác. Khoa tổng hợp và báo cáo lên nhà trường.",
        ),
        (
            "tạp chí khoa học",
            "Tạp chí Khoa học và Công nghệ Trường Đại học Bình Dương nhận bài viết từ giảng viên, nghiên cứu sinh và các nhà khoa học. Gửi bài qua email chỉ định của tòa soạn.",
        ),
        (
            "thi đua khen thưởng",
            "Nhà trường tổ chức đánh giá thi đua, khen thưởng cá nhân và tập thể xuất sắc trong năm học. Có các danh hiệu như Chiến sĩ thi đua, Lao động tiên tiến...",
        ),
    ]
    .into_iter()
    .map(|(q, a)| KnowledgeRecord::new(q, a, CATEGORY, SourcePriority::Builtin))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_without_category_uses_default() {
        let data = "question,answer\nHọc phí bao nhiêu?,Khoảng 20 triệu/năm\n,bỏ qua\n";
        let records = CsvSource::from_reader(data.as_bytes(), "Giảng viên").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "Giảng viên");
        assert_eq!(records[0].source_priority, SourcePriority::Dataset);
    }

    #[test]
    fn csv_keeps_explicit_category() {
        let data = "question,answer,category\n\"Lịch giảng dạy, học kỳ 1\",Xem trên cổng,Đào tạo\n";
        let records = CsvSource::from_reader(data.as_bytes(), "Giảng viên").unwrap();
        assert_eq!(records[0].question, "Lịch giảng dạy, học kỳ 1");
        assert_eq!(records[0].category, "Đào tạo");
    }

    #[test]
    fn csv_requires_question_and_answer_columns() {
        let data = "title,body\na,b\n";
        assert!(CsvSource::from_reader(data.as_bytes(), "Giảng viên").is_err());
    }

    #[test]
    fn json_records_are_curated() {
        let json = r#"[{"question": "Nộp đề thi ở đâu?", "answer": "Phòng Khảo thí"}]"#;
        let records = JsonSource::parse(json, "Giảng viên").unwrap();
        assert_eq!(records[0].source_priority, SourcePriority::Curated);
    }

    #[test]
    fn missing_file_is_an_error() {
        let source = CsvSource::new("/nonexistent/QA.csv", "Giảng viên");
        assert!(source.load().is_err());
    }
}
