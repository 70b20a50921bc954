//! Question/answer records and the sources they are loaded from.

pub mod sources;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AssistError;

pub use sources::{BuiltinSource, CsvSource, JsonSource};

/// Where a record came from. Lower ordinals are loaded first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Hand-maintained records from the administration.
    Curated = 0,
    /// The bundled general-purpose dataset.
    Dataset = 1,
    /// Records compiled into the binary.
    Builtin = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub question: String,
    pub answer: String,
    pub category: String,
    pub source_priority: SourcePriority,
}

impl KnowledgeRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
        source_priority: SourcePriority,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            category: category.into(),
            source_priority,
        }
    }
}

/// A collaborator that yields knowledge records.
pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> SourcePriority;

    fn load(&self) -> anyhow::Result<Vec<KnowledgeRecord>>;
}

/// Loads every source and concatenates the results, highest priority first.
///
/// Records keep their in-source order and are not deduplicated. A failing
/// source is skipped and reported; if nothing yields records the built-in
/// lecturer records are used instead.
pub fn merge_sources(
    sources: &[Box<dyn KnowledgeSource>],
) -> (Vec<KnowledgeRecord>, Vec<AssistError>) {
    let mut ordered: Vec<&dyn KnowledgeSource> = sources.iter().map(|s| s.as_ref()).collect();
    ordered.sort_by_key(|s| s.priority());

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for source in ordered {
        match source.load() {
            Ok(loaded) => {
                info!(source = source.name(), count = loaded.len(), "Loaded knowledge source");
                records.extend(loaded);
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "Knowledge source failed");
                failures.push(AssistError::KnowledgeSource {
                    source_name: source.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if records.is_empty() {
        warn!("No knowledge records loaded, using built-in lecturer records");
        records = sources::builtin_records();
    }

    (records, failures)
}
