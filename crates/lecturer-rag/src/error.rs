use std::time::Duration;

use thiserror::Error;

/// Failures raised at the component boundaries of the assistant.
///
/// None of these reach the caller of `process_query`: index and generation
/// errors degrade to keyword search and templated text, and invalid input is
/// reported as a rejected [`crate::types::QueryResponse`].
#[derive(Debug, Error)]
pub enum AssistError {
    #[error("index build failed: {reason} ({dropped} of {total} records dropped)")]
    IndexBuild {
        reason: String,
        dropped: usize,
        total: usize,
    },

    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryRejection),

    #[error("knowledge source '{source_name}' failed: {reason}")]
    KnowledgeSource { source_name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a query was refused before entering the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRejection {
    #[error("query is empty")]
    Empty,
    #[error("query is shorter than {min} characters")]
    TooShort { min: usize },
    #[error("query is longer than {max} characters")]
    TooLong { max: usize },
}

pub type AssistResult<T> = std::result::Result<T, AssistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_convert_to_invalid_query() {
        let err = AssistError::from(QueryRejection::TooShort { min: 2 });
        assert!(matches!(err, AssistError::InvalidQuery(QueryRejection::TooShort { min: 2 })));
        assert_eq!(err.to_string(), "invalid query: query is shorter than 2 characters");
    }
}
