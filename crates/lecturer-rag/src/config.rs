use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AssistError;
use crate::rag::strategy::{StrategyTable, BALANCED};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub thresholds: TrustThresholds,
    pub intent: IntentConfig,
    pub memory: MemoryConfig,
    pub generation: GenerationConfig,
    pub query: QueryLimits,
    pub knowledge: KnowledgeConfig,
    pub strategies: StrategyTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub cache_size: usize,
    /// BERT-style exports expect a `token_type_ids` input next to ids and mask.
    pub use_token_type_ids: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    /// Hits at or below this similarity are not reported as sources.
    pub source_min_similarity: f32,
    pub max_sources: usize,
}

/// Lower bounds (inclusive) of the high, medium and low trust tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustThresholds {
    pub high: f32,
    pub medium: f32,
    pub low: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Applied to an intent's threshold when no embedding backend is present.
    pub fallback_multiplier: f32,
    /// Applied to an intent's threshold when embeddings are blended in.
    pub semantic_multiplier: f32,
    /// Share of the final score taken from embedding similarity.
    pub embedding_weight: f32,
    /// Bonus per distinct keyword matched beyond the first.
    pub multi_match_bonus: f32,
    /// Confidence reported for the generic `general` intent.
    pub general_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub context_window: usize,
    pub summary_window: usize,
    pub sticky_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub model: String,
    /// Overrides the default Gemini endpoint derived from `model`.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Curated JSON records, loaded ahead of the dataset.
    pub curated_path: Option<PathBuf>,
    /// Bundled `question,answer[,category]` CSV dataset.
    pub dataset_path: Option<PathBuf>,
    pub default_category: String,
}

impl AssistantConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), AssistError> {
        let t = &self.thresholds;
        if !(t.high > t.medium && t.medium > t.low && t.low > 0.0 && t.high <= 1.0) {
            return Err(AssistError::Config(
                "thresholds must satisfy 0 < low < medium < high <= 1".into(),
            ));
        }
        if self.embedding.enabled && self.embedding.dimension == 0 {
            return Err(AssistError::Config("embedding.dimension must be > 0".into()));
        }
        if self.search.top_k == 0 {
            return Err(AssistError::Config("search.top_k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.intent.embedding_weight) {
            return Err(AssistError::Config(
                "intent.embedding_weight must be in [0.0, 1.0]".into(),
            ));
        }
        if self.intent.fallback_multiplier <= 0.0 || self.intent.semantic_multiplier <= 0.0 {
            return Err(AssistError::Config("intent multipliers must be > 0".into()));
        }
        if self.memory.capacity == 0 {
            return Err(AssistError::Config("memory.capacity must be > 0".into()));
        }
        if self.memory.context_window > self.memory.capacity {
            return Err(AssistError::Config(
                "memory.context_window must be <= memory.capacity".into(),
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(AssistError::Config("generation.timeout_secs must be > 0".into()));
        }
        if self.query.min_chars > self.query.max_chars {
            return Err(AssistError::Config("query.min_chars must be <= query.max_chars".into()));
        }
        if self.strategies.get(BALANCED).is_none() {
            return Err(AssistError::Config(format!(
                "strategies must define the '{}' fallback profile",
                BALANCED
            )));
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, AssistError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AssistError::Config(format!("Failed to read config file: {}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| AssistError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn generation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.generation.timeout_secs)
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lecturer-rag");

        Self {
            knowledge: KnowledgeConfig {
                curated_path: Some(data_dir.join("knowledge.json")),
                dataset_path: Some(data_dir.join("QA.csv")),
                ..KnowledgeConfig::default()
            },
            embedding: EmbeddingConfig {
                model_dir: default_model_dir(&data_dir),
                ..EmbeddingConfig::default()
            },
            data_dir,
            search: SearchConfig::default(),
            thresholds: TrustThresholds::default(),
            intent: IntentConfig::default(),
            memory: MemoryConfig::default(),
            generation: GenerationConfig::default(),
            query: QueryLimits::default(),
            strategies: StrategyTable::default(),
        }
    }
}

fn default_model_dir(data_dir: &Path) -> PathBuf {
    if Path::new("models").exists() {
        PathBuf::from("models")
    } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
        PathBuf::from(env_path)
    } else {
        data_dir.join("models")
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: PathBuf::from("models"),
            dimension: 768,
            max_length: 256,
            cache_size: 1000,
            use_token_type_ids: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            source_min_similarity: 0.2,
            max_sources: 2,
        }
    }
}

impl Default for TrustThresholds {
    fn default() -> Self {
        Self {
            high: 0.70,
            medium: 0.50,
            low: 0.25,
        }
    }
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            fallback_multiplier: 0.3,
            semantic_multiplier: 0.5,
            embedding_weight: 0.3,
            multi_match_bonus: 0.3,
            general_confidence: 0.3,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            context_window: 5,
            summary_window: 3,
            sticky_window: 3,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-1.5-flash".to_string(),
            endpoint: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 20,
            max_retries: 1,
        }
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            min_chars: 2,
            max_chars: 1000,
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            curated_path: None,
            dataset_path: None,
            default_category: "Giảng viên".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.capacity, 10);
        assert_eq!(config.thresholds.high, 0.70);
    }

    #[test]
    fn rejects_non_monotonic_thresholds() {
        let mut config = AssistantConfig::default();
        config.thresholds.medium = 0.8;
        assert!(matches!(config.validate(), Err(AssistError::Config(_))));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "memory": { "capacity": 4, "context_window": 2 }, "generation": { "enabled": false } }"#;
        let config: AssistantConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.memory.capacity, 4);
        assert_eq!(config.memory.sticky_window, 3);
        assert!(!config.generation.enabled);
        assert_eq!(config.generation.timeout_secs, 20);
        assert_eq!(config.generation_timeout(), std::time::Duration::from_secs(20));
        assert!(config.strategies.get(BALANCED).is_some());
        assert!(config.validate().is_ok());
    }
}
