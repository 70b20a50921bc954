use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue, SessionOutputs};
use ort::value::Value;
use parking_lot::{Mutex, RwLock};
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{l2_normalize, EmbeddingModel};
use crate::config::EmbeddingConfig;

const MODEL_DIRS: [&str; 2] = ["vietnamese-sbert", "sbert"];
const MAX_BATCH_SIZE: usize = 8;

#[derive(Clone, Debug)]
pub struct SbertConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub cache_size: usize,
    pub use_token_type_ids: bool,
}

impl SbertConfig {
    /// Look for `model.onnx` + `tokenizer.json` under a known sub-directory
    /// of `settings.model_dir`, or directly inside it.
    pub fn auto_detect(settings: &EmbeddingConfig) -> Option<Self> {
        let model_dir = &settings.model_dir;
        let base_path = MODEL_DIRS
            .iter()
            .map(|d| model_dir.join(d))
            .find(|p| p.exists())
            .unwrap_or_else(|| model_dir.clone());

        let model_path = ["model_quantized.onnx", "model.onnx"]
            .iter()
            .map(|f| base_path.join(f))
            .find(|p| p.exists())?;
        let tokenizer_path = base_path.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return None;
        }

        Some(Self {
            model_path,
            tokenizer_path,
            dimension: settings.dimension,
            max_length: settings.max_length,
            cache_size: settings.cache_size,
            use_token_type_ids: settings.use_token_type_ids,
        })
    }
}

/// ONNX export of a sentence-transformers model, mean pooled and L2 normalized.
pub struct SbertEmbeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    config: SbertConfig,
    cache: Arc<RwLock<lru::LruCache<String, Vec<f32>>>>,
}

impl SbertEmbeddings {
    pub fn new(config: SbertConfig) -> Result<Self> {
        ort::init().with_name("lecturer_embeddings").commit();

        if !config.model_path.exists() {
            return Err(anyhow!(
                "Model file not found at: {}",
                config.model_path.display()
            ));
        }

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let cache_size = NonZeroUsize::new(config.cache_size.max(1))
            .ok_or_else(|| anyhow!("cache size must be non-zero"))?;

        info!(
            model = %config.model_path.display(),
            dimension = config.dimension,
            "Loaded sentence embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
            cache: Arc::new(RwLock::new(lru::LruCache::new(cache_size))),
        })
    }

    pub fn from_settings(settings: &EmbeddingConfig) -> Result<Self> {
        let config = SbertConfig::auto_detect(settings).ok_or_else(|| {
            anyhow!(
                "No ONNX sentence model found under {}",
                settings.model_dir.display()
            )
        })?;
        Self::new(config)
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }

    /// Token ids, attention mask and type ids, each padded to `padded_len`.
    fn encode_padded(
        &self,
        texts: &[&str],
    ) -> Result<(Vec<i64>, Vec<i64>, Vec<i64>, usize)> {
        let mut encoded = Vec::with_capacity(texts.len());
        let mut max_len = 0;
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(*text, true)
                .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
            let len = encoding.get_ids().len().min(self.config.max_length);
            max_len = max_len.max(len);
            encoded.push(encoding);
        }

        let padded_len = max_len.max(1);
        let total = texts.len() * padded_len;
        let mut ids = Vec::with_capacity(total);
        let mut mask = Vec::with_capacity(total);
        let mut types = Vec::with_capacity(total);

        for encoding in &encoded {
            let len = encoding.get_ids().len().min(padded_len);
            ids.extend(encoding.get_ids()[..len].iter().map(|&id| id as i64));
            mask.extend(encoding.get_attention_mask()[..len].iter().map(|&m| m as i64));
            types.extend(encoding.get_type_ids()[..len].iter().map(|&t| t as i64));
            for _ in len..padded_len {
                ids.push(0);
                mask.push(0);
                types.push(0);
            }
        }

        Ok((ids, mask, types, padded_len))
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let (ids, mask, types, padded_len) = self.encode_padded(texts)?;
        let batch_size = texts.len();
        let shape = vec![batch_size, padded_len];

        let input_ids = Value::from_array((shape.clone(), ids))
            .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
        let attention_mask = Value::from_array((shape.clone(), mask.clone()))
            .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

        let mut inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        ];
        if self.config.use_token_type_ids {
            let token_type_ids = Value::from_array((shape, types))
                .map_err(|e| anyhow!("token_type_ids tensor: {:?}", e))?;
            inputs.push((
                Cow::Borrowed("token_type_ids"),
                SessionInputValue::from(token_type_ids),
            ));
        }

        let mut session = self.session.lock();
        let outputs = session
            .run(inputs)
            .map_err(|e| anyhow!("Inference failed: {:?}", e))?;

        self.pool_outputs(&outputs, &mask, batch_size, padded_len)
    }

    fn pool_outputs(
        &self,
        outputs: &SessionOutputs,
        mask: &[i64],
        batch_size: usize,
        padded_len: usize,
    ) -> Result<Vec<Vec<f32>>> {
        if outputs.iter().any(|(name, _)| name == "sentence_embedding") {
            let (shape, data) = outputs["sentence_embedding"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract sentence_embedding: {:?}", e))?;
            let hidden_dim = shape[1] as usize;
            return Ok((0..batch_size)
                .map(|i| l2_normalize(data[i * hidden_dim..(i + 1) * hidden_dim].to_vec()))
                .collect());
        }

        let output_name = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state" || *name == "token_embeddings")
            .or_else(|| outputs.iter().next())
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| anyhow!("Model produced no outputs"))?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract output '{}': {:?}", output_name, e))?;
        if shape.len() != 3 {
            return Err(anyhow!("Unexpected output rank {} for '{}'", shape.len(), output_name));
        }
        let seq_len = shape[1] as usize;
        let hidden_dim = shape[2] as usize;

        let mut pooled_batch = Vec::with_capacity(batch_size);
        for sample in 0..batch_size {
            let mut pooled = vec![0.0f32; hidden_dim];
            let mut mask_sum = 0.0f32;
            for pos in 0..seq_len.min(padded_len) {
                let mask_val = mask[sample * padded_len + pos] as f32;
                if mask_val > 0.0 {
                    mask_sum += mask_val;
                    let offset = (sample * seq_len + pos) * hidden_dim;
                    for (dim, value) in pooled.iter_mut().enumerate() {
                        *value += data[offset + dim] * mask_val;
                    }
                }
            }
            if mask_sum > 0.0 {
                for value in &mut pooled {
                    *value /= mask_sum;
                }
            }
            pooled_batch.push(l2_normalize(pooled));
        }
        Ok(pooled_batch)
    }
}

impl EmbeddingModel for SbertEmbeddings {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.write().get(text) {
            return Ok(cached.clone());
        }

        let embedding = self
            .run_batch(&[text])?
            .pop()
            .ok_or_else(|| anyhow!("Model returned an empty batch"))?;

        self.cache.write().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            all_embeddings.extend(self.run_batch(batch)?);
        }
        debug!(count = all_embeddings.len(), "Embedded batch");
        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
