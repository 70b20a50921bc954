pub mod sbert;

use anyhow::Result;

pub use sbert::{SbertConfig, SbertEmbeddings};

/// Sentence embedding backend used by the knowledge index and the intent classifier.
pub trait EmbeddingModel: Send + Sync {
    /// Embed one text into an L2-normalized vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed texts, preserving input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embedding vector dimension
    fn dimension(&self) -> usize;
}

/// Scale `vec` to unit length; near-zero vectors are returned unchanged.
pub fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}
