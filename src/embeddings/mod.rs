// Embeddings module
// Text-to-vector capability used by ingestion and retrieval

pub mod ollama;

use std::sync::Arc;

pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient};

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector, otherwise a persisted index stops matching its queries.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in order
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Identifier recorded with persisted collections
    fn model_name(&self) -> &str;
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    #[inline]
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        (**self).embed(text)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    #[inline]
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
