//! Embedder trait supplied by the host NLP pipeline.

use async_trait::async_trait;

use crate::error::WikidResult;

/// Text-to-vector function of fixed output dimensionality.
///
/// The engine only ever calls it while building the embedding index, on
/// [`Entity::embedding_text`](crate::types::Entity::embedding_text).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector for one entity text.
    async fn embed(&self, text: &str) -> WikidResult<Vec<f32>>;

    /// Vectors for a chunk of entity texts, in input order. Override when
    /// the model batches natively; the fallback embeds one text at a time.
    async fn embed_batch(&self, texts: &[String]) -> WikidResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Output length; must equal `KbConfig::embedding_dim`.
    fn dimension(&self) -> usize;

    /// Name reported in build logs.
    fn model_name(&self) -> &str;
}
