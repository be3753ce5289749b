//! Embedding index construction.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn, Instrument};

use wikid_core::error::{ErrorCode, WikidError, WikidResult};
use wikid_core::traits::Embedder;
use wikid_index::EmbeddingIndex;

use crate::kb::KnowledgeBase;

/// Texts per embedder call.
const EMBED_CHUNK_SIZE: usize = 256;

impl KnowledgeBase {
    /// Embed every entity and build the index at `config.index_path`.
    ///
    /// Entities are read in row batches of `config.build_batch_size`; each
    /// batch is embedded with up to `parallelism` concurrent embedder calls
    /// and stored at `row_position - 1`. Batches already complete in an
    /// unfinished index file are skipped. A previously built index file is
    /// replaced.
    pub async fn build_embeddings_index(
        &mut self,
        embedder: &dyn Embedder,
        parallelism: usize,
    ) -> WikidResult<()> {
        let span = self.span.clone();
        self.build_index_inner(embedder, parallelism.max(1))
            .instrument(span)
            .await
    }

    async fn build_index_inner(&mut self, embedder: &dyn Embedder, parallelism: usize) -> WikidResult<()> {
        let dim = self.config.embedding_dim;
        if embedder.dimension() != dim {
            return Err(WikidError::dimension_mismatch(dim, embedder.dimension()));
        }

        // Queries must not run against a file being rebuilt.
        self.index = None;
        self.hashes = None;

        let path = self.config.index_path.clone();
        let mut index = match EmbeddingIndex::create(&path, dim, self.config.mmap_size) {
            Err(WikidError::AlreadyExists { .. }) => {
                warn!(path = %path.display(), "Replacing built embedding index");
                std::fs::remove_file(&path)?;
                EmbeddingIndex::create(&path, dim, self.config.mmap_size)?
            }
            other => other?,
        };

        let max_row = self.store.max_row_position()?;
        let batch_size = self.config.build_batch_size.max(1) as i64;
        info!(
            entities = self.store.entity_count()?,
            model = embedder.model_name(),
            parallelism,
            "Inferring entity embeddings"
        );

        let mut first = 1;
        while first <= max_row {
            let last = (first + batch_size - 1).min(max_row);
            let entities = self.store.load_entities_in_range(first, last)?;
            let stored = index.count_in_range((first - 1) as u64, (last - 1) as u64)?;
            if !entities.is_empty() && stored == entities.len() {
                debug!(first, last, "Batch already embedded, skipping");
                first = last + 1;
                continue;
            }

            let keys: Vec<u64> = entities.iter().map(|e| e.index_key()).collect();
            let texts: Vec<String> = entities.iter().map(|e| e.embedding_text()).collect();
            let items: Vec<(u64, Vec<f32>)> = stream::iter(keys.chunks(EMBED_CHUNK_SIZE).zip(texts.chunks(EMBED_CHUNK_SIZE)))
                .map(|(keys, texts)| async move {
                    let vectors = embedder.embed_batch(texts).await?;
                    if vectors.len() != keys.len() {
                        return Err(WikidError::Embedding {
                            message: format!(
                                "Embedder returned {} vectors for {} texts",
                                vectors.len(),
                                keys.len()
                            ),
                            code: ErrorCode::EmbInvalidOutput,
                            source: None,
                        });
                    }
                    Ok::<_, WikidError>(keys.iter().copied().zip(vectors).collect::<Vec<_>>())
                })
                .buffer_unordered(parallelism)
                .try_concat()
                .await?;

            let embedded = items.len();
            index = tokio::task::spawn_blocking(move || {
                index.add_items(&items)?;
                Ok::<_, WikidError>(index)
            })
            .await
            .map_err(|e| WikidError::Internal(format!("Index write task failed: {}", e)))??;
            info!(first, last, embedded, "Stored embedding batch");
            first = last + 1;
        }

        tokio::task::spawn_blocking(move || index.build())
            .await
            .map_err(|e| WikidError::Internal(format!("Index build task failed: {}", e)))??;

        let index = EmbeddingIndex::open(&path, self.config.mmap_size)?;
        info!(items = index.n_items()?, "Embedding index ready");
        self.index = Some(index);
        Ok(())
    }
}
