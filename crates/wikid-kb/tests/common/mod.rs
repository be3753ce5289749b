//! Shared fixtures for knowledge base integration tests.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use async_trait::async_trait;
use wikid_core::traits::Embedder;
use wikid_core::types::{AliasCount, ArticleRecord, EntityRecord};
use wikid_core::{KbConfig, WikidResult};
use wikid_store::EntityStore;

pub const DIM: usize = 8;

/// Bag-of-words embedder: each lower-cased token adds +-1 to a hashed
/// bucket. Deterministic, so similar texts get similar vectors.
pub struct HashingEmbedder {
    pub dim: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self { dim: DIM }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
            vector[(h >> 1) as usize % self.dim] += sign;
        }
        if vector.iter().all(|x| *x == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> WikidResult<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "hashing-bow"
    }
}

/// Configuration for a store and index inside `dir`.
pub fn config(dir: &Path) -> KbConfig {
    KbConfig::builder()
        .language("en")
        .db_path(dir.join("wiki.sqlite3"))
        .index_path(dir.join("embeddings.index"))
        .embedding_dim(DIM)
        .build_batch_size(2)
        .build()
        .unwrap()
}

/// Create and populate the store named by `config`: New York City, Boston
/// and Massachusetts with their aliases and priors.
pub fn populate_store(config: &KbConfig) {
    let store = EntityStore::create(&config.db_path).unwrap();
    store
        .insert_entities(&[
            EntityRecord::new("Q60", "New York City")
                .with_description("most populous city in the United States")
                .with_label("New York"),
            EntityRecord::new("Q100", "Boston")
                .with_description("capital city of Massachusetts, United States"),
            EntityRecord::new("Q771", "Massachusetts"),
        ])
        .unwrap();
    store
        .insert_articles(&[ArticleRecord {
            entity_id: "Q771".to_string(),
            id: "1645518".to_string(),
            title: "Massachusetts".to_string(),
            content: "Massachusetts is a state in the New England region.".to_string(),
        }])
        .unwrap();
    store
        .upsert_alias_entities(&[
            AliasCount::new("New York City", "Q60", 50),
            AliasCount::new("NYC", "Q60", 20),
            AliasCount::new("Big Apple", "Q60", 5),
            AliasCount::new("Boston", "Q100", 10),
            AliasCount::new("Beantown", "Q100", 1),
            AliasCount::new("Massachusetts", "Q771", 8),
            AliasCount::new("Mass.", "Q771", 2),
        ])
        .unwrap();
    store.sync_aliases().unwrap();
    store.update_prior_probs(wikid_store::DEFAULT_PRIOR_BATCH_SIZE).unwrap();
}
