//! Configuration system for wikid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{WikidError, WikidResult};

/// Default number of alias matches considered per mention.
pub const DEFAULT_TOP_K_ALIASES: usize = 5;
/// Default number of entities kept from alias matches per mention.
pub const DEFAULT_TOP_K_ENTITIES_ALIAS: usize = 20;
/// Default number of entities kept from full-text matches per mention.
pub const DEFAULT_TOP_K_ENTITIES_FTS: usize = 5;
/// Default maximum alias distance (100 per edit).
pub const DEFAULT_THRESHOLD_ALIAS: u32 = 100;
/// Default number of entity rows embedded per index build batch.
pub const DEFAULT_BUILD_BATCH_SIZE: usize = 100_000;

/// Knowledge base configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KbConfig {
    /// Language tag of the underlying wiki dumps (e.g. "en").
    pub language: String,
    /// Path to the SQLite entity store.
    pub db_path: PathBuf,
    /// Path to the embedding index file.
    pub index_path: PathBuf,
    /// Length of entity vectors.
    pub embedding_dim: usize,
    /// Alias matches to consider per mention. An alias may map to several
    /// entities, so this does not bound the number of candidates.
    pub top_k_aliases: usize,
    /// Maximum number of candidates found via alias matching.
    pub top_k_entities_alias: usize,
    /// Maximum number of candidates found via full-text search.
    pub top_k_entities_fts: usize,
    /// Maximum alias distance admitted by the fuzzy matcher.
    pub threshold_alias: u32,
    /// Entity rows per embedding batch during index build.
    pub build_batch_size: usize,
    /// Bytes of the index file to memory-map.
    pub mmap_size: u64,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            db_path: PathBuf::from("output/en/wiki.sqlite3"),
            index_path: PathBuf::from("output/en/embeddings.index"),
            embedding_dim: 300,
            top_k_aliases: DEFAULT_TOP_K_ALIASES,
            top_k_entities_alias: DEFAULT_TOP_K_ENTITIES_ALIAS,
            top_k_entities_fts: DEFAULT_TOP_K_ENTITIES_FTS,
            threshold_alias: DEFAULT_THRESHOLD_ALIAS,
            build_batch_size: DEFAULT_BUILD_BATCH_SIZE,
            mmap_size: 256 * 1024 * 1024,
        }
    }
}

impl KbConfig {
    /// Create a configuration for the given store and index paths.
    pub fn new(
        language: impl Into<String>,
        db_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        embedding_dim: usize,
    ) -> Self {
        Self {
            language: language.into(),
            db_path: db_path.into(),
            index_path: index_path.into(),
            embedding_dim,
            ..Default::default()
        }
    }

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> WikidResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| WikidError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| WikidError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| WikidError::Configuration(e.to_string()))?,
            _ => {
                return Err(WikidError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `WIKID_*` environment variables over defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `WIKID_*` environment variables onto this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("WIKID_LANGUAGE") {
            self.language = language;
        }
        if let Ok(path) = std::env::var("WIKID_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("WIKID_INDEX_PATH") {
            self.index_path = PathBuf::from(path);
        }
        env_number("WIKID_EMBEDDING_DIM", &mut self.embedding_dim);
        env_number("WIKID_TOP_K_ALIASES", &mut self.top_k_aliases);
        env_number("WIKID_TOP_K_ENTITIES_ALIAS", &mut self.top_k_entities_alias);
        env_number("WIKID_TOP_K_ENTITIES_FTS", &mut self.top_k_entities_fts);
        env_number("WIKID_THRESHOLD_ALIAS", &mut self.threshold_alias);
        self
    }

    /// Check values that would make the engine unusable.
    pub fn validate(&self) -> WikidResult<()> {
        if self.embedding_dim == 0 {
            return Err(WikidError::Configuration(
                "embedding_dim must be greater than zero".to_string(),
            ));
        }
        if self.build_batch_size == 0 {
            return Err(WikidError::Configuration(
                "build_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> KbConfigBuilder {
        KbConfigBuilder::default()
    }
}

fn env_number<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable config override"),
        }
    }
}

/// Builder for KbConfig.
#[derive(Default)]
pub struct KbConfigBuilder {
    config: KbConfig,
}

impl KbConfigBuilder {
    /// Set the language tag.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    /// Set the store path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set the embedding index path.
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    /// Set the entity vector length.
    pub fn embedding_dim(mut self, dim: usize) -> Self {
        self.config.embedding_dim = dim;
        self
    }

    /// Set the number of alias matches considered per mention.
    pub fn top_k_aliases(mut self, k: usize) -> Self {
        self.config.top_k_aliases = k;
        self
    }

    /// Set the number of alias-matched entities kept per mention.
    pub fn top_k_entities_alias(mut self, k: usize) -> Self {
        self.config.top_k_entities_alias = k;
        self
    }

    /// Set the number of full-text-matched entities kept per mention.
    pub fn top_k_entities_fts(mut self, k: usize) -> Self {
        self.config.top_k_entities_fts = k;
        self
    }

    /// Set the maximum alias distance.
    pub fn threshold_alias(mut self, threshold: u32) -> Self {
        self.config.threshold_alias = threshold;
        self
    }

    /// Set the index build batch size.
    pub fn build_batch_size(mut self, size: usize) -> Self {
        self.config.build_batch_size = size;
        self
    }

    /// Set the bytes of the index file to memory-map.
    pub fn mmap_size(mut self, bytes: u64) -> Self {
        self.config.mmap_size = bytes;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> WikidResult<KbConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
