//! Serialized engine state and file integrity checks.
//!
//! Only configuration and content hashes are serialized. The store and
//! index files stay where the configuration points, and restoring refuses
//! to proceed if either differs from what was hashed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use wikid_core::config::KbConfig;
use wikid_core::error::{WikidError, WikidResult};
use wikid_core::hash::{hash_file, hash_file_if_exists};

use crate::kb::KnowledgeBase;

/// Current manifest layout.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// File name used by [`KnowledgeBase::persist_to`].
pub const MANIFEST_FILE: &str = "manifest.json";

/// MD5 hex digests of the referenced files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    pub db: String,
    /// `None` when no index file existed at serialization time.
    pub index: Option<String>,
}

impl FileHashes {
    /// Hash the files named by `config`.
    pub fn compute(config: &KbConfig) -> WikidResult<Self> {
        Ok(Self {
            db: hash_file(&config.db_path)?,
            index: hash_file_if_exists(&config.index_path)?,
        })
    }

    /// Fail with an integrity error if the files named by `config` no
    /// longer match these hashes.
    pub fn verify(&self, config: &KbConfig) -> WikidResult<()> {
        let db = hash_file_if_exists(&config.db_path)?;
        if db.as_deref() != Some(self.db.as_str()) {
            error!(file = %config.db_path.display(), "Entity store does not match serialized hash");
            return Err(WikidError::integrity(
                config.db_path.display().to_string(),
                Some(self.db.clone()),
                db,
            ));
        }

        let index = hash_file_if_exists(&config.index_path)?;
        if index != self.index {
            error!(file = %config.index_path.display(), "Embedding index does not match serialized hash");
            return Err(WikidError::integrity(
                config.index_path.display().to_string(),
                self.index.clone(),
                index,
            ));
        }
        Ok(())
    }
}

/// Serialized form of a [`KnowledgeBase`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub config: KbConfig,
    pub hashes: FileHashes,
}

impl KnowledgeBase {
    /// Hash the store and index files and encode them with the
    /// configuration.
    pub fn serialize(&mut self) -> WikidResult<Vec<u8>> {
        let _enter = self.span.enter();
        let hashes = FileHashes::compute(&self.config)?;
        let manifest = Manifest {
            format_version: MANIFEST_FORMAT_VERSION,
            config: self.config.clone(),
            hashes: hashes.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        self.hashes = Some(hashes);
        Ok(bytes)
    }

    /// Restore an engine from [`serialize`](Self::serialize) output.
    ///
    /// The embedding index is loaded if the manifest recorded one.
    pub fn deserialize(bytes: &[u8]) -> WikidResult<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(WikidError::Configuration(format!(
                "Unsupported manifest version {} (expected {})",
                manifest.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        manifest.hashes.verify(&manifest.config)?;

        let has_index = manifest.hashes.index.is_some();
        let mut kb = Self::open(manifest.config)?;
        if has_index {
            kb.open_index()?;
        }
        kb.hashes = Some(manifest.hashes);
        info!(language = %kb.config.language, has_index, "Restored knowledge base");
        Ok(kb)
    }

    /// Write the manifest into directory `dir`. Returns the manifest path.
    pub fn persist_to(&mut self, dir: impl AsRef<Path>) -> WikidResult<PathBuf> {
        let dir = dir.as_ref();
        if dir.exists() && !dir.is_dir() {
            return Err(WikidError::Configuration(format!(
                "'{}' is not a directory",
                dir.display()
            )));
        }
        std::fs::create_dir_all(dir)?;

        let path = dir.join(MANIFEST_FILE);
        let bytes = self.serialize()?;
        std::fs::write(&path, bytes)?;
        info!(path = %path.display(), "Persisted knowledge base");
        Ok(path)
    }

    /// Restore an engine persisted with [`persist_to`](Self::persist_to).
    pub fn restore_from(dir: impl AsRef<Path>) -> WikidResult<Self> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        if !path.exists() {
            return Err(WikidError::Configuration(format!(
                "No knowledge base manifest at '{}'",
                path.display()
            )));
        }
        Self::deserialize(&std::fs::read(&path)?)
    }
}
