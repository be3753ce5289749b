//! wikid-core - Core library for wikid.
//!
//! This crate provides the error taxonomy, configuration, typed records and
//! collaborator traits shared by the wikid entity store, embedding index and
//! candidate generation engine.

pub mod config;
pub mod error;
pub mod hash;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{KbConfig, KbConfigBuilder};
pub use error::{ErrorCode, WikidError, WikidResult};
pub use hash::{hash_file, hash_file_if_exists};
pub use traits::{CandidateSource, Embedder};
pub use types::{
    AliasCount, AliasMatch, AliasPrior, ArticleRecord, Candidate, Entity, EntityRecord, FtsMatch,
    LookupEntry, MatchKind, UNRANKED_PRIOR_PROB,
};
