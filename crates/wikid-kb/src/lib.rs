//! wikid-kb - Candidate generation for entity linking.
//!
//! [`KnowledgeBase`] resolves mention strings to candidate entities by
//! merging fuzzy alias matches and full-text matches from the entity store,
//! attaching each candidate's vector from the embedding index.
//!
//! # Example
//!
//! ```ignore
//! use wikid_kb::KnowledgeBase;
//! use wikid_core::KbConfig;
//!
//! let mut kb = KnowledgeBase::open(KbConfig::from_file("wikid.toml")?)?
//!     .with_span(tracing::info_span!("kb", language = "en"));
//! kb.open_index()?;
//! let candidates = kb.resolve(&[vec!["Boston", "Massachusetts"]])?;
//! ```

mod build;
mod kb;
mod manifest;
mod rerank;
mod source;

pub use kb::KnowledgeBase;
pub use manifest::{FileHashes, Manifest, MANIFEST_FILE, MANIFEST_FORMAT_VERSION};
pub use rerank::{pick_candidate_sequences, CandidateSequence};
