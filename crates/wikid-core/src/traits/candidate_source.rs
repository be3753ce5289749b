//! Narrow capability interface a host entity linker adapts to.

use crate::error::WikidResult;
use crate::types::Candidate;

/// Anything that turns mention text into candidate entities with vectors.
pub trait CandidateSource: Send + Sync {
    /// Candidates per mention per document, in input order. Mentions
    /// without any match get an empty list.
    fn resolve_documents(&self, documents: &[Vec<String>]) -> WikidResult<Vec<Vec<Vec<Candidate>>>>;

    /// Candidates for a single mention.
    fn candidates_for(&self, mention: &str) -> WikidResult<Vec<Candidate>>;

    /// Vector for an entity id.
    fn vector_for(&self, entity_id: &str) -> WikidResult<Vec<f32>>;

    /// Length of entity vectors.
    fn entity_vector_length(&self) -> usize;
}
