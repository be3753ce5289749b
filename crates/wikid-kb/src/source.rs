//! [`CandidateSource`] adapter for host pipelines.

use wikid_core::error::WikidResult;
use wikid_core::traits::CandidateSource;
use wikid_core::types::Candidate;

use crate::kb::KnowledgeBase;

impl CandidateSource for KnowledgeBase {
    fn resolve_documents(&self, documents: &[Vec<String>]) -> WikidResult<Vec<Vec<Vec<Candidate>>>> {
        self.resolve(documents)
    }

    fn candidates_for(&self, mention: &str) -> WikidResult<Vec<Candidate>> {
        self.get_candidates(mention)
    }

    fn vector_for(&self, entity_id: &str) -> WikidResult<Vec<f32>> {
        self.get_vector(entity_id)
    }

    fn entity_vector_length(&self) -> usize {
        KnowledgeBase::entity_vector_length(self)
    }
}
