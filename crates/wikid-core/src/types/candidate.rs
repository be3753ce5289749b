//! Match rows produced by the matchers and the candidates built from them.

use serde::{Deserialize, Serialize};

/// Prior probability reported for candidates that did not come from an
/// alias match. Distinct from 0, which is a valid prior.
pub const UNRANKED_PRIOR_PROB: f64 = -1.0;

/// Which matcher produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Fuzzy alias match.
    Alias,
    /// Full-text match on entity descriptions.
    FullText,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Alias => "alias",
            MatchKind::FullText => "full_text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "alias" => Some(MatchKind::Alias),
            "full_text" => Some(MatchKind::FullText),
            _ => None,
        }
    }
}

/// One entity reached through the aliases closest to a mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMatch {
    pub entity_id: String,
    pub row_position: i64,
    /// Smallest distance among the matching aliases.
    pub min_distance: u32,
    /// Largest prior probability among the matching aliases.
    pub max_prior_prob: f64,
    /// Summed occurrence count over the matching aliases.
    pub sum_occurrence_count: u64,
}

/// One entity whose description text matches a mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtsMatch {
    pub entity_id: String,
    pub row_position: i64,
    /// BM25 score as reported by FTS5 (lower is better).
    pub score: f64,
    /// Summed occurrence count of all aliases pointing to the entity.
    pub sum_occurrence_count: u64,
}

/// Candidate without its vector: what the matchers produce and what the
/// lookup table stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub entity_id: String,
    pub row_position: i64,
    pub prior_prob: f64,
    pub entity_freq: u64,
    pub kind: MatchKind,
}

/// A proposed entity for a mention, carrying signals for disambiguation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_id: String,
    pub row_position: i64,
    /// Prior probability, or [`UNRANKED_PRIOR_PROB`] for full-text hits.
    pub prior_prob: f64,
    /// Aggregate occurrence count.
    pub entity_freq: u64,
    pub vector: Vec<f32>,
    pub kind: MatchKind,
}

impl From<&AliasMatch> for LookupEntry {
    fn from(m: &AliasMatch) -> Self {
        Self {
            entity_id: m.entity_id.clone(),
            row_position: m.row_position,
            prior_prob: m.max_prior_prob,
            entity_freq: m.sum_occurrence_count,
            kind: MatchKind::Alias,
        }
    }
}

impl From<&FtsMatch> for LookupEntry {
    fn from(m: &FtsMatch) -> Self {
        Self {
            entity_id: m.entity_id.clone(),
            row_position: m.row_position,
            prior_prob: UNRANKED_PRIOR_PROB,
            entity_freq: m.sum_occurrence_count,
            kind: MatchKind::FullText,
        }
    }
}

impl Candidate {
    /// Candidate from a match row and the entity's vector.
    pub fn from_lookup(entry: &LookupEntry, vector: Vec<f32>) -> Self {
        Self {
            entity_id: entry.entity_id.clone(),
            row_position: entry.row_position,
            prior_prob: entry.prior_prob,
            entity_freq: entry.entity_freq,
            vector,
            kind: entry.kind,
        }
    }

    /// Whether the prior is the unranked sentinel.
    pub fn is_unranked(&self) -> bool {
        self.prior_prob == UNRANKED_PRIOR_PROB
    }
}
