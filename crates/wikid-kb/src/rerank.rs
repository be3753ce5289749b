//! Beam search over candidate assignments for the mentions of a document.
//!
//! A sequence picks at most one candidate per mention. It is scored by the
//! mean pairwise cosine similarity of the picked entity vectors, so
//! assignments whose entities are close to each other rank first.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use wikid_core::types::Candidate;
use wikid_index::cosine_similarity;

/// One candidate assignment across the mentions of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSequence {
    /// Index into each mention's candidate list; `None` for mentions
    /// without candidates.
    pub picks: Vec<Option<usize>>,
    /// Mean pairwise cosine similarity of the picked vectors. 1.0 with
    /// fewer than two picks.
    pub score: f32,
}

#[derive(Clone)]
struct Beam<'a> {
    picks: Vec<Option<usize>>,
    chosen: Vec<&'a [f32]>,
    pair_sum: f32,
}

impl Beam<'_> {
    fn score(&self) -> f32 {
        let n = self.chosen.len();
        if n < 2 {
            return 1.0;
        }
        let pairs = (n * (n - 1) / 2) as f32;
        self.pair_sum / pairs
    }
}

/// Up to `beam_width` best candidate sequences for one document's
/// mentions, best first. Equal scores keep the order in which sequences
/// were expanded (earlier candidates first).
pub fn pick_candidate_sequences(
    candidates: &[Vec<Candidate>],
    beam_width: usize,
) -> Vec<CandidateSequence> {
    let beam_width = beam_width.max(1);
    let mut beams = vec![Beam {
        picks: Vec::with_capacity(candidates.len()),
        chosen: Vec::new(),
        pair_sum: 0.0,
    }];

    for mention_candidates in candidates {
        if mention_candidates.is_empty() {
            for beam in &mut beams {
                beam.picks.push(None);
            }
            continue;
        }

        let mut expanded = Vec::with_capacity(beams.len() * mention_candidates.len());
        for beam in &beams {
            for (i, candidate) in mention_candidates.iter().enumerate() {
                let vector = candidate.vector.as_slice();
                let mut next = beam.clone();
                next.pair_sum += beam
                    .chosen
                    .iter()
                    .map(|other| cosine_similarity(vector, other))
                    .sum::<f32>();
                next.picks.push(Some(i));
                next.chosen.push(vector);
                expanded.push(next);
            }
        }

        // Stable sort keeps insertion order among equal scores.
        expanded.sort_by_key(|beam| Reverse(OrderedFloat(beam.score())));
        expanded.truncate(beam_width);
        beams = expanded;
    }

    beams
        .into_iter()
        .map(|beam| CandidateSequence {
            score: beam.score(),
            picks: beam.picks,
        })
        .collect()
}
