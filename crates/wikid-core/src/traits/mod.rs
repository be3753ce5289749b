//! Seams between the engine and its collaborators.

mod candidate_source;
mod embedder;

pub use candidate_source::*;
pub use embedder::*;
