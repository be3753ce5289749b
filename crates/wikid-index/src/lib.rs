//! wikid-index - Embedding index for wikid.
//!
//! A memory-mapped SQLite file storing one vector per entity (keyed by
//! `row_position - 1`) in a `sqlite-vec` `vec0` table with the cosine
//! metric. Nearest neighbour queries are `vec0` KNN scans, which stream the
//! table chunk by chunk instead of loading it.

mod index;
mod vector;

pub use index::{EmbeddingIndex, MAX_NEIGHBOURS, METRIC};
pub use vector::{cosine_distance, cosine_similarity};
