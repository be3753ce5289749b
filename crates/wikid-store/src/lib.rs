//! wikid-store - SQLite entity store for wikid.
//!
//! Entities, articles and alias counts live in one SQLite file together
//! with two FTS5 indexes and a fuzzy-searchable alias projection. The
//! matchers are methods on [`EntityStore`]:
//!
//! - [`EntityStore::fetch_candidates_by_alias`] - edit-distance alias match
//! - [`EntityStore::fetch_candidates_by_fts`] - BM25 full-text match
//! - [`EntityStore::lookup`] - precomputed candidate rows

mod fts;
mod fuzzy;
mod lookup;
mod schema;
mod store;

pub use fuzzy::{alias_grams, edit_distance, AliasSearchParams, EDIT_COST, GRAM_SIZE};
pub use store::{EntityStore, DEFAULT_PRIOR_BATCH_SIZE};
