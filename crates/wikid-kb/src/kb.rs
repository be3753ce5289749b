//! The knowledge base engine: store, optional embedding index, and the
//! candidate aggregation over both.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, Span};

use wikid_core::config::KbConfig;
use wikid_core::error::{WikidError, WikidResult};
use wikid_core::types::{Candidate, LookupEntry};
use wikid_index::EmbeddingIndex;
use wikid_store::{AliasSearchParams, EntityStore};

use crate::manifest::FileHashes;

/// Entity-linking knowledge base.
///
/// Opening never loads the embedding index implicitly: call
/// [`open_index`](Self::open_index) or
/// [`build_embeddings_index`](Self::build_embeddings_index) before serving
/// candidates.
pub struct KnowledgeBase {
    pub(crate) config: KbConfig,
    pub(crate) store: EntityStore,
    pub(crate) index: Option<EmbeddingIndex>,
    pub(crate) hashes: Option<FileHashes>,
    pub(crate) span: Span,
}

impl KnowledgeBase {
    /// Open the entity store named by `config`.
    pub fn open(config: KbConfig) -> WikidResult<Self> {
        config.validate()?;
        let store = EntityStore::open(&config.db_path)?;
        Ok(Self {
            config,
            store,
            index: None,
            hashes: None,
            span: Span::none(),
        })
    }

    /// Route this engine's telemetry through `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Load the built embedding index at `config.index_path`.
    pub fn open_index(&mut self) -> WikidResult<()> {
        let _enter = self.span.enter();
        let index = EmbeddingIndex::open(&self.config.index_path, self.config.mmap_size)?;
        if index.dimension() != self.config.embedding_dim {
            return Err(WikidError::dimension_mismatch(
                self.config.embedding_dim,
                index.dimension(),
            ));
        }
        info!(
            path = %self.config.index_path.display(),
            items = index.n_items()?,
            "Loaded embedding index"
        );
        self.index = Some(index);
        Ok(())
    }

    pub fn config(&self) -> &KbConfig {
        &self.config
    }

    /// The underlying entity store.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Hashes recorded by the last serialization or restoration.
    pub fn hashes(&self) -> Option<&FileHashes> {
        self.hashes.as_ref()
    }

    /// Length of entity vectors.
    pub fn entity_vector_length(&self) -> usize {
        self.config.embedding_dim
    }

    pub(crate) fn index(&self) -> WikidResult<&EmbeddingIndex> {
        self.index.as_ref().ok_or_else(|| {
            WikidError::index_unavailable(format!(
                "No embedding index loaded for '{}'",
                self.config.index_path.display()
            ))
        })
    }

    // ------------------------------------------------------------------
    // Candidate resolution
    // ------------------------------------------------------------------

    /// Candidates per mention per document, in input order. A mention with
    /// no match gets an empty list.
    pub fn resolve<D, S>(&self, documents: &[D]) -> WikidResult<Vec<Vec<Vec<Candidate>>>>
    where
        D: AsRef<[S]>,
        S: AsRef<str>,
    {
        let _enter = self.span.enter();
        documents
            .iter()
            .map(|doc| {
                let mentions: Vec<&str> = doc.as_ref().iter().map(AsRef::as_ref).collect();
                self.resolve_mentions(&mentions)
            })
            .collect()
    }

    /// Candidates for a single mention.
    pub fn get_candidates(&self, mention: &str) -> WikidResult<Vec<Candidate>> {
        let _enter = self.span.enter();
        Ok(self
            .resolve_mentions(&[mention])?
            .pop()
            .unwrap_or_default())
    }

    /// Lookup rows where precomputed, matcher rows otherwise, with vectors.
    fn resolve_mentions(&self, mentions: &[&str]) -> WikidResult<Vec<Vec<Candidate>>> {
        let mut rows: HashMap<String, Vec<LookupEntry>> = HashMap::new();
        for mention in mentions {
            if rows.contains_key(*mention) {
                continue;
            }
            if let Some(entries) = self.store.lookup(mention)? {
                rows.insert(mention.to_string(), entries);
            }
        }
        let served = rows.len();

        let pending: Vec<&str> = mentions
            .iter()
            .copied()
            .filter(|m| !rows.contains_key(*m))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        rows.extend(self.match_mentions(&pending)?);
        debug!(mentions = mentions.len(), from_lookup = served, "Resolved mentions");

        let mut vectors: HashMap<i64, Vec<f32>> = HashMap::new();
        mentions
            .iter()
            .map(|mention| {
                let Some(entries) = rows.get(*mention) else {
                    return Ok(Vec::new());
                };
                entries
                    .iter()
                    .map(|entry| {
                        let vector = match vectors.get(&entry.row_position) {
                            Some(v) => v.clone(),
                            None => {
                                let v = self.vector_at(entry.row_position)?;
                                vectors.insert(entry.row_position, v.clone());
                                v
                            }
                        };
                        Ok(Candidate::from_lookup(entry, vector))
                    })
                    .collect::<WikidResult<Vec<_>>>()
            })
            .collect()
    }

    /// Alias hits then full-text hits for each mention, without vectors.
    /// Mentions without any hit are absent.
    pub(crate) fn match_mentions(
        &self,
        mentions: &[&str],
    ) -> WikidResult<HashMap<String, Vec<LookupEntry>>> {
        if mentions.is_empty() {
            return Ok(HashMap::new());
        }
        let alias = self
            .store
            .fetch_candidates_by_alias_all(mentions, AliasSearchParams::from(&self.config))?;
        let fts = self
            .store
            .fetch_candidates_by_fts_all(mentions, self.config.top_k_entities_fts)?;

        let mut rows = HashMap::new();
        for mention in mentions {
            let entries: Vec<LookupEntry> = alias
                .get(*mention)
                .into_iter()
                .flatten()
                .map(LookupEntry::from)
                .chain(fts.get(*mention).into_iter().flatten().map(LookupEntry::from))
                .collect();
            if !entries.is_empty() {
                rows.insert(mention.to_string(), entries);
            }
        }
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Vectors
    // ------------------------------------------------------------------

    fn vector_at(&self, row_position: i64) -> WikidResult<Vec<f32>> {
        let key = (row_position - 1).max(0) as u64;
        self.index()?.get_item_vector(key)?.ok_or_else(|| {
            WikidError::Configuration(format!(
                "Embedding index has no vector for row {}; rebuild the index for this store",
                row_position
            ))
        })
    }

    /// Vector of one entity.
    pub fn get_vector(&self, entity_id: &str) -> WikidResult<Vec<f32>> {
        let _enter = self.span.enter();
        let row_position = self
            .store
            .row_position(entity_id)?
            .ok_or_else(|| WikidError::not_found(entity_id))?;
        self.vector_at(row_position)
    }

    /// Vectors of several entities, in input order.
    pub fn get_vectors<S: AsRef<str>>(&self, entity_ids: &[S]) -> WikidResult<Vec<Vec<f32>>> {
        entity_ids
            .iter()
            .map(|id| self.get_vector(id.as_ref()))
            .collect()
    }

    /// The `k` entities nearest to `vector` with their cosine distances,
    /// nearest first. `k` is capped at [`wikid_index::MAX_NEIGHBOURS`].
    pub fn nearest_entities(&self, vector: &[f32], k: usize) -> WikidResult<Vec<(String, f32)>> {
        let _enter = self.span.enter();
        if vector.len() != self.config.embedding_dim {
            return Err(WikidError::dimension_mismatch(self.config.embedding_dim, vector.len()));
        }
        let neighbours = self.index()?.get_nns_by_vector(vector, k)?;

        let mut entities = Vec::with_capacity(neighbours.len());
        for (key, distance) in neighbours {
            if let Some(id) = self.store.entity_id_at(key as i64 + 1)? {
                entities.push((id, distance));
            }
        }
        Ok(entities)
    }

    /// The `k` entities nearest to `entity_id`, the entity itself included.
    pub fn nearest_entities_to(&self, entity_id: &str, k: usize) -> WikidResult<Vec<(String, f32)>> {
        let vector = self.get_vector(entity_id)?;
        self.nearest_entities(&vector, k)
    }

    // ------------------------------------------------------------------
    // Precomputed lookup
    // ------------------------------------------------------------------

    /// Run full matching for each mention and store the rows for the lookup
    /// fast path. Returns the number of mentions stored with candidates.
    /// The store file changes, so serialize again afterwards.
    pub fn precompute_candidates<S: AsRef<str>>(&mut self, mentions: &[S]) -> WikidResult<usize> {
        let _enter = self.span.enter();
        let mut distinct: Vec<&str> = mentions.iter().map(AsRef::as_ref).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let rows = self.match_mentions(&distinct)?;
        for (mention, entries) in &rows {
            self.store.store_lookup(mention, entries)?;
        }
        self.hashes = None;
        info!(mentions = distinct.len(), stored = rows.len(), "Precomputed candidates");
        Ok(rows.len())
    }

    /// Remove all precomputed rows.
    pub fn clear_candidate_lookup(&mut self) -> WikidResult<usize> {
        let _enter = self.span.enter();
        let removed = self.store.clear_lookup()?;
        if removed > 0 {
            self.hashes = None;
        }
        Ok(removed)
    }
}
