//! Integration tests for candidate resolution and the embedding index
//! lifecycle.

mod common;

use common::{config, populate_store, HashingEmbedder, DIM};
use tempfile::TempDir;
use wikid_core::types::{LookupEntry, MatchKind};
use wikid_core::{CandidateSource, ErrorCode, WikidError};
use wikid_kb::{pick_candidate_sequences, KnowledgeBase};

async fn built_kb(dir: &TempDir) -> KnowledgeBase {
    let config = config(dir.path());
    populate_store(&config);
    let mut kb = KnowledgeBase::open(config).unwrap();
    kb.build_embeddings_index(&HashingEmbedder::new(), 2).await.unwrap();
    kb
}

#[tokio::test]
async fn test_city_scenario() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    let nyc = kb.get_candidates("NYC").unwrap();
    assert_eq!(nyc[0].entity_id, "Q60");
    assert_eq!(nyc[0].kind, MatchKind::Alias);
    assert!(nyc[0].prior_prob > 0.0);
    assert_eq!(nyc[0].vector.len(), DIM);

    let beantown = kb.get_candidates("Beantown").unwrap();
    assert_eq!(beantown[0].entity_id, "Q100");

    assert!(kb.get_candidates("Lisbon-like-typo").unwrap().is_empty());
}

#[tokio::test]
async fn test_alias_hits_precede_full_text_hits() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    let candidates = kb.get_candidates("Massachusetts").unwrap();
    assert_eq!(candidates[0].entity_id, "Q771");
    assert_eq!(candidates[0].kind, MatchKind::Alias);
    assert_eq!(candidates[0].entity_freq, 8);

    let full_text: Vec<_> = candidates.iter().filter(|c| c.kind == MatchKind::FullText).collect();
    assert!(full_text.iter().any(|c| c.entity_id == "Q100"));
    assert!(full_text.iter().all(|c| c.is_unranked()));
    let first_fts = candidates.iter().position(|c| c.kind == MatchKind::FullText).unwrap();
    assert!(candidates[first_fts..].iter().all(|c| c.kind == MatchKind::FullText));
}

#[tokio::test]
async fn test_resolve_matches_get_candidates() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    let documents = vec![
        vec!["NYC", "Boston", "Lisbon-like-typo"],
        vec!["Massachusetts", "NYC", "Big Aple"],
        vec![],
    ];
    let resolved = kb.resolve(&documents).unwrap();
    assert_eq!(resolved.len(), 3);
    assert!(resolved[2].is_empty());

    for (doc, candidates) in documents.iter().zip(&resolved) {
        assert_eq!(doc.len(), candidates.len());
        for (mention, mention_candidates) in doc.iter().zip(candidates) {
            assert_eq!(&kb.get_candidates(mention).unwrap(), mention_candidates, "{mention}");
        }
    }
    assert_eq!(resolved[1][2][0].entity_id, "Q60");
}

#[tokio::test]
async fn test_index_over_three_entities() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    for id in ["Q60", "Q100", "Q771"] {
        assert_eq!(kb.get_vector(id).unwrap().len(), DIM);
    }
    let vectors = kb.get_vectors(&["Q771", "Q60"]).unwrap();
    assert_eq!(vectors[0], kb.get_vector("Q771").unwrap());

    let index = wikid_index::EmbeddingIndex::open(&kb.config().index_path, 1 << 20).unwrap();
    assert_eq!(index.n_items().unwrap(), 3);
    assert!(index.is_built());
}

#[tokio::test]
async fn test_unknown_entity_vector() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    let err = kb.get_vector("Q597").unwrap_err();
    assert!(matches!(err, WikidError::NotFound { .. }));
    assert!(kb.get_vectors(&["Q60", "Q597"]).is_err());
}

#[tokio::test]
async fn test_nearest_entities() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    let nearest = kb.nearest_entities_to("Q60", 3).unwrap();
    assert_eq!(nearest.len(), 3);
    assert_eq!(nearest[0].0, "Q60");
    assert!(nearest[0].1.abs() < 1e-5);
    assert!(nearest.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(kb.nearest_entities_to("Q100", usize::MAX).unwrap().len(), 3);

    let err = kb.nearest_entities(&[1.0, 0.0], 1).unwrap_err();
    assert!(matches!(err, WikidError::Configuration(_)));
}

#[test]
fn test_index_unavailable_until_loaded() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    populate_store(&config);
    let mut kb = KnowledgeBase::open(config).unwrap();
    assert!(!kb.has_index());

    let err = kb.get_candidates("NYC").unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdxUnavailable);
    assert!(matches!(kb.get_vector("Q60"), Err(WikidError::IndexUnavailable { .. })));

    // Mentions without hits need no vectors.
    assert!(kb.get_candidates("Lisbon-like-typo").unwrap().is_empty());

    let err = kb.open_index().unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdxUnavailable);
}

#[tokio::test]
async fn test_open_index_after_build() {
    let dir = TempDir::new().unwrap();
    let config = built_kb(&dir).await.config().clone();

    let mut kb = KnowledgeBase::open(config).unwrap();
    kb.open_index().unwrap();
    assert_eq!(kb.get_candidates("NYC").unwrap()[0].entity_id, "Q60");
}

#[tokio::test]
async fn test_embedder_dimension_mismatch() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    populate_store(&config);
    let mut kb = KnowledgeBase::open(config).unwrap();

    let err = kb
        .build_embeddings_index(&HashingEmbedder { dim: DIM / 2 }, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, WikidError::Configuration(_)));
    assert!(!kb.has_index());
}

#[tokio::test]
async fn test_rebuild_replaces_index() {
    let dir = TempDir::new().unwrap();
    let mut kb = built_kb(&dir).await;
    let before = kb.get_vector("Q100").unwrap();

    kb.build_embeddings_index(&HashingEmbedder::new(), 1).await.unwrap();
    assert!(kb.has_index());
    assert_eq!(kb.get_vector("Q100").unwrap(), before);
}

#[tokio::test]
async fn test_precomputed_lookup_is_served() {
    let dir = TempDir::new().unwrap();
    let mut kb = built_kb(&dir).await;
    let expected = kb.get_candidates("NYC").unwrap();

    let stored = kb.precompute_candidates(&["NYC", "Lisbon-like-typo", "NYC"]).unwrap();
    assert_eq!(stored, 1);
    assert!(kb.store().lookup("NYC").unwrap().is_some());
    assert!(kb.store().lookup("Lisbon-like-typo").unwrap().is_none());
    assert_eq!(kb.get_candidates("NYC").unwrap(), expected);

    // Rows in the table are served verbatim, bypassing the matchers.
    kb.store()
        .store_lookup(
            "NYC",
            &[LookupEntry {
                entity_id: "Q100".to_string(),
                row_position: 2,
                prior_prob: 0.5,
                entity_freq: 1,
                kind: MatchKind::Alias,
            }],
        )
        .unwrap();
    let served = kb.get_candidates("NYC").unwrap();
    assert_eq!(served.len(), 1);
    assert_eq!(served[0].entity_id, "Q100");
    assert_eq!(kb.resolve(&[vec!["NYC"]]).unwrap()[0][0], served);

    assert_eq!(kb.clear_candidate_lookup().unwrap(), 1);
    assert_eq!(kb.get_candidates("NYC").unwrap(), expected);
}

#[tokio::test]
async fn test_candidate_source_adapter() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;
    let source: &dyn CandidateSource = &kb;

    assert_eq!(source.entity_vector_length(), DIM);
    let documents = vec![vec!["Beantown".to_string()]];
    let resolved = source.resolve_documents(&documents).unwrap();
    assert_eq!(resolved[0][0], source.candidates_for("Beantown").unwrap());
    assert_eq!(source.vector_for("Q100").unwrap(), resolved[0][0][0].vector);
}

#[tokio::test]
async fn test_sequences_over_resolved_candidates() {
    let dir = TempDir::new().unwrap();
    let kb = built_kb(&dir).await;

    let resolved = kb.resolve(&[vec!["Boston", "Lisbon-like-typo", "NYC"]]).unwrap();
    let sequences = pick_candidate_sequences(&resolved[0], 3);
    assert!(!sequences.is_empty());
    assert!(sequences.len() <= 3);
    assert_eq!(sequences[0].picks.len(), 3);
    assert_eq!(sequences[0].picks[1], None);
    assert!(sequences.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_operations_run_inside_passed_span() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    populate_store(&config);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut kb = KnowledgeBase::open(config)
        .unwrap()
        .with_span(tracing::info_span!("kb", language = "en"));
    kb.build_embeddings_index(&HashingEmbedder::new(), 2).await.unwrap();
    assert_eq!(kb.get_candidates("Beantown").unwrap()[0].entity_id, "Q100");
}
