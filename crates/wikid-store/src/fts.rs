//! Full-text matching over entity names, descriptions and labels (FTS5).

use std::collections::HashMap;

use rusqlite::params;
use tracing::debug;

use wikid_core::error::WikidResult;
use wikid_core::types::FtsMatch;

use crate::store::EntityStore;

const FTS_MATCH_SQL: &str = r#"
SELECT
    hits.entity_id,
    hits.row_position,
    hits.score,
    COALESCE(SUM(ae.count), 0) AS sum_occurrence_count
FROM (
    SELECT
        entities_texts.entity_id AS entity_id,
        entities_texts.rowid AS row_position,
        bm25(entities_texts) AS score
    FROM entities_texts
    WHERE entities_texts MATCH ?1
    ORDER BY score
    LIMIT ?2
) hits
LEFT JOIN aliases_for_entities ae ON ae.entity_id = hits.entity_id
GROUP BY hits.entity_id, hits.row_position, hits.score
ORDER BY hits.score, hits.row_position
"#;

/// Quote a mention as a single FTS5 phrase, so operators and column filters
/// in user text are matched literally. `None` when nothing would tokenize.
fn phrase_query(mention: &str) -> Option<String> {
    if !mention.chars().any(char::is_alphanumeric) {
        return None;
    }
    Some(format!("\"{}\"", mention.replace('"', "\"\"")))
}

impl EntityStore {
    /// Entities whose texts best match `mention`, best (lowest BM25) first.
    pub fn fetch_candidates_by_fts(
        &self,
        mention: &str,
        top_k: usize,
    ) -> WikidResult<Vec<FtsMatch>> {
        let Some(query) = phrase_query(mention) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(FTS_MATCH_SQL)?;
        let rows = stmt.query_map(params![query, top_k as i64], |row| {
            Ok(FtsMatch {
                entity_id: row.get(0)?,
                row_position: row.get(1)?,
                score: row.get(2)?,
                sum_occurrence_count: row.get::<_, i64>(3)?.max(0) as u64,
            })
        })?;
        let matches = rows.collect::<Result<Vec<_>, _>>()?;

        debug!(mention, hits = matches.len(), "Full-text matches");
        Ok(matches)
    }

    /// [`fetch_candidates_by_fts`](Self::fetch_candidates_by_fts) keyed by
    /// mention text. Mentions without hits are absent.
    pub fn fetch_candidates_by_fts_all(
        &self,
        mentions: &[&str],
        top_k: usize,
    ) -> WikidResult<HashMap<String, Vec<FtsMatch>>> {
        let mut grouped = HashMap::new();
        for mention in mentions {
            if grouped.contains_key(*mention) {
                continue;
            }
            let matches = self.fetch_candidates_by_fts(mention, top_k)?;
            if !matches.is_empty() {
                grouped.insert(mention.to_string(), matches);
            }
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikid_core::types::{AliasCount, EntityRecord};

    fn store() -> EntityStore {
        let store = EntityStore::in_memory().unwrap();
        store
            .insert_entities(&[
                EntityRecord::new("Q60", "New York City")
                    .with_description("most populous city in the United States"),
                EntityRecord::new("Q100", "Boston")
                    .with_description("capital city of Massachusetts, United States"),
                EntityRecord::new("Q771", "Massachusetts").with_description("state of the United States"),
            ])
            .unwrap();
        store
            .upsert_alias_entities(&[
                AliasCount::new("Boston", "Q100", 10),
                AliasCount::new("Beantown", "Q100", 1),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_phrase_query_escapes_quotes() {
        assert_eq!(phrase_query("Boston").as_deref(), Some("\"Boston\""));
        assert_eq!(phrase_query("6\" gun").as_deref(), Some("\"6\"\" gun\""));
        assert_eq!(phrase_query(" -- "), None);
    }

    #[test]
    fn test_scores_ascending() {
        let matches = store().fetch_candidates_by_fts("United States", 5).unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].score <= w[1].score));
        // bm25() reports better matches as more negative values
        assert!(matches.iter().all(|m| m.score < 0.0));
    }

    #[test]
    fn test_occurrence_count_attached() {
        let matches = store().fetch_candidates_by_fts("Massachusetts", 5).unwrap();
        let boston = matches.iter().find(|m| m.entity_id == "Q100").unwrap();
        assert_eq!(boston.sum_occurrence_count, 11);
        assert_eq!(boston.row_position, 2);

        let state = matches.iter().find(|m| m.entity_id == "Q771").unwrap();
        assert_eq!(state.sum_occurrence_count, 0);
    }

    #[test]
    fn test_top_k_limits_hits() {
        let matches = store().fetch_candidates_by_fts("United States", 2).unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        let store = store();
        assert!(store.fetch_candidates_by_fts("Lisbon-like-typo", 5).unwrap().is_empty());
        assert!(store.fetch_candidates_by_fts("NOT OR AND", 5).unwrap().is_empty());
        assert!(store.fetch_candidates_by_fts("", 5).unwrap().is_empty());
    }

    #[test]
    fn test_grouped_by_mention() {
        let grouped = store()
            .fetch_candidates_by_fts_all(&["Boston", "Lisbon"], 5)
            .unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped["Boston"][0].entity_id, "Q100");
    }
}
