//! Precomputed mention -> candidate table.

use rusqlite::params;
use tracing::{debug, info};

use wikid_core::error::{WikidError, WikidResult};
use wikid_core::types::{LookupEntry, MatchKind};

use crate::schema::LOOKUP_SCHEMA;
use crate::store::EntityStore;

impl EntityStore {
    /// Replace the stored candidate rows for `mention`.
    pub fn store_lookup(&self, mention: &str, entries: &[LookupEntry]) -> WikidResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(LOOKUP_SCHEMA)?;
        tx.execute(
            "DELETE FROM candidate_lookup WHERE mention = ?1",
            params![mention],
        )?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO candidate_lookup (mention, rank, entity_id, prior_prob, entity_freq, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (rank, entry) in entries.iter().enumerate() {
                insert.execute(params![
                    mention,
                    rank as i64,
                    entry.entity_id,
                    entry.prior_prob,
                    entry.entity_freq as i64,
                    entry.kind.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(mention, rows = entries.len(), "Stored lookup rows");
        Ok(())
    }

    /// Precomputed rows for `mention`, or `None` when no row is stored for
    /// it. Mentions precomputed without candidates leave no rows and fall
    /// back to full resolution.
    pub fn lookup(&self, mention: &str) -> WikidResult<Option<Vec<LookupEntry>>> {
        if !self.table_exists("candidate_lookup")? {
            return Ok(None);
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT l.entity_id, e.row_position, l.prior_prob, l.entity_freq, l.kind
             FROM candidate_lookup l
             INNER JOIN entities e ON e.id = l.entity_id
             WHERE l.mention = ?1
             ORDER BY l.rank",
        )?;
        let rows = stmt.query_map(params![mention], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (entity_id, row_position, prior_prob, entity_freq, kind) = row?;
            let kind = MatchKind::parse(&kind).ok_or_else(|| {
                WikidError::database(format!("Unknown candidate kind '{}' in lookup table", kind))
            })?;
            entries.push(LookupEntry {
                entity_id,
                row_position,
                prior_prob,
                entity_freq: entity_freq.max(0) as u64,
                kind,
            });
        }

        Ok(if entries.is_empty() { None } else { Some(entries) })
    }

    /// Delete every precomputed row. Returns the number removed.
    pub fn clear_lookup(&self) -> WikidResult<usize> {
        if !self.table_exists("candidate_lookup")? {
            return Ok(0);
        }
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM candidate_lookup", [])?;
        info!(removed, "Cleared candidate lookup table");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikid_core::types::{EntityRecord, UNRANKED_PRIOR_PROB};

    fn store() -> EntityStore {
        let store = EntityStore::in_memory().unwrap();
        store
            .insert_entities(&[
                EntityRecord::new("Q60", "New York City"),
                EntityRecord::new("Q100", "Boston"),
            ])
            .unwrap();
        store
    }

    fn entry(entity_id: &str, row_position: i64, kind: MatchKind) -> LookupEntry {
        LookupEntry {
            entity_id: entity_id.to_string(),
            row_position,
            prior_prob: if kind == MatchKind::Alias { 1.0 } else { UNRANKED_PRIOR_PROB },
            entity_freq: 3,
            kind,
        }
    }

    #[test]
    fn test_lookup_round_trip_keeps_rank_order() {
        let store = store();
        let rows = vec![entry("Q100", 2, MatchKind::Alias), entry("Q60", 1, MatchKind::FullText)];
        store.store_lookup("Beantown", &rows).unwrap();

        assert_eq!(store.lookup("Beantown").unwrap(), Some(rows));
        assert_eq!(store.lookup("beantown").unwrap(), None);
    }

    #[test]
    fn test_store_lookup_replaces_rows() {
        let store = store();
        store
            .store_lookup("NYC", &[entry("Q60", 1, MatchKind::Alias), entry("Q100", 2, MatchKind::FullText)])
            .unwrap();
        store.store_lookup("NYC", &[entry("Q60", 1, MatchKind::Alias)]).unwrap();
        assert_eq!(store.lookup("NYC").unwrap().map(|rows| rows.len()), Some(1));
    }

    #[test]
    fn test_clear_lookup() {
        let store = store();
        store.store_lookup("NYC", &[entry("Q60", 1, MatchKind::Alias)]).unwrap();
        assert_eq!(store.clear_lookup().unwrap(), 1);
        assert_eq!(store.lookup("NYC").unwrap(), None);
    }

    #[test]
    fn test_lookup_without_table() {
        let store = store();
        store.conn().unwrap().execute_batch("DROP TABLE candidate_lookup").unwrap();
        assert_eq!(store.lookup("NYC").unwrap(), None);
        assert_eq!(store.clear_lookup().unwrap(), 0);
    }
}
