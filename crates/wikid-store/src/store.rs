//! SQLite-backed entity store.
//!
//! Holds entities, their texts, articles and alias counts, plus the fuzzy
//! alias projection. The store is written by the ETL step and is read-only
//! to the engine apart from the prior backfill and the lookup table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use wikid_core::error::{WikidError, WikidResult};
use wikid_core::types::{AliasCount, AliasPrior, ArticleRecord, Entity, EntityRecord};

use crate::fuzzy::{register_alias, register_edit_distance};
use crate::schema::{LOOKUP_SCHEMA, SCHEMA};

/// Aliases per transaction during the prior backfill.
pub const DEFAULT_PRIOR_BATCH_SIZE: usize = 50_000;

/// Ids per `IN (...)` clause when loading entities by id.
const ID_CHUNK_SIZE: usize = 500;

/// Which entities to load.
enum EntityFilter<'a> {
    All,
    Ids(&'a [String]),
    Rows { first: i64, last: i64 },
}

impl EntityFilter<'_> {
    fn clause(&self, column: &str) -> (String, Vec<Value>) {
        match self {
            EntityFilter::All => ("1 = 1".to_string(), Vec::new()),
            EntityFilter::Ids(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                (
                    format!("{} IN ({})", column, placeholders),
                    ids.iter().map(|id| Value::Text(id.clone())).collect(),
                )
            }
            EntityFilter::Rows { first, last } => (
                "e.row_position BETWEEN ? AND ?".to_string(),
                vec![Value::Integer(*first), Value::Integer(*last)],
            ),
        }
    }
}

/// Entity store over a single SQLite file.
pub struct EntityStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl EntityStore {
    /// Create a new store. Fails with `AlreadyExists` if a file is present.
    pub fn create(path: impl AsRef<Path>) -> WikidResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(WikidError::already_exists(path));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        store.init_schema()?;
        info!(path = %path.display(), "Created entity store");
        Ok(store)
    }

    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>) -> WikidResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WikidError::store_missing(path));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        if !store.table_exists("entities")? {
            return Err(WikidError::Configuration(format!(
                "'{}' is not an entity store",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Opened entity store");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> WikidResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self::from_connection(conn, None)?;
        store.init_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> WikidResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        register_edit_distance(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn init_schema(&self) -> WikidResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(LOOKUP_SCHEMA)?;
        Ok(())
    }

    /// Path of the store file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> WikidResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WikidError::lock_poisoned("store connection"))
    }

    pub(crate) fn table_exists(&self, name: &str) -> WikidResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // ETL boundary
    // ------------------------------------------------------------------

    /// Insert entities with their texts. Row positions are assigned in
    /// insertion order. Malformed or duplicate records are skipped.
    pub fn insert_entities(&self, records: &[EntityRecord]) -> WikidResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut insert_entity =
                tx.prepare_cached("INSERT OR IGNORE INTO entities (id) VALUES (?1)")?;
            let mut insert_text = tx.prepare_cached(
                "INSERT INTO entities_texts (rowid, entity_id, name, description, label)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for record in records {
                if record.id.trim().is_empty() || record.name.trim().is_empty() {
                    warn!(id = %record.id, "Skipping entity record without id or name");
                    continue;
                }
                if insert_entity.execute(params![record.id])? == 0 {
                    warn!(id = %record.id, "Skipping duplicate entity record");
                    continue;
                }
                let row_position = tx.last_insert_rowid();
                insert_text.execute(params![
                    row_position,
                    record.id,
                    record.name,
                    record.description,
                    record.label,
                ])?;
                inserted += 1;
            }
        }
        tx.commit()?;

        debug!(inserted, skipped = records.len() - inserted, "Inserted entity batch");
        Ok(inserted)
    }

    /// Insert articles. Articles for unknown entities, or for entities that
    /// already have one, are skipped.
    pub fn insert_articles(&self, records: &[ArticleRecord]) -> WikidResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut row_of = tx.prepare_cached("SELECT row_position FROM entities WHERE id = ?1")?;
            let mut insert_article = tx
                .prepare_cached("INSERT OR IGNORE INTO articles (entity_id, id) VALUES (?1, ?2)")?;
            let mut insert_text = tx.prepare_cached(
                "INSERT INTO articles_texts (rowid, entity_id, title, content)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for record in records {
                let row_position: Option<i64> = row_of
                    .query_row(params![record.entity_id], |row| row.get(0))
                    .optional()?;
                let Some(row_position) = row_position else {
                    warn!(entity_id = %record.entity_id, "Skipping article for unknown entity");
                    continue;
                };
                if insert_article.execute(params![record.entity_id, record.id])? == 0 {
                    warn!(entity_id = %record.entity_id, "Skipping second article for entity");
                    continue;
                }
                insert_text.execute(params![
                    row_position,
                    record.entity_id,
                    record.title,
                    record.content,
                ])?;
                inserted += 1;
            }
        }
        tx.commit()?;

        debug!(inserted, skipped = records.len() - inserted, "Inserted article batch");
        Ok(inserted)
    }

    /// Increment the count of an (alias, entity) pair, inserting it if new.
    pub fn upsert_alias_entity(&self, alias: &str, entity_id: &str, count: u64) -> WikidResult<()> {
        if alias.is_empty() {
            return Err(WikidError::Configuration("alias must not be empty".to_string()));
        }
        if self.row_position(entity_id)?.is_none() {
            return Err(WikidError::not_found(entity_id));
        }
        self.upsert_alias_entities(&[AliasCount::new(alias, entity_id, count)])?;
        Ok(())
    }

    /// Batched form of [`upsert_alias_entity`](Self::upsert_alias_entity).
    /// Pairs with an empty alias or an unknown entity are skipped.
    pub fn upsert_alias_entities(&self, pairs: &[AliasCount]) -> WikidResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut exists = tx.prepare_cached("SELECT 1 FROM entities WHERE id = ?1")?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO aliases_for_entities (alias, entity_id, count) VALUES (?1, ?2, ?3)
                 ON CONFLICT (alias, entity_id) DO UPDATE SET count = count + excluded.count",
            )?;
            for pair in pairs {
                if pair.alias.is_empty() {
                    warn!(entity_id = %pair.entity_id, "Skipping empty alias");
                    continue;
                }
                if !exists.exists(params![pair.entity_id])? {
                    warn!(alias = %pair.alias, entity_id = %pair.entity_id, "Skipping alias for unknown entity");
                    continue;
                }
                upsert.execute(params![pair.alias, pair.entity_id, pair.count as i64])?;
                register_alias(&tx, &pair.alias)?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Register every distinct alias in the fuzzy projection. Returns the
    /// number of newly added words.
    pub fn sync_aliases(&self) -> WikidResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut missing = tx.prepare(
                "SELECT DISTINCT alias FROM aliases_for_entities
                 WHERE alias NOT IN (SELECT word FROM aliases)",
            )?;
            let mut rows = missing.query([])?;
            while let Some(row) = rows.next()? {
                let word: String = row.get(0)?;
                if register_alias(&tx, &word)? {
                    added += 1;
                }
            }
        }
        tx.commit()?;
        info!(added, "Synchronized aliases table");
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Priors
    // ------------------------------------------------------------------

    /// Prior probabilities per alias, computed from observed counts. Priors
    /// of one alias sum to 1, or are all 0 when the alias was never seen.
    pub fn load_alias_priors(&self) -> WikidResult<BTreeMap<String, Vec<AliasPrior>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT alias, entity_id, count FROM aliases_for_entities ORDER BY alias, entity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts: BTreeMap<String, Vec<(String, i64)>> = BTreeMap::new();
        for row in rows {
            let (alias, entity_id, count) = row?;
            counts.entry(alias).or_default().push((entity_id, count));
        }

        Ok(counts
            .into_iter()
            .map(|(alias, entity_counts)| (alias, normalize_counts(entity_counts)))
            .collect())
    }

    /// Write normalized priors back into `aliases_for_entities`, committing
    /// every `batch_size` aliases.
    pub fn update_prior_probs(&self, batch_size: usize) -> WikidResult<usize> {
        let priors = self.load_alias_priors()?;
        let total = priors.len();
        let batch_size = batch_size.max(1);
        info!(aliases = total, "Computing prior probabilities for alias-entity pairs");

        let mut conn = self.conn()?;
        let mut updated = 0;
        let entries: Vec<_> = priors.into_iter().collect();
        for batch in entries.chunks(batch_size) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE aliases_for_entities SET prior_prob = ?1
                     WHERE alias = ?2 AND entity_id = ?3",
                )?;
                for (alias, entity_priors) in batch {
                    for prior in entity_priors {
                        updated += stmt.execute(params![prior.prior_prob, alias, prior.entity_id])?;
                    }
                }
            }
            tx.commit()?;
            debug!(aliases = batch.len(), "Persisted prior batch");
        }

        info!(pairs = updated, "Persisted prior probabilities");
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Entity loading
    // ------------------------------------------------------------------

    /// Load entities by id, or all entities in creation order when `ids`
    /// is empty. Unknown ids are ignored.
    pub fn load_entities(&self, ids: &[String]) -> WikidResult<Vec<Entity>> {
        if ids.is_empty() {
            return self.load_filtered(EntityFilter::All);
        }

        let unique: Vec<String> = ids.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let mut entities = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(ID_CHUNK_SIZE) {
            entities.extend(self.load_filtered(EntityFilter::Ids(chunk))?);
        }
        entities.sort_by_key(|e| e.row_position);
        Ok(entities)
    }

    /// Load entities whose row positions lie in `first..=last`.
    pub fn load_entities_in_range(&self, first: i64, last: i64) -> WikidResult<Vec<Entity>> {
        self.load_filtered(EntityFilter::Rows { first, last })
    }

    fn load_filtered(&self, filter: EntityFilter<'_>) -> WikidResult<Vec<Entity>> {
        let conn = self.conn()?;
        let (clause, values) = filter.clause("e.id");

        let sql = format!(
            "SELECT e.id, e.row_position, et.name, et.description, et.label,
                    at.title, at.content,
                    COALESCE((SELECT SUM(afe.count) FROM aliases_for_entities afe
                              WHERE afe.entity_id = e.id), 0)
             FROM entities e
             LEFT JOIN entities_texts et ON et.rowid = e.row_position
             LEFT JOIN articles_texts at ON at.rowid = e.row_position
             WHERE {}
             ORDER BY e.row_position",
            clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok(Entity {
                id: row.get(0)?,
                row_position: row.get(1)?,
                name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                description: row.get(3)?,
                label: row.get(4)?,
                aliases: BTreeSet::new(),
                article_title: row.get(5)?,
                article_text: row.get(6)?,
                count: row.get::<_, i64>(7)?.max(0) as u64,
            })
        })?;
        let mut entities = rows.collect::<Result<Vec<_>, _>>()?;

        let alias_sql = format!(
            "SELECT afe.entity_id, afe.alias
             FROM aliases_for_entities afe
             INNER JOIN entities e ON e.id = afe.entity_id
             WHERE {}",
            clause
        );
        let mut stmt = conn.prepare(&alias_sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut aliases: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let (entity_id, alias) = row?;
            aliases.entry(entity_id).or_default().insert(alias);
        }

        for entity in &mut entities {
            let mut set = aliases.remove(&entity.id).unwrap_or_default();
            set.insert(entity.name.clone());
            set.extend(entity.label.clone());
            set.extend(entity.article_title.clone());
            set.retain(|a| !a.is_empty());
            entity.aliases = set;
        }

        Ok(entities)
    }

    /// Number of entities.
    pub fn entity_count(&self) -> WikidResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT count(*) FROM entities", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Largest assigned row position, 0 for an empty store.
    pub fn max_row_position(&self) -> WikidResult<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(row_position), 0) FROM entities",
            [],
            |row| row.get(0),
        )?)
    }

    /// Row position of an entity.
    pub fn row_position(&self, entity_id: &str) -> WikidResult<Option<i64>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT row_position FROM entities WHERE id = ?1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Entity id at a row position.
    pub fn entity_id_at(&self, row_position: i64) -> WikidResult<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id FROM entities WHERE row_position = ?1",
                params![row_position],
                |row| row.get(0),
            )
            .optional()?)
    }
}

fn normalize_counts(entity_counts: Vec<(String, i64)>) -> Vec<AliasPrior> {
    let total: i64 = entity_counts.iter().map(|(_, c)| (*c).max(0)).sum();
    let denominator = total.max(1) as f64;
    entity_counts
        .into_iter()
        .map(|(entity_id, count)| AliasPrior {
            entity_id,
            prior_prob: count.max(0) as f64 / denominator,
        })
        .collect()
}
