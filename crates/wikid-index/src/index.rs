//! Embedding index file.
//!
//! One SQLite file holds the item vectors in a `sqlite-vec` `vec0` table
//! (cosine metric, rowid = key), a plain key table for range bookkeeping
//! and a small metadata table. The file is append-only while building and
//! read-only once built; queries page it in through SQLite's memory map.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use wikid_core::error::{ErrorCode, WikidError, WikidResult};

use crate::vector::{from_blob, to_blob};

/// Metric of every index file. Fixed at creation.
pub const METRIC: &str = "cosine";

/// Largest `k` a `vec0` KNN query accepts.
pub const MAX_NEIGHBOURS: usize = 4096;

const META_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS item_keys (
    key INTEGER PRIMARY KEY
);
"#;

fn items_schema(dimension: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS items USING vec0(
            vector float[{}] distance_metric={}
        )",
        dimension, METRIC
    )
}

static REGISTER_SQLITE_VEC: Once = Once::new();

fn register_sqlite_vec() {
    REGISTER_SQLITE_VEC.call_once(|| {
        // SAFETY: sqlite3_auto_extension requires a function pointer cast.
        // This is the documented way to register sqlite-vec with rusqlite.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

/// Nearest neighbour index over fixed-length vectors, addressed by
/// zero-based integer keys.
pub struct EmbeddingIndex {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    dimension: usize,
    built: bool,
}

impl EmbeddingIndex {
    /// Open an index for building. An unfinished index at `path` is
    /// resumed; a built one is refused.
    pub fn create(path: impl AsRef<Path>, dimension: usize, mmap_size: u64) -> WikidResult<Self> {
        let path = path.as_ref();
        if dimension == 0 {
            return Err(WikidError::Configuration(
                "Index dimension must be positive".to_string(),
            ));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        register_sqlite_vec();
        let resuming = path.exists();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "mmap_size", mmap_size as i64)?;
        let index = Self::init(conn, Some(path.to_path_buf()), dimension)?;
        if index.built {
            return Err(WikidError::already_exists(path));
        }

        if resuming {
            info!(path = %path.display(), items = index.n_items()?, "Resuming embedding index build");
        } else {
            info!(path = %path.display(), dimension, "Created embedding index");
        }
        Ok(index)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory(dimension: usize) -> WikidResult<Self> {
        register_sqlite_vec();
        Self::init(Connection::open_in_memory()?, None, dimension)
    }

    fn init(conn: Connection, path: Option<PathBuf>, dimension: usize) -> WikidResult<Self> {
        conn.execute_batch(META_SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES
                ('dimension', ?1), ('metric', ?2), ('built', '0')",
            params![dimension.to_string(), METRIC],
        )?;

        let mut index = Self {
            conn: Mutex::new(conn),
            path,
            dimension,
            built: false,
        };
        index.load_meta()?;
        if index.dimension != dimension {
            return Err(WikidError::dimension_mismatch(index.dimension, dimension));
        }
        index.conn()?.execute_batch(&items_schema(dimension))?;
        Ok(index)
    }

    /// Open a built index read-only.
    pub fn open(path: impl AsRef<Path>, mmap_size: u64) -> WikidResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WikidError::index_unavailable(format!(
                "No embedding index at '{}'",
                path.display()
            )));
        }

        register_sqlite_vec();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "mmap_size", mmap_size as i64)?;

        let mut index = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            dimension: 0,
            built: false,
        };
        index.load_meta()?;
        if !index.built {
            return Err(WikidError::IndexUnavailable {
                message: format!("Embedding index at '{}' was never built", path.display()),
                code: ErrorCode::IdxNotBuilt,
            });
        }

        debug!(path = %path.display(), dimension = index.dimension, "Opened embedding index");
        Ok(index)
    }

    fn load_meta(&mut self) -> WikidResult<()> {
        let conn = self.conn()?;
        let read = |key: &str| -> WikidResult<String> {
            conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| WikidError::database(format!("Index metadata '{}' is missing", key)))
        };

        let metric = read("metric")?;
        if metric != METRIC {
            return Err(WikidError::Configuration(format!(
                "Unsupported index metric '{}'",
                metric
            )));
        }
        let dimension = read("dimension")?
            .parse()
            .map_err(|_| WikidError::database("Index metadata 'dimension' is corrupt"))?;
        let built = read("built")? == "1";
        drop(conn);

        self.dimension = dimension;
        self.built = built;
        Ok(())
    }

    fn conn(&self) -> WikidResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WikidError::lock_poisoned("index connection"))
    }

    fn check_dimension(&self, vector: &[f32]) -> WikidResult<()> {
        if vector.len() != self.dimension {
            return Err(WikidError::dimension_mismatch(self.dimension, vector.len()));
        }
        Ok(())
    }

    fn check_writable(&self) -> WikidResult<()> {
        if self.built {
            return Err(WikidError::Configuration(
                "Embedding index is built and read-only".to_string(),
            ));
        }
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Number of stored vectors.
    pub fn n_items(&self) -> WikidResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT count(*) FROM item_keys", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of stored keys in `first..=last`.
    pub fn count_in_range(&self, first: u64, last: u64) -> WikidResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM item_keys WHERE key BETWEEN ?1 AND ?2",
            params![first as i64, last as i64],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Store a vector under `key`, replacing any previous one.
    pub fn add_item(&self, key: u64, vector: &[f32]) -> WikidResult<()> {
        self.add_items(&[(key, vector.to_vec())])
    }

    /// Store several vectors in one transaction.
    pub fn add_items(&self, items: &[(u64, Vec<f32>)]) -> WikidResult<()> {
        self.check_writable()?;
        for (_, vector) in items {
            self.check_dimension(vector)?;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            // vec0 has no upsert
            let mut delete = tx.prepare_cached("DELETE FROM items WHERE rowid = ?1")?;
            let mut insert = tx.prepare_cached("INSERT INTO items (rowid, vector) VALUES (?1, ?2)")?;
            let mut track = tx.prepare_cached("INSERT OR IGNORE INTO item_keys (key) VALUES (?1)")?;
            for (key, vector) in items {
                let key = *key as i64;
                delete.execute(params![key])?;
                insert.execute(params![key, to_blob(vector)])?;
                track.execute(params![key])?;
            }
        }
        tx.commit()?;
        debug!(items = items.len(), "Stored index items");
        Ok(())
    }

    /// Freeze the index: no further writes, queries allowed.
    pub fn build(&mut self) -> WikidResult<()> {
        self.check_writable()?;
        let items = self.n_items()?;
        self.conn()?
            .execute("UPDATE meta SET value = '1' WHERE key = 'built'", [])?;
        self.built = true;
        info!(items, "Embedding index built");
        Ok(())
    }

    /// Vector stored under `key`.
    pub fn get_item_vector(&self, key: u64) -> WikidResult<Option<Vec<f32>>> {
        let conn = self.conn()?;
        let blob: Option<Vec<u8>> = conn
            .prepare_cached("SELECT vector FROM items WHERE rowid = ?1")?
            .query_row(params![key as i64], |row| row.get(0))
            .optional()?;
        Ok(blob.map(|b| from_blob(&b)))
    }

    /// The `n` keys nearest to `vector` with their cosine distances, nearest
    /// first. At most [`MAX_NEIGHBOURS`] are returned.
    pub fn get_nns_by_vector(&self, vector: &[f32], n: usize) -> WikidResult<Vec<(u64, f32)>> {
        if !self.built {
            return Err(WikidError::IndexUnavailable {
                message: "Embedding index is not built".to_string(),
                code: ErrorCode::IdxNotBuilt,
            });
        }
        self.check_dimension(vector)?;

        let k = n.min(MAX_NEIGHBOURS).min(self.n_items()?);
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT rowid, distance FROM items
             WHERE vector MATCH ?1 AND k = ?2
             ORDER BY distance",
        )?;
        let rows = stmt.query_map(params![to_blob(vector), k as i64], |row| {
            let distance: Option<f64> = row.get(1)?;
            // NaN (zero vector) comes back as NULL
            Ok((row.get::<_, i64>(0)? as u64, distance.unwrap_or(1.0) as f32))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The `n` keys nearest to the vector stored under `key`.
    pub fn get_nns_by_item(&self, key: u64, n: usize) -> WikidResult<Vec<(u64, f32)>> {
        match self.get_item_vector(key)? {
            Some(vector) => self.get_nns_by_vector(&vector, n),
            None => Ok(Vec::new()),
        }
    }
}
