//! Fuzzy alias matching.
//!
//! Three stages inside one query:
//! 1. `alias_grams` count filter - an alias within `d` edits of the mention
//!    shares at least `|grams(mention)| - d * GRAM_SIZE` distinct bigrams
//!    with it, so aliases below that count are dropped without scoring.
//!    Skipped when the bound is not positive (short mentions).
//! 2. `aliases.length` band - an alias more than `threshold / EDIT_COST`
//!    characters longer or shorter than the mention cannot qualify
//! 3. `editdist` (Levenshtein over lower-cased text, `strsim`) ranks the rest
//!
//! Exact alias hits always rank ahead of approximate ones and are never cut
//! by `top_k_aliases`.

use std::collections::{BTreeSet, HashMap};

use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::debug;

use wikid_core::config::KbConfig;
use wikid_core::error::WikidResult;
use wikid_core::types::AliasMatch;

use crate::store::EntityStore;

/// Distance contributed by one insertion, deletion or substitution.
pub const EDIT_COST: u32 = 100;

/// Distance between two alias strings.
pub fn edit_distance(a: &str, b: &str) -> u32 {
    let edits = strsim::levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (edits as u32).saturating_mul(EDIT_COST)
}

/// Characters per alias gram.
pub const GRAM_SIZE: usize = 2;

/// Distinct lower-cased character grams of `word`. Empty for words shorter
/// than [`GRAM_SIZE`].
pub fn alias_grams(word: &str) -> BTreeSet<String> {
    let chars: Vec<char> = word.to_lowercase().chars().collect();
    chars.windows(GRAM_SIZE).map(|w| w.iter().collect()).collect()
}

/// Add `word` to the fuzzy projection together with its grams. Returns
/// whether the word was new.
pub(crate) fn register_alias(conn: &Connection, word: &str) -> rusqlite::Result<bool> {
    let added = conn
        .prepare_cached("INSERT OR IGNORE INTO aliases (word, length) VALUES (?1, length(?1))")?
        .execute(params![word])?
        > 0;
    if added {
        let mut insert =
            conn.prepare_cached("INSERT OR IGNORE INTO alias_grams (gram, word) VALUES (?1, ?2)")?;
        for gram in alias_grams(word) {
            insert.execute(params![gram, word])?;
        }
    }
    Ok(added)
}

/// Register `editdist(a, b)` on a connection.
pub(crate) fn register_edit_distance(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "editdist",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: String = ctx.get(0)?;
            let b: String = ctx.get(1)?;
            Ok(i64::from(edit_distance(&a, &b)))
        },
    )
}

/// Limits applied by the alias matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasSearchParams {
    /// Approximate aliases considered per mention.
    pub top_k_aliases: usize,
    /// Largest admitted distance.
    pub threshold_alias: u32,
    /// Entities kept per mention.
    pub top_k_entities: usize,
}

impl Default for AliasSearchParams {
    fn default() -> Self {
        Self::from(&KbConfig::default())
    }
}

impl From<&KbConfig> for AliasSearchParams {
    fn from(config: &KbConfig) -> Self {
        Self {
            top_k_aliases: config.top_k_aliases,
            threshold_alias: config.threshold_alias,
            top_k_entities: config.top_k_entities_alias,
        }
    }
}

/// Words of the length band, unpruned.
const BAND_SOURCE: &str = "SELECT word FROM aliases WHERE length BETWEEN ?2 AND ?3";

/// Words of the length band sharing at least `?7` grams with the mention;
/// the grams are bound from `?8` on.
fn gram_source(n_grams: usize) -> String {
    let placeholders = (0..n_grams)
        .map(|i| format!("?{}", i + 8))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT a.word FROM (
            SELECT word FROM alias_grams
            WHERE gram IN ({})
            GROUP BY word
            HAVING COUNT(*) >= ?7
        ) g
        INNER JOIN aliases a ON a.word = g.word
        WHERE a.length BETWEEN ?2 AND ?3",
        placeholders
    )
}

fn alias_match_sql(source: &str) -> String {
    format!(
        r#"
WITH scored AS (
    SELECT alias, MIN(distance) AS distance, MIN(approximate) AS approximate
    FROM (
        SELECT alias, 0 AS distance, 0 AS approximate
        FROM aliases_for_entities
        WHERE alias = ?1
        UNION ALL
        SELECT word AS alias, distance, 1 AS approximate
        FROM (
            SELECT word, editdist(word, ?1) AS distance
            FROM ({})
        )
        WHERE distance <= ?4
    )
    GROUP BY alias
),
matches AS (
    SELECT alias, distance
    FROM (
        SELECT alias, distance, approximate,
               ROW_NUMBER() OVER (ORDER BY approximate, distance, alias) AS rank
        FROM scored
    )
    WHERE approximate = 0 OR rank <= ?5
)
SELECT
    ae.entity_id,
    e.row_position,
    MIN(m.distance) AS min_distance,
    MAX(ae.prior_prob) AS max_prior_prob,
    SUM(ae.count) AS sum_occurrence_count
FROM matches m
INNER JOIN aliases_for_entities ae ON ae.alias = m.alias
INNER JOIN entities e ON e.id = ae.entity_id
GROUP BY ae.entity_id, e.row_position
ORDER BY min_distance, sum_occurrence_count DESC, e.row_position
LIMIT ?6
"#,
        source
    )
}

fn alias_match_row(row: &Row<'_>) -> rusqlite::Result<AliasMatch> {
    Ok(AliasMatch {
        entity_id: row.get(0)?,
        row_position: row.get(1)?,
        min_distance: row.get::<_, i64>(2)?.max(0) as u32,
        max_prior_prob: row.get(3)?,
        sum_occurrence_count: row.get::<_, i64>(4)?.max(0) as u64,
    })
}

impl EntityStore {
    /// Entities reachable through the aliases closest to `mention`, ordered
    /// by (distance, summed count descending). Empty when nothing is close.
    pub fn fetch_candidates_by_alias(
        &self,
        mention: &str,
        limits: AliasSearchParams,
    ) -> WikidResult<Vec<AliasMatch>> {
        if mention.is_empty() || limits.top_k_entities == 0 {
            return Ok(Vec::new());
        }

        let length = mention.chars().count() as i64;
        let max_edits = i64::from(limits.threshold_alias / EDIT_COST);
        let grams = alias_grams(mention);
        let min_shared = grams.len() as i64 - max_edits * GRAM_SIZE as i64;

        let mut values = vec![
            Value::Text(mention.to_string()),
            Value::Integer((length - max_edits).max(1)),
            Value::Integer(length + max_edits),
            Value::Integer(i64::from(limits.threshold_alias)),
            Value::Integer(limits.top_k_aliases as i64),
            Value::Integer(limits.top_k_entities as i64),
        ];
        let sql = if min_shared > 0 {
            values.push(Value::Integer(min_shared));
            values.extend(grams.iter().cloned().map(Value::Text));
            alias_match_sql(&gram_source(grams.len()))
        } else {
            alias_match_sql(BAND_SOURCE)
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let matches = stmt
            .query_map(params_from_iter(values.iter()), alias_match_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(mention, hits = matches.len(), pruned = min_shared > 0, "Alias matches");
        Ok(matches)
    }

    /// [`fetch_candidates_by_alias`](Self::fetch_candidates_by_alias) for
    /// several mentions, keyed by mention text. Mentions without hits are
    /// absent from the map.
    pub fn fetch_candidates_by_alias_all(
        &self,
        mentions: &[&str],
        limits: AliasSearchParams,
    ) -> WikidResult<HashMap<String, Vec<AliasMatch>>> {
        let mut grouped = HashMap::new();
        for mention in mentions {
            if grouped.contains_key(*mention) {
                continue;
            }
            let matches = self.fetch_candidates_by_alias(mention, limits)?;
            if !matches.is_empty() {
                grouped.insert(mention.to_string(), matches);
            }
        }
        Ok(grouped)
    }
}
