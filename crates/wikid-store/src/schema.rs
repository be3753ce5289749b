//! Store DDL.
//!
//! `entities.row_position` is the rowid and is never reused
//! (AUTOINCREMENT). The FTS5 tables share that rowid so joins stay on
//! integer keys.

/// Tables required by every store.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    row_position INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE
);

CREATE VIRTUAL TABLE IF NOT EXISTS entities_texts USING fts5(
    entity_id UNINDEXED,
    name,
    description,
    label
);

CREATE TABLE IF NOT EXISTS articles (
    entity_id TEXT PRIMARY KEY NOT NULL REFERENCES entities(id),
    id TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS articles_texts USING fts5(
    entity_id UNINDEXED,
    title,
    content
);

CREATE TABLE IF NOT EXISTS aliases_for_entities (
    alias TEXT NOT NULL,
    entity_id TEXT NOT NULL REFERENCES entities(id),
    count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
    prior_prob REAL NOT NULL DEFAULT 0.0,
    PRIMARY KEY (alias, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_aliases_for_entities_entity
    ON aliases_for_entities(entity_id);

-- Fuzzy-searchable projection: every distinct alias exactly once.
CREATE TABLE IF NOT EXISTS aliases (
    word TEXT PRIMARY KEY NOT NULL,
    length INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_aliases_length ON aliases(length);

-- Lower-cased character bigrams of each projected alias.
CREATE TABLE IF NOT EXISTS alias_grams (
    gram TEXT NOT NULL,
    word TEXT NOT NULL,
    PRIMARY KEY (gram, word)
) WITHOUT ROWID;
"#;

/// Precomputed mention -> candidate rows for the lookup fast path.
pub(crate) const LOOKUP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS candidate_lookup (
    mention TEXT NOT NULL,
    rank INTEGER NOT NULL,
    entity_id TEXT NOT NULL REFERENCES entities(id),
    prior_prob REAL NOT NULL,
    entity_freq INTEGER NOT NULL,
    kind TEXT NOT NULL,
    PRIMARY KEY (mention, rank)
);
"#;
