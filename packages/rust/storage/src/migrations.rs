//! SQL migration definitions for the aidigest database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: raw_content, insight, source_config",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Fetched items and their processing state
CREATE TABLE IF NOT EXISTS raw_content (
    id               TEXT PRIMARY KEY,
    source_type      TEXT NOT NULL,
    source_name      TEXT NOT NULL,
    title            TEXT NOT NULL DEFAULT '',
    body             TEXT NOT NULL CHECK (length(trim(body)) > 0),
    url              TEXT,
    dedup_key        TEXT NOT NULL UNIQUE,
    published_at     TEXT,
    fetched_at       TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    is_processed     INTEGER NOT NULL DEFAULT 0,
    processing_error TEXT,
    attempts         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_raw_content_processed ON raw_content(is_processed);
CREATE INDEX IF NOT EXISTS idx_raw_content_created ON raw_content(created_at);

-- One insight per successfully classified row
CREATE TABLE IF NOT EXISTS insight (
    id               TEXT PRIMARY KEY,
    raw_content_id   TEXT NOT NULL UNIQUE REFERENCES raw_content(id) ON DELETE CASCADE,
    summary          TEXT NOT NULL,
    analysis         TEXT NOT NULL,
    category         TEXT NOT NULL,
    importance_score REAL NOT NULL CHECK (importance_score >= 0.0 AND importance_score <= 1.0),
    error            TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insight_created ON insight(created_at);

-- Source registry
CREATE TABLE IF NOT EXISTS source_config (
    source_name TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_url  TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    priority    INTEGER NOT NULL DEFAULT 1,
    updated_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
