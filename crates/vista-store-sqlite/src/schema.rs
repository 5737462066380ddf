//! SQL schema for the Vista SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- View facts are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS view_facts (
    fact_id     TEXT PRIMARY KEY,
    path        TEXT NOT NULL,
    title       TEXT,
    referrer    TEXT,
    user_agent  TEXT,
    client_ip   TEXT,            -- diagnostics only
    session_id  TEXT NOT NULL,   -- visitor identity for unique counts
    user_id     INTEGER,
    created_at  TEXT NOT NULL    -- RFC 3339 UTC, fixed width; set at capture
);

CREATE INDEX IF NOT EXISTS view_facts_path_created_idx ON view_facts(path, created_at);
CREATE INDEX IF NOT EXISTS view_facts_created_idx      ON view_facts(created_at);

-- One derived rollup row per path; overwritten, never incremented.
CREATE TABLE IF NOT EXISTS path_summaries (
    path                       TEXT PRIMARY KEY,
    total_views                INTEGER NOT NULL DEFAULT 0,
    views_today                INTEGER NOT NULL DEFAULT 0,
    views_this_week            INTEGER NOT NULL DEFAULT 0,
    views_this_month           INTEGER NOT NULL DEFAULT 0,
    unique_visitors_total      INTEGER NOT NULL DEFAULT 0,
    unique_visitors_today      INTEGER NOT NULL DEFAULT 0,
    unique_visitors_this_week  INTEGER NOT NULL DEFAULT 0,
    unique_visitors_this_month INTEGER NOT NULL DEFAULT 0,
    last_viewed_at             TEXT,
    computed_at                TEXT NOT NULL
);

PRAGMA user_version = 1;
";
