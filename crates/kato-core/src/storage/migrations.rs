//! Database Migrations
//!
//! Schema migration definitions for the SQLite-backed storage tiers.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: pattern bodies, filter indices, counters",
    up: MIGRATION_V1_UP,
}];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
///
/// Three tables, one per tier, each keyed by the tenant namespace. The
/// columnar tier keeps token sets and hash arrays as JSON text; filter
/// evaluation deserializes rows into typed structs.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

-- Document tier: full pattern bodies
CREATE TABLE IF NOT EXISTS pattern_store (
    kb_id TEXT NOT NULL,
    name TEXT NOT NULL,
    pattern_data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (kb_id, name)
);

-- Columnar tier: pre-computed filter indices
CREATE TABLE IF NOT EXISTS pattern_index (
    kb_id TEXT NOT NULL,
    name TEXT NOT NULL,
    pattern_data TEXT NOT NULL,
    length INTEGER NOT NULL,
    token_set TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    minhash_sig TEXT NOT NULL,
    lsh_bands TEXT NOT NULL,
    first_token TEXT,
    last_token TEXT,
    PRIMARY KEY (kb_id, name)
);

CREATE INDEX IF NOT EXISTS idx_pattern_index_length
    ON pattern_index(kb_id, length);

-- Keyed LSH band lookup: one row per (pattern, band hash). Band hashes are
-- u64 stored bit-for-bit as INTEGER.
CREATE TABLE IF NOT EXISTS pattern_bands (
    kb_id TEXT NOT NULL,
    band INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (kb_id, band, name)
);

CREATE INDEX IF NOT EXISTS idx_pattern_bands_lookup
    ON pattern_bands(kb_id, band);

-- Key-value tier: frequencies, emotive windows, metadata, symbol stats,
-- global totals, prediction caches
CREATE TABLE IF NOT EXISTS counters (
    kb_id TEXT NOT NULL,
    key TEXT NOT NULL,
    int_value INTEGER,
    json_value TEXT,
    PRIMARY KEY (kb_id, key)
);

INSERT INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
