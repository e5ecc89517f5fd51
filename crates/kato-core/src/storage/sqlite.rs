//! SQLite-backed tier implementations
//!
//! One database file backs all three tiers. Separate reader/writer
//! connections give interior mutability: all methods take `&self`, so the
//! tiers are `Send + Sync` and shared as plain `Arc`s. Blocking SQLite work
//! runs on the runtime's blocking pool to keep async tasks unblocked.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{KatoError, Result};
use crate::observation::Event;

use super::{CounterStore, IndexRow, KbId, PatternIndex, PatternStore};

/// SQLite storage for all three tiers
pub struct SqliteTiers {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl SqliteTiers {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the database at `path` and apply migrations
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| KatoError::StorageUnavailable {
                    tier: "sqlite",
                    detail: format!("cannot create data dir: {e}"),
                })?;
            }
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer_conn)),
            reader: Arc::new(Mutex::new(reader_conn)),
        })
    }

    async fn with_conn<T, F>(conn: Arc<Mutex<Connection>>, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| KatoError::Internal("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| KatoError::Internal(format!("blocking task failed: {e}")))?
    }

    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        Self::with_conn(self.writer.clone(), f).await
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        Self::with_conn(self.reader.clone(), f).await
    }

    /// Escape `%`, `_`, and `\` for a LIKE prefix match
    fn like_prefix(prefix: &str) -> String {
        let mut escaped = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if c == '%' || c == '_' || c == '\\' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }
}

fn row_to_index(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRow> {
    let pattern_data: String = row.get("pattern_data")?;
    let token_set: String = row.get("token_set")?;
    let minhash_sig: String = row.get("minhash_sig")?;
    let lsh_bands: String = row.get("lsh_bands")?;
    Ok(IndexRow {
        name: row.get("name")?,
        pattern_data: serde_json::from_str(&pattern_data).unwrap_or_default(),
        length: row.get::<_, i64>("length")? as usize,
        token_set: serde_json::from_str(&token_set).unwrap_or_default(),
        token_count: row.get::<_, i64>("token_count")? as usize,
        minhash_sig: serde_json::from_str(&minhash_sig).unwrap_or_default(),
        lsh_bands: serde_json::from_str(&lsh_bands).unwrap_or_default(),
        first_token: row.get("first_token")?,
        last_token: row.get("last_token")?,
    })
}

#[async_trait]
impl PatternStore for SqliteTiers {
    async fn put_if_absent(&self, kb: &KbId, name: &str, events: &[Event]) -> Result<bool> {
        let kb = kb.as_str().to_string();
        let name = name.to_string();
        let body = serde_json::to_string(events)?;
        self.write(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pattern_store (kb_id, name, pattern_data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![kb, name, body, Utc::now().to_rfc3339()],
            )?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<Vec<Event>>> {
        let kb = kb.as_str().to_string();
        let name = name.to_string();
        self.read(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT pattern_data FROM pattern_store WHERE kb_id = ?1 AND name = ?2",
                    params![kb, name],
                    |row| row.get(0),
                )
                .optional()?;
            match body {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn exists(&self, kb: &KbId, name: &str) -> Result<bool> {
        let kb = kb.as_str().to_string();
        let name = name.to_string();
        self.read(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pattern_store WHERE kb_id = ?1 AND name = ?2",
                params![kb, name],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn scan_names(&self, kb: &KbId) -> Result<Vec<String>> {
        let kb = kb.as_str().to_string();
        self.read(move |conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM pattern_store WHERE kb_id = ?1 ORDER BY name")?;
            let names = stmt
                .query_map(params![kb], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
        .await
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let kb = kb.as_str().to_string();
        self.write(move |conn| {
            let removed = conn.execute(
                "DELETE FROM pattern_store WHERE kb_id = ?1",
                params![kb],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}

#[async_trait]
impl PatternIndex for SqliteTiers {
    async fn put_if_absent(&self, kb: &KbId, row: &IndexRow) -> Result<bool> {
        let kb = kb.as_str().to_string();
        let name = row.name.clone();
        let pattern_data = serde_json::to_string(&row.pattern_data)?;
        let token_set = serde_json::to_string(&row.token_set)?;
        let minhash_sig = serde_json::to_string(&row.minhash_sig)?;
        let lsh_bands = serde_json::to_string(&row.lsh_bands)?;
        let length = row.length as i64;
        let token_count = row.token_count as i64;
        let first_token = row.first_token.clone();
        let last_token = row.last_token.clone();
        let band_values: Vec<i64> = row.lsh_bands.iter().map(|b| *b as i64).collect();
        self.write(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pattern_index
                 (kb_id, name, pattern_data, length, token_set, token_count,
                  minhash_sig, lsh_bands, first_token, last_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    kb,
                    name,
                    pattern_data,
                    length,
                    token_set,
                    token_count,
                    minhash_sig,
                    lsh_bands,
                    first_token,
                    last_token
                ],
            )?;
            if inserted > 0 {
                let mut stmt = conn.prepare(
                    "INSERT OR IGNORE INTO pattern_bands (kb_id, band, name)
                     VALUES (?1, ?2, ?3)",
                )?;
                for band in &band_values {
                    stmt.execute(params![kb, band, name])?;
                }
            }
            Ok(inserted > 0)
        })
        .await
    }

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<IndexRow>> {
        let kb = kb.as_str().to_string();
        let name = name.to_string();
        self.read(move |conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM pattern_index WHERE kb_id = ?1 AND name = ?2",
                    params![kb, name],
                    row_to_index,
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn all_rows(&self, kb: &KbId) -> Result<Vec<IndexRow>> {
        let kb = kb.as_str().to_string();
        self.read(move |conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM pattern_index WHERE kb_id = ?1 ORDER BY name")?;
            let rows = stmt
                .query_map(params![kb], row_to_index)?
                .collect::<rusqlite::Result<Vec<IndexRow>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn rows_for_bands(&self, kb: &KbId, bands: &[u64]) -> Result<Vec<IndexRow>> {
        if bands.is_empty() {
            return Ok(Vec::new());
        }
        let kb = kb.as_str().to_string();
        let band_values: Vec<i64> = bands.iter().map(|b| *b as i64).collect();
        self.read(move |conn| {
            let placeholders = vec!["?"; band_values.len()].join(", ");
            let sql = format!(
                "SELECT pi.* FROM pattern_index pi
                 WHERE pi.kb_id = ?1 AND pi.name IN (
                     SELECT DISTINCT name FROM pattern_bands
                     WHERE kb_id = ?1 AND band IN ({placeholders})
                 )
                 ORDER BY pi.name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&kb];
            for band in &band_values {
                bound.push(band);
            }
            let rows = stmt
                .query_map(bound.as_slice(), row_to_index)?
                .collect::<rusqlite::Result<Vec<IndexRow>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let kb = kb.as_str().to_string();
        self.write(move |conn| {
            conn.execute("DELETE FROM pattern_bands WHERE kb_id = ?1", params![kb])?;
            let removed = conn.execute(
                "DELETE FROM pattern_index WHERE kb_id = ?1",
                params![kb],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}

#[async_trait]
impl CounterStore for SqliteTiers {
    async fn incr(&self, kb: &KbId, key: &str, by: i64) -> Result<i64> {
        let kb = kb.as_str().to_string();
        let key = key.to_string();
        self.write(move |conn| {
            let value: i64 = conn.query_row(
                "INSERT INTO counters (kb_id, key, int_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(kb_id, key)
                 DO UPDATE SET int_value = COALESCE(int_value, 0) + excluded.int_value
                 RETURNING int_value",
                params![kb, key, by],
                |row| row.get(0),
            )?;
            Ok(value)
        })
        .await
    }

    async fn get_int(&self, kb: &KbId, key: &str) -> Result<Option<i64>> {
        let kb = kb.as_str().to_string();
        let key = key.to_string();
        self.read(move |conn| {
            let value: Option<Option<i64>> = conn
                .query_row(
                    "SELECT int_value FROM counters WHERE kb_id = ?1 AND key = ?2",
                    params![kb, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.flatten())
        })
        .await
    }

    async fn get_json(&self, kb: &KbId, key: &str) -> Result<Option<serde_json::Value>> {
        let kb = kb.as_str().to_string();
        let key = key.to_string();
        self.read(move |conn| {
            let raw: Option<Option<String>> = conn
                .query_row(
                    "SELECT json_value FROM counters WHERE kb_id = ?1 AND key = ?2",
                    params![kb, key],
                    |row| row.get(0),
                )
                .optional()?;
            match raw.flatten() {
                Some(text) => Ok(Some(serde_json::from_str(&text)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_json(&self, kb: &KbId, key: &str, value: &serde_json::Value) -> Result<()> {
        let kb = kb.as_str().to_string();
        let key = key.to_string();
        let text = serde_json::to_string(value)?;
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO counters (kb_id, key, json_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(kb_id, key)
                 DO UPDATE SET json_value = excluded.json_value, int_value = NULL",
                params![kb, key, text],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, kb: &KbId, key: &str) -> Result<bool> {
        let kb = kb.as_str().to_string();
        let key = key.to_string();
        self.write(move |conn| {
            let removed = conn.execute(
                "DELETE FROM counters WHERE kb_id = ?1 AND key = ?2",
                params![kb, key],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn count_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64> {
        let kb = kb.as_str().to_string();
        let pattern = Self::like_prefix(prefix);
        self.read(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM counters
                 WHERE kb_id = ?1 AND key LIKE ?2 ESCAPE '\\'",
                params![kb, pattern],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn delete_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64> {
        let kb = kb.as_str().to_string();
        let pattern = Self::like_prefix(prefix);
        self.write(move |conn| {
            let removed = conn.execute(
                "DELETE FROM counters WHERE kb_id = ?1 AND key LIKE ?2 ESCAPE '\\'",
                params![kb, pattern],
            )?;
            Ok(removed as u64)
        })
        .await
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let kb = kb.as_str().to_string();
        self.write(move |conn| {
            let removed = conn.execute("DELETE FROM counters WHERE kb_id = ?1", params![kb])?;
            Ok(removed as u64)
        })
        .await
    }
}
