// src/memory/store.rs — SQLite tip log
//
// Raw tip text lives here; the vector index only stores embeddings. Rows
// carry the index id so a vector can be traced back to the text it came from.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::memory::schema;

/// Low-level SQLite operations for the tip log.
pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct TipRow {
    pub id: i64,
    pub stream: String,
    pub index_id: Option<i64>,
    pub text: String,
    pub delivered: bool,
    pub created_at: String,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database with schema applied (for tests and dry runs).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // -- Tips --

    /// Record an accepted tip. `index_id` is `None` for tips that were
    /// accepted without a similarity check.
    pub fn insert_tip(
        &self,
        stream: &str,
        index_id: Option<u64>,
        text: &str,
    ) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tips (stream, index_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![stream, index_id.map(|i| i as i64), text, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn mark_delivered(&self, tip_id: i64) -> anyhow::Result<()> {
        self.conn.execute(
            "UPDATE tips SET delivered = 1 WHERE id = ?1",
            params![tip_id],
        )?;
        Ok(())
    }

    pub fn count_tips(&self, stream: &str) -> anyhow::Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tips WHERE stream = ?1",
            params![stream],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    /// Most recent tips first.
    pub fn recent_tips(&self, stream: &str, limit: u32) -> anyhow::Result<Vec<TipRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, stream, index_id, text, delivered, created_at FROM tips
             WHERE stream = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![stream, limit], |row| {
                Ok(TipRow {
                    id: row.get(0)?,
                    stream: row.get(1)?,
                    index_id: row.get(2)?,
                    text: row.get(3)?,
                    delivered: row.get::<_, i64>(4)? != 0,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- Similar (rejected) tips --

    pub fn insert_similar_tip(
        &self,
        stream: &str,
        matched_index_id: u64,
        score: f32,
        text: &str,
    ) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO similar_tips (stream, matched_index_id, score, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![stream, matched_index_id as i64, score as f64, text, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count_similar(&self, stream: &str) -> anyhow::Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM similar_tips WHERE stream = ?1",
            params![stream],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}
