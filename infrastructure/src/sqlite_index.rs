//! Local similarity index backed by SQLite, ranked by cosine similarity.

use crate::search::rank_by_similarity;
use anyhow::{anyhow, Context};
use domain::models::{Chunk, IndexRecord, RetrievedChunk};
use domain::ports::VectorIndex;
use rusqlite::{params, Connection, Result as SqlResult};
use shared::types::Result;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open index at {}", db_path.display()))?;
        Self::setup_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::setup_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn setup_db(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                doc_name TEXT NOT NULL,
                chunk_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vectors_doc ON vectors(doc_name);
        ",
        )
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite index lock poisoned"))
    }

    /// Number of stored vectors.
    pub fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn upsert_records(&self, records: &[IndexRecord]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO vectors (id, doc_name, chunk_id, text, vector) VALUES (?, ?, ?, ?, ?)",
            )?;
            for record in records {
                let vector_bytes = serde_json::to_vec(&record.values)?;
                stmt.execute(params![
                    record.id,
                    record.metadata.doc_name,
                    record.metadata.chunk_id as i64,
                    record.metadata.text,
                    vector_bytes
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<(Vec<f32>, Chunk)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT doc_name, chunk_id, text, vector FROM vectors")?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let chunk_id: i64 = row.get(1)?;
            let vector_bytes: Vec<u8> = row.get(3)?;
            let vector: Vec<f32> = serde_json::from_slice(&vector_bytes)?;
            entries.push((
                vector,
                Chunk {
                    doc_name: row.get(0)?,
                    chunk_id: chunk_id as usize,
                    text: row.get(2)?,
                },
            ));
        }
        Ok(entries)
    }
}

impl VectorIndex for SqliteIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        self.upsert_records(records)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let entries = self.load_all()?;
        Ok(rank_by_similarity(vector, entries, top_k)
            .into_iter()
            .map(|(score, chunk)| RetrievedChunk {
                chunk,
                score: Some(score),
            })
            .collect())
    }
}
