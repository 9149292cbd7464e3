//! SQLite-backed vector store.
//!
//! One row per chunk, keyed by the chunk's content hash. Embeddings are kept
//! as little-endian `f32` blobs and scored by brute-force cosine similarity.
//! All methods are synchronous; callers on the async side go through
//! `spawn_blocking`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};

use super::splitter::DocumentChunk;
use crate::embeddings::cosine_similarity;
use crate::error::AppError;

pub const DB_FILENAME: &str = "index.db";
const SCHEMA_VERSION: i64 = 1;

/// A stored chunk and its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorStore {
    db_path: PathBuf,
}

impl VectorStore {
    /// Open (creating if needed) the store inside `dir`.
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::Index(format!("vector store: cannot create {}: {e}", dir.display()))
        })?;
        let store = Self { db_path: dir.join(DB_FILENAME) };
        store.init_db()?;
        Ok(store)
    }

    /// Delete any existing database in `dir`, then open an empty one.
    pub fn create_fresh(dir: &Path) -> Result<Self, AppError> {
        for suffix in ["", "-wal", "-shm"] {
            let path = dir.join(format!("{DB_FILENAME}{suffix}"));
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    AppError::Index(format!("vector store: remove {}: {e}", path.display()))
                })?;
            }
        }
        Self::open(dir)
    }

    pub fn exists_in(dir: &Path) -> bool {
        dir.join(DB_FILENAME).is_file()
    }

    /// Which of `ids` are already stored.
    pub fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT 1 FROM chunks WHERE id = ?1 LIMIT 1")
            .map_err(|e| AppError::Index(format!("vector store: prepare existing_ids: {e}")))?;

        let mut found = HashSet::new();
        for id in ids {
            let present = stmt
                .exists(params![id])
                .map_err(|e| AppError::Index(format!("vector store: lookup {id}: {e}")))?;
            if present {
                found.insert(id.clone());
            }
        }
        Ok(found)
    }

    /// Insert chunks with their embeddings. Rows whose id already exists are
    /// skipped. Returns the number of rows written.
    pub fn insert(&self, rows: &[(DocumentChunk, Vec<f32>)]) -> Result<usize, AppError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("vector store: begin insert tx: {e}")))?;

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut written = 0;
        for (chunk, embedding) in rows {
            written += tx
                .execute(
                    "INSERT OR IGNORE INTO chunks (id, source, page, position, text, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        chunk.id(),
                        chunk.source,
                        chunk.page as i64,
                        chunk.position as i64,
                        chunk.text,
                        encode_embedding(embedding),
                        now,
                    ],
                )
                .map_err(|e| AppError::Index(format!("vector store: insert chunk: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("vector store: commit insert tx: {e}")))?;
        Ok(written)
    }

    /// Top-`k` chunks by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT source, page, position, text, embedding FROM chunks")
            .map_err(|e| AppError::Index(format!("vector store: prepare search: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(4)?;
                Ok((
                    DocumentChunk {
                        source: row.get(0)?,
                        page: row.get::<_, i64>(1)? as usize,
                        position: row.get::<_, i64>(2)? as usize,
                        text: row.get(3)?,
                    },
                    blob,
                ))
            })
            .map_err(|e| AppError::Index(format!("vector store: execute search: {e}")))?;

        let mut scored = Vec::new();
        for row in rows {
            let (chunk, blob) =
                row.map_err(|e| AppError::Index(format!("vector store: map search row: {e}")))?;
            let score = cosine_similarity(query, &decode_embedding(&blob));
            scored.push(ScoredChunk { chunk, score });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn count(&self) -> Result<usize, AppError> {
        let conn = self.open_conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("vector store: count: {e}")))?;
        Ok(n as usize)
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("vector store: read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    source TEXT NOT NULL,
                    page INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS chunks_source ON chunks(source);

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Index(format!("vector store: initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Index(format!(
                "vector store: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path).map_err(|e| {
            AppError::Index(format!("vector store: open {}: {e}", self.db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Index(format!("vector store: set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Index(format!("vector store: set busy_timeout: {e}")))?;
        Ok(conn)
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for x in v {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str, page: usize) -> DocumentChunk {
        DocumentChunk { text: text.into(), source: "notes.pdf".into(), page, position: 0 }
    }

    fn make_store() -> (TempDir, VectorStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = VectorStore::open(&temp.path().join("vector_store")).expect("open store");
        (temp, store)
    }

    #[test]
    fn search_ranks_by_cosine() {
        let (_temp, store) = make_store();
        store
            .insert(&[
                (chunk("east", 0), vec![1.0, 0.0]),
                (chunk("north", 1), vec![0.0, 1.0]),
                (chunk("north-east", 2), vec![0.7071, 0.7071]),
            ])
            .expect("insert");

        let hits = store.search(&[0.0, 1.0], 2).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "north");
        assert_eq!(hits[0].chunk.page, 1);
        assert_eq!(hits[1].chunk.text, "north-east");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let (_temp, store) = make_store();
        let rows = vec![(chunk("same", 0), vec![1.0])];
        assert_eq!(store.insert(&rows).unwrap(), 1);
        assert_eq!(store.insert(&rows).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 1);

        let ids = vec![chunk("same", 0).id(), chunk("other", 0).id()];
        let existing = store.existing_ids(&ids).unwrap();
        assert!(existing.contains(&ids[0]));
        assert!(!existing.contains(&ids[1]));
    }

    #[test]
    fn reopen_keeps_rows_and_fresh_drops_them() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("vector_store");
        VectorStore::open(&dir).unwrap().insert(&[(chunk("kept", 0), vec![1.0])]).unwrap();
        assert!(VectorStore::exists_in(&dir));

        assert_eq!(VectorStore::open(&dir).unwrap().count().unwrap(), 1);
        assert_eq!(VectorStore::create_fresh(&dir).unwrap().count().unwrap(), 0);
    }

    #[test]
    fn embedding_blob_round_trips() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }
}
