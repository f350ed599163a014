//! SQLite-backed metadata store for chunk records.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

use crate::error::HermesError;
use crate::models::Chunk;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id    INTEGER PRIMARY KEY,
    file_path   TEXT    NOT NULL,
    language    TEXT    NOT NULL,
    start_line  INTEGER NOT NULL,
    end_line    INTEGER NOT NULL,
    symbol_name TEXT,
    code_text   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);
CREATE INDEX IF NOT EXISTS idx_chunks_lang ON chunks(language);
";

/// Persistent mapping chunk_id -> chunk record.
///
/// Ids are explicit and dense from 0, in insertion order, so they line up
/// with dense-matrix rows and sparse doc indexes by construction.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self, HermesError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append chunks; the i-th chunk must carry id `previous count + i`.
    pub fn insert_many(&self, chunks: &[Chunk]) -> Result<(), HermesError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let base: i64 = tx.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (chunk_id, file_path, language, start_line, end_line, symbol_name, code_text) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (i, chunk) in chunks.iter().enumerate() {
                let expected = base + i as i64;
                if chunk.chunk_id != expected {
                    return Err(HermesError::Integrity(format!(
                        "chunk id {} does not match insertion position {expected}",
                        chunk.chunk_id
                    )));
                }
                stmt.execute(params![
                    chunk.chunk_id,
                    chunk.file_path,
                    chunk.language,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    chunk.symbol_name,
                    chunk.code_text,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get(&self, chunk_id: i64) -> Result<Option<Chunk>, HermesError> {
        let conn = self.conn.lock();
        let chunk = conn
            .query_row(
                "SELECT chunk_id, file_path, language, start_line, end_line, symbol_name, code_text \
                 FROM chunks WHERE chunk_id = ?1",
                [chunk_id],
                row_to_chunk,
            )
            .optional()?;
        Ok(chunk)
    }

    /// Batch lookup preserving input order. A missing id after a successful
    /// load means the artifact id spaces have diverged, which is fatal.
    pub fn get_many(&self, ids: &[i64]) -> Result<Vec<Chunk>, HermesError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT chunk_id, file_path, language, start_line, end_line, symbol_name, code_text \
             FROM chunks WHERE chunk_id = ?1",
        )?;
        let mut chunks = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match stmt.query_row([id], row_to_chunk).optional()? {
                Some(chunk) => chunks.push(chunk),
                None => missing.push(id),
            }
        }
        if !missing.is_empty() {
            return Err(HermesError::Integrity(format!(
                "metadata store is missing chunk ids {missing:?}"
            )));
        }
        Ok(chunks)
    }

    pub fn count(&self) -> Result<usize, HermesError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Ids matching both filters (AND). Prefix matching compares the exact
    /// leading substring of file_path, so LIKE metacharacters are inert.
    pub fn filter_ids(
        &self,
        language: Option<&str>,
        path_prefix: Option<&str>,
    ) -> Result<HashSet<i64>, HermesError> {
        let conn = self.conn.lock();
        let mut ids = HashSet::new();

        match (language, path_prefix) {
            (Some(lang), Some(prefix)) => {
                let mut stmt = conn.prepare(
                    "SELECT chunk_id FROM chunks WHERE language = ?1 AND substr(file_path, 1, ?2) = ?3",
                )?;
                let rows =
                    stmt.query_map(params![lang, prefix.len() as i64, prefix], |r| r.get(0))?;
                for id in rows {
                    ids.insert(id?);
                }
            }
            (Some(lang), None) => {
                let mut stmt = conn.prepare("SELECT chunk_id FROM chunks WHERE language = ?1")?;
                let rows = stmt.query_map([lang], |r| r.get(0))?;
                for id in rows {
                    ids.insert(id?);
                }
            }
            (None, Some(prefix)) => {
                let mut stmt = conn
                    .prepare("SELECT chunk_id FROM chunks WHERE substr(file_path, 1, ?1) = ?2")?;
                let rows = stmt.query_map(params![prefix.len() as i64, prefix], |r| r.get(0))?;
                for id in rows {
                    ids.insert(id?);
                }
            }
            (None, None) => {
                let mut stmt = conn.prepare("SELECT chunk_id FROM chunks")?;
                let rows = stmt.query_map([], |r| r.get(0))?;
                for id in rows {
                    ids.insert(id?);
                }
            }
        }
        Ok(ids)
    }
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        chunk_id: row.get(0)?,
        file_path: row.get(1)?,
        language: row.get(2)?,
        start_line: row.get::<_, i64>(3)? as usize,
        end_line: row.get::<_, i64>(4)? as usize,
        symbol_name: row.get(5)?,
        code_text: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: i64, path: &str, language: &str) -> Chunk {
        Chunk {
            chunk_id: id,
            file_path: path.to_string(),
            language: language.to_string(),
            start_line: 1,
            end_line: 10,
            symbol_name: None,
            code_text: format!("// chunk {id}"),
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> MetadataStore {
        MetadataStore::open(&dir.path().join("metadata.db")).unwrap()
    }

    #[test]
    fn test_insert_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let chunks = vec![
            chunk(0, "src/a.rs", "rust"),
            chunk(1, "src/b.py", "python"),
        ];
        store.insert_many(&chunks).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_insert_rejects_id_gap() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let err = store
            .insert_many(&[chunk(5, "src/a.rs", "rust")])
            .unwrap_err();
        assert!(matches!(err, HermesError::Integrity(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_get_many_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store
            .insert_many(&[
                chunk(0, "a.rs", "rust"),
                chunk(1, "b.rs", "rust"),
                chunk(2, "c.rs", "rust"),
            ])
            .unwrap();

        let got = store.get_many(&[2, 0, 1]).unwrap();
        let ids: Vec<i64> = got.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![2, 0, 1]);
    }

    #[test]
    fn test_get_many_missing_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert_many(&[chunk(0, "a.rs", "rust")]).unwrap();
        let err = store.get_many(&[0, 7]).unwrap_err();
        assert!(matches!(err, HermesError::Integrity(_)));
    }

    #[test]
    fn test_filter_ids_and_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store
            .insert_many(&[
                chunk(0, "src/api/a.py", "python"),
                chunk(1, "src/api/b.ts", "typescript"),
                chunk(2, "lib/c.py", "python"),
            ])
            .unwrap();

        let py = store.filter_ids(Some("python"), None).unwrap();
        assert_eq!(py, HashSet::from([0, 2]));

        let src = store.filter_ids(None, Some("src/")).unwrap();
        assert_eq!(src, HashSet::from([0, 1]));

        let both = store.filter_ids(Some("python"), Some("src/")).unwrap();
        assert_eq!(both, HashSet::from([0]));

        let none = store.filter_ids(Some("go"), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            let mut c = chunk(0, "a.rs", "rust");
            c.symbol_name = Some("main".to_string());
            store.insert_many(&[c]).unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.count().unwrap(), 1);
        let got = store.get(0).unwrap().unwrap();
        assert_eq!(got.symbol_name.as_deref(), Some("main"));
    }

    #[test]
    fn test_continued_insertion_extends_id_space() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert_many(&[chunk(0, "a.rs", "rust")]).unwrap();
        store.insert_many(&[chunk(1, "b.rs", "rust")]).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }
}
