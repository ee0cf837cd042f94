// SQLite chunk metadata store
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::{ChunkStore, StoredChunk};
use crate::types::{chunk_id, Result};

pub struct SqliteChunkStore {
    conn: Connection,
}

impl SqliteChunkStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- One row per chunk, keyed "{source}_{chunk_idx}"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_idx INTEGER NOT NULL,
                header TEXT NOT NULL DEFAULT '',
                bbox TEXT,               -- serialized [x0, y0, x1, y1]
                page INTEGER,
                text TEXT NOT NULL,
                stored_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_source
                ON chunks(source);
        "#,
        )?;
        Ok(())
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredChunk> {
        Ok(StoredChunk {
            source: row.get(0)?,
            chunk_idx: row.get(1)?,
            header: row.get(2)?,
            bbox: row.get(3)?,
            page: row.get(4)?,
            text: row.get(5)?,
        })
    }
}

impl ChunkStore for SqliteChunkStore {
    fn document_exists(&self, document_name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM chunks WHERE source = ?1 LIMIT 1",
                params![document_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert_chunks(&self, chunks: &[StoredChunk]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO chunks (id, source, chunk_idx, header, bbox, page, text)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                   ON CONFLICT(id) DO UPDATE SET
                       header = excluded.header,
                       bbox = excluded.bbox,
                       page = excluded.page,
                       text = excluded.text,
                       stored_at = CURRENT_TIMESTAMP"#,
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id(),
                    chunk.source,
                    chunk.chunk_idx,
                    chunk.header,
                    chunk.bbox,
                    chunk.page,
                    chunk.text,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = chunks.len(), "stored chunks");
        Ok(())
    }

    fn get_chunks(&self, document_name: &str, chunk_ids: &[u32]) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, chunk_idx, header, bbox, page, text FROM chunks WHERE id = ?1",
        )?;
        let mut found = Vec::with_capacity(chunk_ids.len());
        for &idx in chunk_ids {
            let id = chunk_id(document_name, idx as i64);
            if let Some(chunk) = stmt.query_row(params![id], Self::row_to_chunk).optional()? {
                found.push(chunk);
            }
        }
        Ok(found)
    }

    fn list_chunks(&self, document_name: &str) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT source, chunk_idx, header, bbox, page, text
               FROM chunks
               WHERE source = ?1
               ORDER BY chunk_idx"#,
        )?;
        let rows = stmt.query_map(params![document_name], Self::row_to_chunk)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BBox, Chunk};

    fn chunk(index: usize, header: &str) -> Chunk {
        Chunk {
            text: format!("body {index}"),
            header: header.into(),
            bbox: BBox::new(72.0, 100.0 + index as f32, 400.0, 120.0 + index as f32),
            page: index as u32 / 2,
            index,
        }
    }

    #[test]
    fn stores_and_point_looks_up_chunks() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let records: Vec<StoredChunk> = (0..4)
            .map(|i| StoredChunk::from_chunk("BAM-A001.pdf", &chunk(i, "Certified Values")))
            .collect();
        store.upsert_chunks(&records).unwrap();

        assert!(store.document_exists("BAM-A001.pdf").unwrap());
        assert!(!store.document_exists("BAM-S030.pdf").unwrap());

        let got = store.get_chunks("BAM-A001.pdf", &[3, 999, 1]).unwrap();
        let idx: Vec<i64> = got.iter().map(|c| c.chunk_idx).collect();
        assert_eq!(idx, vec![3, 1]);
        assert_eq!(got[0].page, Some(1));
        assert_eq!(got[0].header, "Certified Values");
        assert_eq!(got[0].bbox.as_deref(), Some("[72.0,103.0,400.0,123.0]"));
    }

    #[test]
    fn lookups_do_not_cross_documents() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        store
            .upsert_chunks(&[StoredChunk::from_chunk("a.pdf", &chunk(0, ""))])
            .unwrap();
        assert!(store.get_chunks("b.pdf", &[0]).unwrap().is_empty());
    }

    #[test]
    fn upsert_replaces_existing_rows() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        store
            .upsert_chunks(&[StoredChunk::from_chunk("a.pdf", &chunk(0, "Storage"))])
            .unwrap();
        store
            .upsert_chunks(&[StoredChunk::from_chunk("a.pdf", &chunk(0, "Transport"))])
            .unwrap();

        let all = store.list_chunks("a.pdf").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].header, "Transport");
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.sqlite");
        {
            let store = SqliteChunkStore::open(&path).unwrap();
            store
                .upsert_chunks(&[StoredChunk::from_chunk("a.pdf", &chunk(5, ""))])
                .unwrap();
        }
        let store = SqliteChunkStore::open(&path).unwrap();
        assert_eq!(store.get_chunks("a.pdf", &[5]).unwrap().len(), 1);
    }
}
