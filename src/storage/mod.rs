// Storage layer: chunk metadata owned by the search index
pub mod sqlite_storage;

use serde::{Deserialize, Serialize};

use crate::types::{chunk_id, Chunk, Result};

pub use sqlite_storage::SqliteChunkStore;

/// Chunk metadata as persisted: `{source, chunk_idx, header, bbox, page}` plus text.
///
/// `bbox` stays a raw string so that whatever was stored reaches the
/// highlighter, which decides whether it is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub source: String,
    pub chunk_idx: i64,
    pub header: String,
    pub bbox: Option<String>,
    pub page: Option<i64>,
    pub text: String,
}

impl StoredChunk {
    pub fn from_chunk(document_name: &str, chunk: &Chunk) -> Self {
        let coords: [f32; 4] = chunk.bbox.into();
        Self {
            source: document_name.to_string(),
            chunk_idx: chunk.index as i64,
            header: chunk.header.clone(),
            bbox: serde_json::to_string(&coords).ok(),
            page: Some(chunk.page as i64),
            text: chunk.text.clone(),
        }
    }

    pub fn id(&self) -> String {
        chunk_id(&self.source, self.chunk_idx)
    }
}

/// Point-lookup view of the search index's metadata store.
pub trait ChunkStore {
    fn document_exists(&self, document_name: &str) -> Result<bool>;

    fn upsert_chunks(&self, chunks: &[StoredChunk]) -> Result<()>;

    /// Records for exactly these ids, in request order; unknown ids are skipped.
    fn get_chunks(&self, document_name: &str, chunk_ids: &[u32]) -> Result<Vec<StoredChunk>>;

    fn list_chunks(&self, document_name: &str) -> Result<Vec<StoredChunk>>;
}
