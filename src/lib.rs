// chonker-evidence: spatial text segmentation and highlight reconstruction for PDFs
pub mod chunking;
pub mod config;
pub mod highlight;
pub mod ingest;
pub mod pdf_extraction;
pub mod storage;
pub mod types;

pub use chunking::{merge_bboxes, segment_lines, ChunkColumns, HeaderClassifier, LineClass};
pub use config::Settings;
pub use highlight::{HighlightFailure, HighlightRequest, HighlightResponse, Highlighter};
pub use ingest::{IngestReport, Ingestor};
pub use pdf_extraction::{DocumentExtraction, LineBoxCollector, PageExtraction, PageTextExtractor, TextRecognizer};
pub use storage::{ChunkStore, SqliteChunkStore, StoredChunk};
pub use types::{BBox, Chunk, ChonkerError, LineRecord, LineSource, Result};
