// Chunking: header classification, segmentation, geometry merging
pub mod bbox;
pub mod header;
pub mod segmenter;

pub use bbox::merge_bboxes;
pub use header::{HeaderClassifier, LineClass};
pub use segmenter::{segment_lines, ChunkColumns, Segmenter};
