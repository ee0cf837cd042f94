// Core types for chonker-evidence
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page space (top-left origin, PDF points).
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Multiply image-space coordinates into page space.
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            x0: self.x0 * scale_x,
            y0: self.y0 * scale_y,
            x1: self.x1 * scale_x,
            y1: self.y1 * scale_y,
        }
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

impl From<[f32; 4]> for BBox {
    fn from([x0, y0, x1, y1]: [f32; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> [f32; 4] {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// Which extraction path produced a line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSource {
    Native,
    Recognized,
}

/// One line of text with its page-space geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub text: String,
    pub bbox: BBox,
    pub page: u32,
    pub source: LineSource,
}

impl LineRecord {
    pub fn new(text: impl Into<String>, bbox: BBox, page: u32, source: LineSource) -> Self {
        Self {
            text: text.into(),
            bbox,
            page,
            source,
        }
    }
}

/// A run of lines grouped under one header, with merged geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub header: String,
    pub bbox: BBox,
    pub page: u32,
    pub index: usize,
}

impl Chunk {
    /// Persisted identifier shared with the search index.
    pub fn id(&self, document_name: &str) -> String {
        chunk_id(document_name, self.index as i64)
    }
}

pub fn chunk_id(document_name: &str, index: i64) -> String {
    format!("{}_{}", document_name, index)
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum ChonkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Failed rendering PDF: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChonkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_serializes_as_four_tuple() {
        let bbox = BBox::new(1.0, 2.5, 3.0, 4.0);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[1.0,2.5,3.0,4.0]");

        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn scaling_maps_image_space_to_page_space() {
        let image_box = BBox::new(100.0, 200.0, 300.0, 250.0);
        let page_box = image_box.scaled(0.12, 0.5);
        assert!((page_box.x0 - 12.0).abs() < 1e-4);
        assert!((page_box.y0 - 100.0).abs() < 1e-4);
        assert!((page_box.x1 - 36.0).abs() < 1e-4);
        assert!((page_box.y1 - 125.0).abs() < 1e-4);
    }

    #[test]
    fn chunk_ids_are_document_scoped() {
        let chunk = Chunk {
            text: "10.5 mg".into(),
            header: "Certified Values".into(),
            bbox: BBox::default(),
            page: 0,
            index: 7,
        };
        assert_eq!(chunk.id("BAM-A001.pdf"), "BAM-A001.pdf_7");
    }
}
