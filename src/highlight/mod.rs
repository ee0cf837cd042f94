// Highlight reconstruction: chunk ids back to annotated page regions
pub mod annotate;

use lopdf::Document;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::storage::{ChunkStore, StoredChunk};
use crate::types::{BBox, ChonkerError, Result};

pub use annotate::add_highlight_rects;

const CACHE_KEY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightRequest {
    pub document_name: String,
    pub chunk_ids: Vec<u32>,
    /// RGB in [0, 1]; anything shorter than three components means "default".
    pub color: Option<Vec<f32>>,
}

impl HighlightRequest {
    pub fn new(document_name: impl Into<String>, chunk_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            document_name: document_name.into(),
            chunk_ids: chunk_ids.into_iter().collect(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<Vec<f32>>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightEntry {
    pub chunk_id: i64,
    pub page: Option<u32>,
    pub bbox: BBox,
    pub header: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightResponse {
    pub success: bool,
    pub doc_name: String,
    pub chunk_ids: Vec<u32>,
    pub annotated_pdf: String,
    pub annotated_pdf_path: PathBuf,
    pub annotated_pdf_url: String,
    pub highlights: Vec<HighlightEntry>,
    pub cached: bool,
    // first highlight, for callers that only scroll to one region
    pub page: Option<u32>,
    pub bbox: Option<BBox>,
}

impl HighlightResponse {
    pub fn first_highlight(&self) -> Option<&HighlightEntry> {
        self.highlights.first()
    }
}

/// Structured failure body mirroring the success response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightFailure {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_ids: Option<Vec<u32>>,
}

impl HighlightFailure {
    pub fn from_error(err: &ChonkerError, chunk_ids: Option<Vec<u32>>) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            chunk_ids,
        }
    }

    /// Failure body for a request, echoing its ids the way a success would.
    pub fn for_request(err: &ChonkerError, chunk_ids: &[u32]) -> Self {
        Self::from_error(err, Some(normalize_chunk_ids(chunk_ids)))
    }
}

/// Sorted, de-duplicated ids.
pub fn normalize_chunk_ids(ids: &[u32]) -> Vec<u32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub fn resolve_color(color: Option<&[f32]>, default: [f32; 3]) -> [f32; 3] {
    match color {
        Some([r, g, b, ..]) => [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)],
        _ => default,
    }
}

/// Short content hash of document, sorted ids and color at three decimals.
pub fn cache_key(document_name: &str, sorted_ids: &[u32], color: [f32; 3]) -> String {
    let ids = sorted_ids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    let rgb = color.iter().map(|c| format!("{c:.3}")).collect::<Vec<_>>().join(",");
    let key = format!("{document_name}|{ids}|{rgb}");

    let digest = Sha256::digest(key.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(CACHE_KEY_LEN);
    hex
}

pub fn annotated_file_name(document_name: &str, key: &str) -> String {
    format!("{document_name}__annotated_{key}.pdf")
}

/// Parse a stored bbox (`[x0, y0, x1, y1]` or `(x0, y0, x1, y1)`).
///
/// Extra coordinates are ignored; fewer than four, or anything unparsable, is `None`.
pub fn parse_bbox(raw: &str) -> Option<BBox> {
    let inner = raw
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let coords = inner
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<f32>>>()?;
    match coords.as_slice() {
        [x0, y0, x1, y1, ..] => Some(BBox::new(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

/// Keep records whose geometry is usable; log the rest.
pub fn prepare_highlights(records: &[StoredChunk]) -> Vec<HighlightEntry> {
    records
        .iter()
        .filter_map(|record| {
            let Some(bbox) = record.bbox.as_deref().and_then(parse_bbox) else {
                warn!(chunk = %record.id(), bbox = ?record.bbox, "invalid bbox, chunk left out of highlights");
                return None;
            };
            Some(HighlightEntry {
                chunk_id: record.chunk_idx,
                page: record.page.and_then(|p| u32::try_from(p).ok()),
                bbox,
                header: record.header.clone(),
            })
        })
        .collect()
}

pub fn validate_document_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ChonkerError::InvalidInput(format!("invalid document name: {name:?}")));
    }
    Ok(())
}

pub struct Highlighter<'a, S: ?Sized> {
    store: &'a S,
    originals_dir: PathBuf,
    annotated_dir: PathBuf,
    default_color: [f32; 3],
    opacity: f32,
    url_prefix: String,
}

impl<'a, S: ChunkStore + ?Sized> Highlighter<'a, S> {
    pub fn new(store: &'a S, settings: &Settings) -> Self {
        Self {
            store,
            originals_dir: settings.originals_dir(),
            annotated_dir: settings.annotated_dir(),
            default_color: settings.highlight.color,
            opacity: settings.highlight.opacity,
            url_prefix: settings.highlight.url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn generate_highlight(&self, request: &HighlightRequest) -> Result<HighlightResponse> {
        let doc_name = request.document_name.as_str();
        validate_document_name(doc_name)?;

        let chunk_ids = normalize_chunk_ids(&request.chunk_ids);
        if chunk_ids.is_empty() {
            return Err(ChonkerError::InvalidInput("No chunk IDs provided".into()));
        }

        let original_path = self.originals_dir.join(doc_name);
        if !original_path.is_file() {
            warn!(path = %original_path.display(), "original document not found");
            return Err(ChonkerError::NotFound(format!("Original document not found: {doc_name}")));
        }

        let color = resolve_color(request.color.as_deref(), self.default_color);
        let key = cache_key(doc_name, &chunk_ids, color);
        let annotated_name = annotated_file_name(doc_name, &key);
        let annotated_path = self.annotated_dir.join(&annotated_name);
        let cached = annotated_path.is_file();

        let records = self.store.get_chunks(doc_name, &chunk_ids)?;
        if records.len() < chunk_ids.len() {
            debug!(
                requested = chunk_ids.len(),
                found = records.len(),
                "some chunk ids have no stored metadata"
            );
        }
        let highlights = prepare_highlights(&records);
        if highlights.is_empty() {
            return Err(ChonkerError::NotFound(
                "No valid highlights found for the provided chunk_ids".into(),
            ));
        }

        if cached {
            info!(file = %annotated_name, "annotated pdf cache hit");
        } else {
            let drawn = self.render(&original_path, &annotated_path, &highlights, color)?;
            info!(file = %annotated_name, drawn, "annotated pdf rendered");
        }

        let first = highlights.first();
        Ok(HighlightResponse {
            success: true,
            doc_name: doc_name.to_string(),
            chunk_ids,
            annotated_pdf_url: format!("{}/{}", self.url_prefix, annotated_name),
            annotated_pdf: annotated_name,
            annotated_pdf_path: annotated_path,
            page: first.and_then(|h| h.page),
            bbox: first.map(|h| h.bbox),
            highlights,
            cached,
        })
    }

    /// Raw bytes of the annotated artifact, for callers that asked for the file itself.
    pub fn read_artifact(&self, response: &HighlightResponse) -> Result<Vec<u8>> {
        Ok(fs::read(self.annotated_dir.join(&response.annotated_pdf))?)
    }

    /// Annotate a copy of the original and move it into place atomically.
    fn render(
        &self,
        original: &Path,
        target: &Path,
        highlights: &[HighlightEntry],
        color: [f32; 3],
    ) -> Result<usize> {
        let render_err = |e: &dyn std::fmt::Display| ChonkerError::Render(e.to_string());

        let mut document = Document::load(original).map_err(|e| render_err(&e))?;
        let rects: Vec<(u32, BBox)> = highlights
            .iter()
            .filter_map(|h| h.page.map(|page| (page, h.bbox)))
            .collect();
        let drawn = add_highlight_rects(&mut document, &rects, color, self.opacity)
            .map_err(|e| render_err(&e))?;

        fs::create_dir_all(&self.annotated_dir)?;
        // temp file lives next to the target so the rename stays on one filesystem
        let mut temp = NamedTempFile::new_in(&self.annotated_dir)?;
        document.save_to(temp.as_file_mut()).map_err(|e| render_err(&e))?;
        temp.persist(target).map_err(|e| render_err(&e.error))?;
        Ok(drawn)
    }
}
