// OCR engine: recognizer seam, tesseract CLI backend, token-to-line assembly
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::{debug, warn};

use crate::types::{BBox, ChonkerError, LineRecord, LineSource, Result};

/// TSV rows at this level are words; everything else is layout structure.
const WORD_LEVEL: u32 = 5;

/// One recognized word with image-space geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedToken {
    pub text: String,
    /// Confidence on a 0-100 scale.
    pub confidence: f32,
    pub bbox: BBox,
    /// Recognizer's own line grouping: (block, paragraph, line).
    pub line_key: (u32, u32, u32),
}

/// Anything that turns a binarized page image into word tokens.
pub trait TextRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedToken>>;
}

impl<R: TextRecognizer + ?Sized> TextRecognizer for &R {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedToken>> {
        (**self).recognize(image)
    }
}

/// Runs the `tesseract` binary in TSV mode on a temporary PNG.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    language: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedToken>> {
        let temp = tempfile::Builder::new()
            .prefix("chonker_ocr_")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(temp.path(), ImageFormat::Png)
            .map_err(|e| ChonkerError::Recognition(format!("could not write page image: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(temp.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .arg("tsv")
            .output()
            .map_err(|e| ChonkerError::Recognition(format!("{} failed to start: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ChonkerError::Recognition(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let tsv = String::from_utf8_lossy(&output.stdout);
        let tokens = parse_tsv(&tsv);
        debug!(tokens = tokens.len(), "tesseract recognized words");
        Ok(tokens)
    }
}

/// Parse tesseract's TSV output into word tokens.
///
/// Columns: level page block par line word left top width height conf text.
/// Rows that are not words or do not parse are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<RecognizedToken> {
    tsv.lines()
        .filter(|row| !row.starts_with("level"))
        .filter_map(|row| {
            let cols: Vec<&str> = row.splitn(12, '\t').collect();
            if cols.len() < 11 {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<i64>().ok();
            if num(0)? != WORD_LEVEL as i64 {
                return None;
            }
            let (left, top, width, height) = (num(6)?, num(7)?, num(8)?, num(9)?);
            let confidence = cols[10].trim().parse::<f32>().ok()?;
            Some(RecognizedToken {
                text: cols.get(11).map(|t| t.trim().to_string()).unwrap_or_default(),
                confidence,
                bbox: BBox::new(left as f32, top as f32, (left + width) as f32, (top + height) as f32),
                line_key: (num(2)? as u32, num(3)? as u32, num(4)? as u32),
            })
        })
        .collect()
}

/// Group tokens into lines and scale them into page space.
///
/// Low-confidence tokens are left out of the line text but never sink the
/// whole line; a line only disappears when none of its words survive.
pub fn assemble_recognized_lines(
    page: u32,
    tokens: &[RecognizedToken],
    scale_x: f32,
    scale_y: f32,
    min_confidence: f32,
) -> Vec<LineRecord> {
    let mut groups: Vec<((u32, u32, u32), Vec<&RecognizedToken>)> = Vec::new();
    for token in tokens.iter().filter(|t| !t.text.is_empty()) {
        match groups.iter_mut().find(|(key, _)| *key == token.line_key) {
            Some((_, members)) => members.push(token),
            None => groups.push((token.line_key, vec![token])),
        }
    }

    let mut dropped = 0usize;
    let lines: Vec<LineRecord> = groups
        .into_iter()
        .filter_map(|(_, members)| {
            let text = members
                .iter()
                .filter(|t| t.confidence > min_confidence)
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                dropped += 1;
                return None;
            }
            let image_box = members
                .iter()
                .skip(1)
                .fold(members[0].bbox, |acc, t| acc.union(&t.bbox));
            Some(LineRecord::new(
                text,
                image_box.scaled(scale_x, scale_y),
                page,
                LineSource::Recognized,
            ))
        })
        .collect();

    if dropped > 0 {
        warn!(page, dropped, "recognized lines had no confident words");
    }
    lines
}
