// Native text layer: group co-located spans into lines
use crate::types::{BBox, LineRecord, LineSource};

/// Fraction of the shorter span height two spans must share vertically to sit on one line.
const SAME_LINE_OVERLAP: f32 = 0.5;

/// Horizontal gap (relative to span height) that reads as a word break.
const WORD_GAP: f32 = 0.25;

/// A run of text from the document's text layer, already in top-left page space.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeSpan {
    pub text: String,
    pub bbox: BBox,
}

impl NativeSpan {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self { text: text.into(), bbox }
    }

    /// Convert a bottom-left-origin PDF rectangle into top-left page space.
    pub fn from_pdf_rect(text: impl Into<String>, left: f32, bottom: f32, right: f32, top: f32, page_height: f32) -> Self {
        Self::new(text, BBox::new(left, page_height - top, right, page_height - bottom))
    }
}

fn shares_line(line: &BBox, span: &BBox) -> bool {
    let overlap = line.y1.min(span.y1) - line.y0.max(span.y0);
    let shorter = line.height().min(span.height());
    if shorter <= 0.0 {
        // degenerate boxes: fall back to identical baselines
        return (line.y1 - span.y1).abs() < f32::EPSILON;
    }
    overlap >= shorter * SAME_LINE_OVERLAP
}

struct OpenLine {
    text: String,
    bbox: BBox,
    last_x1: f32,
}

impl OpenLine {
    fn start(span: &NativeSpan) -> Self {
        Self {
            text: span.text.clone(),
            bbox: span.bbox,
            last_x1: span.bbox.x1,
        }
    }

    fn extend(&mut self, span: &NativeSpan) {
        let gap = span.bbox.x0 - self.last_x1;
        let boundary_is_blank = self.text.ends_with(char::is_whitespace)
            || span.text.starts_with(char::is_whitespace);
        if gap > span.bbox.height().max(1.0) * WORD_GAP && !boundary_is_blank {
            self.text.push(' ');
        }
        self.text.push_str(&span.text);
        self.bbox = self.bbox.union(&span.bbox);
        self.last_x1 = span.bbox.x1;
    }

    fn finish(self, page: u32) -> Option<LineRecord> {
        let text = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return None;
        }
        Some(LineRecord::new(text, self.bbox, page, LineSource::Native))
    }
}

/// One LineRecord per non-empty rendering line, in text-layer order.
pub fn assemble_native_lines(page: u32, spans: &[NativeSpan]) -> Vec<LineRecord> {
    let mut lines = Vec::new();
    let mut open: Option<OpenLine> = None;

    for span in spans {
        if span.text.is_empty() {
            continue;
        }
        match open.as_mut() {
            Some(line) if shares_line(&line.bbox, &span.bbox) => line.extend(span),
            _ => {
                if let Some(done) = open.take().and_then(|l| l.finish(page)) {
                    lines.push(done);
                }
                open = Some(OpenLine::start(span));
            }
        }
    }
    if let Some(done) = open.and_then(|l| l.finish(page)) {
        lines.push(done);
    }
    lines
}
