// Chunk segmentation over the document-wide line sequence
use serde::Serialize;
use tracing::trace;

use super::bbox::merge_bboxes;
use super::header::{HeaderClassifier, LineClass};
use crate::types::{BBox, Chunk, LineRecord};

/// Lines gathered for the chunk currently being built.
#[derive(Debug, Default, Clone)]
struct Accumulator {
    texts: Vec<String>,
    boxes: Vec<BBox>,
    page: Option<u32>,
    header: String,
}

impl Accumulator {
    fn with_header(header: String) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    fn absorb(&mut self, line: &LineRecord, text: &str, include_text: bool) {
        if self.page.is_none() {
            self.page = Some(line.page);
        }
        if include_text {
            self.texts.push(text.to_string());
        }
        self.boxes.push(line.bbox);
    }

    /// Close into a chunk; `None` when nothing was absorbed.
    fn close(self, index: usize) -> Option<Chunk> {
        let bbox = merge_bboxes(&self.boxes)?;
        let text = if self.texts.is_empty() {
            // a header with nothing under it keeps its own text
            self.header.clone()
        } else {
            self.texts.join(" ")
        };
        Some(Chunk {
            text,
            header: self.header,
            bbox,
            page: self.page.unwrap_or_default(),
            index,
        })
    }
}

/// Fold state: the open accumulator plus the header new content inherits.
#[derive(Debug, Default)]
struct SegmentState {
    pending_header: String,
    current: Accumulator,
}

impl SegmentState {
    /// Feed one line; returns the accumulator closed by it, if any.
    fn step(&mut self, class: LineClass, line: &LineRecord, text: &str) -> Option<Accumulator> {
        let page_changed = !self.current.is_empty() && self.current.page != Some(line.page);
        let cut = matches!(class, LineClass::Header | LineClass::Boundary) || page_changed;

        let closed = if cut {
            let next = match class {
                LineClass::Boundary => Accumulator::default(),
                // a page change alone keeps the section header going
                _ => Accumulator::with_header(self.pending_header.clone()),
            };
            Some(std::mem::replace(&mut self.current, next)).filter(|acc| !acc.is_empty())
        } else {
            None
        };

        match class {
            LineClass::Header => {
                self.pending_header = text.to_string();
                self.current = Accumulator::with_header(text.to_string());
                self.current.absorb(line, text, false);
            }
            LineClass::Boundary => {
                self.pending_header.clear();
            }
            LineClass::Body => {
                if self.current.is_empty() {
                    self.current.header = self.pending_header.clone();
                }
                self.current.absorb(line, text, true);
            }
        }

        closed
    }
}

/// Lazily cuts a line sequence into chunks, numbering them in closure order.
pub struct Segmenter<'c, I> {
    classifier: &'c HeaderClassifier,
    lines: I,
    state: SegmentState,
    next_index: usize,
    finished: bool,
}

impl<'c, I> Segmenter<'c, I>
where
    I: Iterator<Item = LineRecord>,
{
    pub fn new(classifier: &'c HeaderClassifier, lines: I) -> Self {
        Self {
            classifier,
            lines,
            state: SegmentState::default(),
            next_index: 0,
            finished: false,
        }
    }

    fn emit(&mut self, acc: Accumulator) -> Option<Chunk> {
        let chunk = acc.close(self.next_index)?;
        trace!(index = chunk.index, page = chunk.page, header = %chunk.header, "closed chunk");
        self.next_index += 1;
        Some(chunk)
    }
}

impl<I> Iterator for Segmenter<'_, I>
where
    I: Iterator<Item = LineRecord>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }
        while let Some(line) = self.lines.next() {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            let class = self.classifier.classify(text);
            let text = text.to_string();
            if let Some(closed) = self.state.step(class, &line, &text) {
                if let Some(chunk) = self.emit(closed) {
                    return Some(chunk);
                }
            }
        }
        self.finished = true;
        let last = std::mem::take(&mut self.state.current);
        self.emit(last)
    }
}

/// Segment a whole line sequence eagerly.
pub fn segment_lines<I>(classifier: &HeaderClassifier, lines: I) -> Vec<Chunk>
where
    I: IntoIterator<Item = LineRecord>,
{
    Segmenter::new(classifier, lines.into_iter()).collect()
}

/// Index-aligned columns handed to the search index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkColumns {
    pub chunk_text: Vec<String>,
    pub bboxes: Vec<BBox>,
    pub pages: Vec<u32>,
    pub headers: Vec<String>,
}

impl ChunkColumns {
    pub fn len(&self) -> usize {
        self.chunk_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_text.is_empty()
    }
}

impl<'a> FromIterator<&'a Chunk> for ChunkColumns {
    fn from_iter<T: IntoIterator<Item = &'a Chunk>>(iter: T) -> Self {
        let mut columns = ChunkColumns::default();
        for chunk in iter {
            columns.chunk_text.push(chunk.text.clone());
            columns.bboxes.push(chunk.bbox);
            columns.pages.push(chunk.page);
            columns.headers.push(chunk.header.clone());
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineSource;

    fn line(page: u32, row: u32, text: &str) -> LineRecord {
        let y = row as f32 * 14.0;
        LineRecord::new(text, BBox::new(72.0, y, 72.0 + 6.0 * text.len() as f32, y + 12.0), page, LineSource::Native)
    }

    fn segment(lines: Vec<LineRecord>) -> Vec<Chunk> {
        segment_lines(&HeaderClassifier::default(), lines)
    }

    #[test]
    fn page_change_alone_cuts_a_chunk() {
        let chunks = segment(vec![line(0, 0, "a"), line(0, 1, "b"), line(1, 0, "c")]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a b");
        assert_eq!(chunks[0].page, 0);
        assert_eq!(chunks[1].text, "c");
        assert_eq!(chunks[1].page, 1);
        assert_eq!(chunks[0].header, "");
        assert_eq!(chunks[1].header, "");
    }

    #[test]
    fn header_line_labels_the_chunk() {
        let header = line(0, 0, "Certified Values");
        let body = line(0, 1, "10.5 mg");
        let chunks = segment(vec![header.clone(), body.clone()]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header, "Certified Values");
        assert_eq!(chunks[0].text, "10.5 mg");
        assert_eq!(chunks[0].bbox, header.bbox.union(&body.bbox));
    }

    #[test]
    fn boundary_marker_closes_chunk_and_clears_header() {
        let chunks = segment(vec![
            line(0, 0, "Certified Values"),
            line(0, 1, "10.5 mg"),
            line(0, 2, "Page 2 of 5"),
            line(0, 3, "continued results 4.2"),
        ]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].header, "Certified Values");
        assert_eq!(chunks[0].text, "10.5 mg");
        assert_eq!(chunks[1].header, "");
        assert_eq!(chunks[1].text, "continued results 4.2");
        assert!(!chunks.iter().any(|c| c.text.contains("Page 2 of 5")));
    }

    #[test]
    fn boundary_without_open_chunk_emits_nothing() {
        let chunks = segment(vec![line(0, 0, "CERTIFICATE BAM-S030"), line(0, 1, "Page 1 of 2")]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn first_body_line_has_empty_header() {
        let chunks = segment(vec![line(0, 0, "issued by the federal institute"), line(0, 1, "Storage")]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].header, "");
        assert_eq!(chunks[1].header, "Storage");
        assert_eq!(chunks[1].text, "Storage");
    }

    #[test]
    fn header_carries_across_page_change() {
        let chunks = segment(vec![
            line(0, 0, "Informative Value"),
            line(0, 1, "density 1.2 g/cm3"),
            line(1, 0, "melting point 327 C"),
        ]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].header, "Informative Value");
        assert_eq!(chunks[1].page, 1);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let chunks = segment(vec![line(0, 0, "  "), line(0, 1, "lot 42"), line(0, 2, "")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "lot 42");
    }

    #[test]
    fn indices_follow_closure_order() {
        let chunks = segment(vec![
            line(0, 0, "intro text here."),
            line(0, 1, "Material Description"),
            line(0, 2, "steel chips, 50 g"),
            line(0, 3, "Certified Values"),
            line(0, 4, "Cr 18.2 %"),
            line(1, 0, "Ni 8.1 %"),
        ]);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let lines = vec![
            line(0, 0, "Material Description"),
            line(0, 1, "steel chips, 50 g"),
            line(0, 2, "Page 1 of 2"),
            line(1, 0, "Certified Values"),
            line(1, 1, "Cr 18.2 %"),
        ];
        assert_eq!(segment(lines.clone()), segment(lines));
    }

    #[test]
    fn columns_stay_index_aligned() {
        let chunks = segment(vec![
            line(0, 0, "Material Description"),
            line(0, 1, "steel chips, 50 g"),
            line(1, 0, "Certified Values"),
            line(1, 1, "Cr 18.2 %"),
        ]);
        let columns: ChunkColumns = chunks.iter().collect();

        assert_eq!(columns.len(), chunks.len());
        assert_eq!(columns.headers.len(), columns.chunk_text.len());
        assert_eq!(columns.bboxes.len(), columns.pages.len());
        assert_eq!(columns.pages, vec![0, 1]);
    }

    #[test]
    fn lazy_iteration_yields_chunks_before_input_ends() {
        let classifier = HeaderClassifier::default();
        let lines = vec![line(0, 0, "a"), line(1, 0, "b"), line(2, 0, "c")];
        let mut seg = Segmenter::new(&classifier, lines.into_iter());

        assert_eq!(seg.next().map(|c| c.text), Some("a".to_string()));
        assert_eq!(seg.next().map(|c| c.text), Some("b".to_string()));
        assert_eq!(seg.next().map(|c| c.text), Some("c".to_string()));
        assert_eq!(seg.next(), None);
        assert_eq!(seg.next(), None);
    }
}
