// Page text extraction: native text layer first, OCR fallback per page
pub mod native;
pub mod ocr_engine;
pub mod pdfium_singleton;
pub mod preprocess;

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{ExtractionConfig, Settings};
use crate::types::{ChonkerError, LineRecord, Result};

pub use native::{assemble_native_lines, NativeSpan};
pub use ocr_engine::{assemble_recognized_lines, parse_tsv, RecognizedToken, TesseractCli, TextRecognizer};
pub use pdfium_singleton::with_pdfium;

const POINTS_PER_INCH: f32 = 72.0;

/// What one page produced, tagged by the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum PageExtraction {
    NativeText {
        lines: Vec<LineRecord>,
    },
    Recognized {
        lines: Vec<LineRecord>,
        scale_x: f32,
        scale_y: f32,
    },
}

impl PageExtraction {
    /// A page that yielded nothing under either path.
    pub fn degraded() -> Self {
        PageExtraction::Recognized {
            lines: Vec::new(),
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn lines(&self) -> &[LineRecord] {
        match self {
            PageExtraction::NativeText { lines } | PageExtraction::Recognized { lines, .. } => lines,
        }
    }

    pub fn into_lines(self) -> Vec<LineRecord> {
        match self {
            PageExtraction::NativeText { lines } | PageExtraction::Recognized { lines, .. } => lines,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, PageExtraction::Recognized { .. })
    }

    /// Page text: one line per record, newline terminated.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for line in self.lines() {
            text.push_str(&line.text);
            text.push('\n');
        }
        text
    }
}

/// Native path: group text-layer spans into lines.
pub fn native_page(page: u32, spans: &[NativeSpan]) -> PageExtraction {
    PageExtraction::NativeText {
        lines: assemble_native_lines(page, spans),
    }
}

/// Recognition path: clean the raster, recognize, scale back to page space.
pub fn recognize_page<R: TextRecognizer + ?Sized>(
    page: u32,
    image: DynamicImage,
    page_size: (f32, f32),
    recognizer: &R,
    config: &ExtractionConfig,
) -> Result<PageExtraction> {
    let mut rgb = image.to_rgb8();
    if page == 0 {
        preprocess::remove_decorative_region(&mut rgb);
    }
    let binary = preprocess::prepare_for_recognition(&rgb, config.denoise_strength);
    let (image_w, image_h) = binary.dimensions();
    if image_w == 0 || image_h == 0 {
        return Err(ChonkerError::Recognition(format!("page {page} rendered to an empty image")));
    }

    let scale_x = page_size.0 / image_w as f32;
    let scale_y = page_size.1 / image_h as f32;
    debug!(page, image_w, image_h, scale_x, scale_y, "recognition scale factors");

    let tokens = recognizer.recognize(&binary)?;
    let lines = assemble_recognized_lines(page, &tokens, scale_x, scale_y, config.min_confidence);
    debug!(page, tokens = tokens.len(), lines = lines.len(), "recognized page");

    Ok(PageExtraction::Recognized { lines, scale_x, scale_y })
}

/// Document-wide result: full text plus ordered line records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentExtraction {
    pub text: String,
    pub lines: Vec<LineRecord>,
    pub page_count: usize,
    pub recognized_pages: Vec<u32>,
}

/// Gathers per-page results and releases them in page order,
/// whatever order the pages finished in.
#[derive(Debug, Default)]
pub struct LineBoxCollector {
    pages: BTreeMap<u32, PageExtraction>,
}

impl LineBoxCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: u32, extraction: PageExtraction) {
        if self.pages.insert(page, extraction).is_some() {
            warn!(page, "page extracted twice, keeping the latest result");
        }
    }

    pub fn finish(self) -> DocumentExtraction {
        let mut doc = DocumentExtraction {
            page_count: self.pages.len(),
            ..DocumentExtraction::default()
        };
        for (page, extraction) in self.pages {
            doc.text.push_str(&extraction.text());
            doc.text.push('\n');
            if extraction.is_recognized() {
                doc.recognized_pages.push(page);
            }
            doc.lines.extend(extraction.into_lines());
        }
        doc
    }
}

/// Write extracted text with every line trimmed.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    let cleaned: String = text.lines().map(|l| format!("{}\n", l.trim())).collect();
    fs::write(path, cleaned)?;
    Ok(())
}

pub struct PageTextExtractor<R> {
    recognizer: R,
    pdfium_path: PathBuf,
    config: ExtractionConfig,
}

impl PageTextExtractor<TesseractCli> {
    pub fn from_settings(settings: &Settings) -> Self {
        let recognizer = TesseractCli::new(
            settings.extraction.tesseract_binary.clone(),
            settings.extraction.ocr_language.clone(),
        );
        Self::new(recognizer, settings.pdfium_path.clone(), settings.extraction.clone())
    }
}

impl<R: TextRecognizer> PageTextExtractor<R> {
    pub fn new(recognizer: R, pdfium_path: PathBuf, config: ExtractionConfig) -> Self {
        Self {
            recognizer,
            pdfium_path,
            config,
        }
    }

    /// Extract every page of the document at `path`.
    ///
    /// An unopenable document fails the whole call; a page that yields
    /// nothing contributes no lines.
    pub fn extract_file(&self, path: &Path, text_out: Option<&Path>) -> Result<DocumentExtraction> {
        let doc = with_pdfium(&self.pdfium_path, |pdfium| {
            let document = pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| ChonkerError::Extraction(format!("{}: {e}", path.display())))?;
            Ok(self.extract_document(&document))
        })?;
        self.finish(doc, text_out)
    }

    /// Same as [`extract_file`](Self::extract_file) for an in-memory document.
    pub fn extract_bytes(&self, bytes: &[u8], text_out: Option<&Path>) -> Result<DocumentExtraction> {
        let doc = with_pdfium(&self.pdfium_path, |pdfium| {
            let document = pdfium
                .load_pdf_from_byte_slice(bytes, None)
                .map_err(|e| ChonkerError::Extraction(e.to_string()))?;
            Ok(self.extract_document(&document))
        })?;
        self.finish(doc, text_out)
    }

    fn finish(&self, doc: DocumentExtraction, text_out: Option<&Path>) -> Result<DocumentExtraction> {
        if let Some(out) = text_out {
            write_text(out, &doc.text)?;
        }
        info!(
            pages = doc.page_count,
            lines = doc.lines.len(),
            recognized = doc.recognized_pages.len(),
            "document extracted"
        );
        Ok(doc)
    }

    fn extract_document(&self, document: &PdfDocument) -> DocumentExtraction {
        let mut collector = LineBoxCollector::new();
        for (index, page) in document.pages().iter().enumerate() {
            let index = index as u32;
            collector.insert(index, self.extract_page(index, &page));
        }
        collector.finish()
    }

    fn extract_page(&self, index: u32, page: &PdfPage) -> PageExtraction {
        let page_size = (page.width().value, page.height().value);

        match page.text() {
            Ok(text) if !text.all().trim().is_empty() => {
                let spans: Vec<NativeSpan> = text
                    .segments()
                    .iter()
                    .map(|segment| {
                        let b = segment.bounds();
                        NativeSpan::from_pdf_rect(
                            segment.text(),
                            b.left().value,
                            b.bottom().value,
                            b.right().value,
                            b.top().value,
                            page_size.1,
                        )
                    })
                    .collect();
                debug!(page = index, spans = spans.len(), "native text layer");
                return native_page(index, &spans);
            }
            Ok(_) => debug!(page = index, "no text layer, falling back to recognition"),
            Err(e) => warn!(page = index, error = %e, "text layer unreadable, falling back to recognition"),
        }

        let image = match self.render_page(page) {
            Ok(image) => image,
            Err(e) => {
                warn!(page = index, error = %e, "page render failed");
                return PageExtraction::degraded();
            }
        };
        recognize_page(index, image, page_size, &self.recognizer, &self.config).unwrap_or_else(|e| {
            warn!(page = index, error = %e, "recognition failed, page contributes no lines");
            PageExtraction::degraded()
        })
    }

    fn render_page(&self, page: &PdfPage) -> Result<DynamicImage> {
        let scale = self.config.render_dpi / POINTS_PER_INCH;
        let width_px = (page.width().value * scale).round() as i32;
        let height_px = (page.height().value * scale).round() as i32;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ChonkerError::Recognition(format!("render failed: {e}")))?;
        Ok(bitmap.as_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BBox, LineSource};
    use image::{GrayImage, Rgb, RgbImage};
    use std::cell::{Cell, RefCell};

    struct FakeRecognizer {
        tokens: Vec<RecognizedToken>,
        seen: Cell<(u32, u32)>,
    }

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedToken>> {
            self.seen.set(image.dimensions());
            Ok(self.tokens.clone())
        }
    }

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn recognize(&self, _image: &GrayImage) -> Result<Vec<RecognizedToken>> {
            Err(ChonkerError::Recognition("engine missing".into()))
        }
    }

    /// Keeps the last image handed to it.
    #[derive(Default)]
    struct CapturingRecognizer {
        image: RefCell<Option<GrayImage>>,
    }

    impl TextRecognizer for CapturingRecognizer {
        fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedToken>> {
            *self.image.borrow_mut() = Some(image.clone());
            Ok(Vec::new())
        }
    }

    fn token(text: &str, bbox: BBox, line: u32) -> RecognizedToken {
        RecognizedToken {
            text: text.into(),
            confidence: 95.0,
            bbox,
            line_key: (1, 1, line),
        }
    }

    fn blank_page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    /// Black text block on the left, blue stamp band on the right.
    fn page_with_stamp() -> DynamicImage {
        let mut img = RgbImage::from_pixel(120, 80, Rgb([255, 255, 255]));
        for y in 10..70 {
            for x in 20..40 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
            for x in 90..110 {
                img.put_pixel(x, y, Rgb([30, 60, 220]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    fn small_config() -> ExtractionConfig {
        ExtractionConfig {
            denoise_strength: 5.0,
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn recognized_page_carries_scale_factors() {
        let recognizer = FakeRecognizer {
            tokens: vec![
                token("Certified", BBox::new(10.0, 20.0, 30.0, 28.0), 1),
                token("Values", BBox::new(32.0, 20.0, 50.0, 28.0), 1),
            ],
            seen: Cell::new((0, 0)),
        };
        let page = recognize_page(1, blank_page(60, 40), (612.0, 792.0), &recognizer, &small_config()).unwrap();

        assert_eq!(recognizer.seen.get(), (60, 40));
        match &page {
            PageExtraction::Recognized { lines, scale_x, scale_y } => {
                assert!((scale_x - 10.2).abs() < 1e-4);
                assert!((scale_y - 19.8).abs() < 1e-4);
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].text, "Certified Values");
                assert_eq!(lines[0].source, LineSource::Recognized);
                assert!((lines[0].bbox.x0 - 102.0).abs() < 1e-3);
                assert!((lines[0].bbox.y1 - 28.0 * 19.8).abs() < 1e-2);
            }
            other => panic!("expected recognized page, got {other:?}"),
        }
    }

    #[test]
    fn recognition_errors_surface_to_the_caller() {
        let err = recognize_page(0, blank_page(8, 8), (100.0, 100.0), &FailingRecognizer, &small_config());
        assert!(matches!(err, Err(ChonkerError::Recognition(_))));
    }

    #[test]
    fn stamp_is_removed_on_the_first_page_only() {
        let seen_on = |page: u32| {
            let recognizer = CapturingRecognizer::default();
            recognize_page(page, page_with_stamp(), (120.0, 80.0), &recognizer, &small_config()).unwrap();
            recognizer.image.into_inner().unwrap()
        };

        let first = seen_on(0);
        let later = seen_on(1);
        assert_eq!(first.get_pixel(100, 40)[0], 255);
        assert_eq!(later.get_pixel(100, 40)[0], 0);
        // text left of the stamp survives either way
        assert_eq!(first.get_pixel(30, 40)[0], 0);
        assert_eq!(later.get_pixel(30, 40)[0], 0);
    }

    #[test]
    fn unparseable_bytes_fail_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = PageTextExtractor::new(
            CapturingRecognizer::default(),
            dir.path().join("no-pdfium"),
            small_config(),
        );
        let err = extractor.extract_bytes(b"definitely not a pdf", None).unwrap_err();
        assert!(matches!(err, ChonkerError::Extraction(_)));
        assert!(extractor.recognizer.image.borrow().is_none());
    }

    #[test]
    fn native_page_is_tagged_native() {
        let spans = vec![NativeSpan::new("Storage", BBox::new(72.0, 90.0, 120.0, 102.0))];
        let page = native_page(2, &spans);
        assert!(!page.is_recognized());
        assert_eq!(page.lines()[0].page, 2);
        assert_eq!(page.text(), "Storage\n");
    }

    #[test]
    fn collector_restores_page_order() {
        let line = |page: u32, text: &str| LineRecord::new(text, BBox::new(0.0, 0.0, 1.0, 1.0), page, LineSource::Native);
        let mut collector = LineBoxCollector::new();
        collector.insert(2, PageExtraction::NativeText { lines: vec![line(2, "c")] });
        collector.insert(0, PageExtraction::NativeText { lines: vec![line(0, "a1"), line(0, "a2")] });
        collector.insert(1, PageExtraction::degraded());

        let doc = collector.finish();
        let texts: Vec<&str> = doc.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "a2", "c"]);
        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.recognized_pages, vec![1]);
        assert_eq!(doc.text, "a1\na2\n\n\nc\n\n");
    }

    #[test]
    fn written_text_is_line_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.txt");
        write_text(&out, "  Certified Values  \n\t10.5 mg\n").unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "Certified Values\n10.5 mg\n");
    }
}
