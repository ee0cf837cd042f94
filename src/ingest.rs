// Ingestion: persist the original, extract, segment, store chunk metadata
use serde::Serialize;
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::chunking::{segment_lines, HeaderClassifier};
use crate::config::Settings;
use crate::highlight::validate_document_name;
use crate::pdf_extraction::{PageTextExtractor, TextRecognizer};
use crate::storage::{ChunkStore, StoredChunk};
use crate::types::{ChonkerError, LineRecord, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub document_name: String,
    pub text_length: usize,
    pub line_count: usize,
    pub chunk_count: usize,
    /// Already indexed; nothing was re-extracted or re-stored.
    pub skipped: bool,
}

pub struct Ingestor<'a, S: ?Sized> {
    store: &'a S,
    settings: &'a Settings,
    classifier: HeaderClassifier,
}

impl<'a, S: ChunkStore + ?Sized> Ingestor<'a, S> {
    pub fn new(store: &'a S, settings: &'a Settings) -> Self {
        Self {
            store,
            settings,
            classifier: HeaderClassifier::new(settings.header_texts.iter()),
        }
    }

    /// Full path: extract `path`, then store its chunks under `name`
    /// (the file name when `None`).
    pub fn ingest_file<R: TextRecognizer>(
        &self,
        path: &Path,
        name: Option<&str>,
        extractor: &PageTextExtractor<R>,
        text_out: Option<&Path>,
    ) -> Result<IngestReport> {
        let document_name = match name {
            Some(n) => n.to_string(),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| ChonkerError::InvalidInput(format!("no file name in {}", path.display())))?,
        };
        check_pdf_name(&document_name)?;

        if self.store.document_exists(&document_name)? {
            return Ok(skipped(document_name));
        }

        // an unreadable upload must not become the stored original
        let extraction = extractor.extract_file(path, text_out)?;
        self.persist_original(&document_name, path)?;

        let text_length = extraction.text.len();
        let mut report = self.store_lines(&document_name, extraction.lines)?;
        report.text_length = text_length;
        Ok(report)
    }

    /// Store already-extracted lines for `document_name`, keeping a copy of `original`.
    pub fn ingest_lines(
        &self,
        document_name: &str,
        original: &Path,
        lines: Vec<LineRecord>,
    ) -> Result<IngestReport> {
        check_pdf_name(document_name)?;

        if self.store.document_exists(document_name)? {
            return Ok(skipped(document_name.to_string()));
        }
        self.persist_original(document_name, original)?;

        let text_length = lines.iter().map(|l| l.text.len() + 1).sum();
        let mut report = self.store_lines(document_name, lines)?;
        report.text_length = text_length;
        Ok(report)
    }

    fn store_lines(&self, document_name: &str, lines: Vec<LineRecord>) -> Result<IngestReport> {
        let line_count = lines.len();
        let chunks = segment_lines(&self.classifier, lines);
        if chunks.is_empty() {
            warn!(document = %document_name, "no chunks produced");
        }

        let records: Vec<StoredChunk> = chunks
            .iter()
            .map(|chunk| StoredChunk::from_chunk(document_name, chunk))
            .collect();
        self.store.upsert_chunks(&records)?;

        info!(document = %document_name, lines = line_count, chunks = records.len(), "document indexed");
        Ok(IngestReport {
            document_name: document_name.to_string(),
            text_length: 0,
            line_count,
            chunk_count: records.len(),
            skipped: false,
        })
    }

    /// Copy the source into the originals directory, replacing any leftover
    /// from an earlier ingest that never got indexed.
    fn persist_original(&self, document_name: &str, source: &Path) -> Result<()> {
        let dir = self.settings.originals_dir();
        let target = dir.join(document_name);
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        let mut input = fs::File::open(source)?;
        std::io::copy(&mut input, temp.as_file_mut())?;
        temp.persist(&target).map_err(|e| ChonkerError::Io(e.error))?;
        info!(path = %target.display(), "original stored");
        Ok(())
    }
}

fn skipped(document_name: String) -> IngestReport {
    info!(document = %document_name, "already indexed, skipping");
    IngestReport {
        document_name,
        text_length: 0,
        line_count: 0,
        chunk_count: 0,
        skipped: true,
    }
}

fn check_pdf_name(document_name: &str) -> Result<()> {
    validate_document_name(document_name)?;
    let is_pdf = Path::new(document_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(ChonkerError::InvalidInput(format!("only PDF documents are supported: {document_name}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::pdf_extraction::RecognizedToken;
    use crate::storage::SqliteChunkStore;
    use crate::types::{BBox, LineSource};
    use image::GrayImage;

    struct NoText;

    impl TextRecognizer for NoText {
        fn recognize(&self, _image: &GrayImage) -> Result<Vec<RecognizedToken>> {
            Ok(Vec::new())
        }
    }

    fn line(text: &str, y: f32, page: u32) -> LineRecord {
        LineRecord::new(text, BBox::new(72.0, y, 300.0, y + 12.0), page, LineSource::Native)
    }

    fn fixture() -> (tempfile::TempDir, Settings, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_storage_root(dir.path().join("storage"));
        let source = dir.path().join("upload.pdf");
        fs::write(&source, b"%PDF-1.5\n%%EOF\n").unwrap();
        (dir, settings, source)
    }

    #[test]
    fn lines_become_stored_chunks() {
        let (_dir, settings, source) = fixture();
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, &settings);

        let report = ingestor
            .ingest_lines(
                "BAM-A001.pdf",
                &source,
                vec![
                    line("Certified Values", 100.0, 0),
                    line("10.5 mg", 114.0, 0),
                    line("Storage", 140.0, 0),
                    line("keep at 4 °C", 154.0, 0),
                ],
            )
            .unwrap();

        assert_eq!(report.chunk_count, 2);
        assert!(!report.skipped);
        assert!(settings.originals_dir().join("BAM-A001.pdf").is_file());

        let stored = store.list_chunks("BAM-A001.pdf").unwrap();
        assert_eq!(stored[0].header, "Certified Values");
        assert_eq!(stored[0].text, "10.5 mg");
        assert_eq!(stored[1].header, "Storage");
    }

    #[test]
    fn second_ingest_is_skipped() {
        let (_dir, settings, source) = fixture();
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, &settings);

        ingestor.ingest_lines("a.pdf", &source, vec![line("Storage", 10.0, 0)]).unwrap();
        let again = ingestor.ingest_lines("a.pdf", &source, vec![line("Other", 10.0, 0)]).unwrap();

        assert!(again.skipped);
        assert_eq!(again.line_count, 0);
        assert_eq!(again.chunk_count, 0);
        assert_eq!(store.list_chunks("a.pdf").unwrap()[0].header, "Storage");
    }

    #[test]
    fn non_pdf_names_are_rejected() {
        let (_dir, settings, source) = fixture();
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let err = Ingestor::new(&store, &settings)
            .ingest_lines("notes.txt", &source, Vec::new())
            .unwrap_err();
        assert!(matches!(err, ChonkerError::InvalidInput(_)));
    }

    #[test]
    fn unreadable_upload_leaves_no_original_behind() {
        let (dir, settings, _) = fixture();
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, &settings);
        let extractor = PageTextExtractor::new(NoText, dir.path().join("no-pdfium"), ExtractionConfig::default());

        let broken = dir.path().join("broken.pdf");
        fs::write(&broken, b"not a pdf at all").unwrap();
        let err = ingestor
            .ingest_file(&broken, Some("cert.pdf"), &extractor, None)
            .unwrap_err();
        assert!(matches!(err, ChonkerError::Extraction(_)));
        assert!(!settings.originals_dir().join("cert.pdf").exists());
        assert!(!store.document_exists("cert.pdf").unwrap());

        // a corrected upload under the same name is what gets kept
        let fixed = dir.path().join("fixed.pdf");
        fs::write(&fixed, b"%PDF-1.5 corrected\n%%EOF\n").unwrap();
        ingestor
            .ingest_lines("cert.pdf", &fixed, vec![line("Storage", 10.0, 0)])
            .unwrap();
        assert_eq!(
            fs::read(settings.originals_dir().join("cert.pdf")).unwrap(),
            b"%PDF-1.5 corrected\n%%EOF\n"
        );
    }

    #[test]
    fn leftover_original_of_unindexed_document_is_replaced() {
        let (_dir, settings, source) = fixture();
        fs::create_dir_all(settings.originals_dir()).unwrap();
        fs::write(settings.originals_dir().join("a.pdf"), b"stale").unwrap();

        let store = SqliteChunkStore::open_in_memory().unwrap();
        Ingestor::new(&store, &settings)
            .ingest_lines("a.pdf", &source, vec![line("Storage", 10.0, 0)])
            .unwrap();

        assert_eq!(fs::read(settings.originals_dir().join("a.pdf")).unwrap(), fs::read(&source).unwrap());
    }
}
