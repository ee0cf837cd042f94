// Configuration for chonker-evidence
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::{ChonkerError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "chonker.toml";

pub const DEFAULT_HEADER_TEXTS: [&str; 5] = [
    "Material Description",
    "Certified Values",
    "Informative Value",
    "Handling and Safety Instructions",
    "Means of Accepted Data Sets",
];

pub const DEFAULT_HIGHLIGHT_COLOR: [f32; 3] = [1.0, 0.85, 0.2];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub storage_root: PathBuf,
    /// Overrides `<storage_root>/original_pdfs`.
    pub originals_dir: Option<PathBuf>,
    /// Overrides `<storage_root>/annotated_pdfs`.
    pub annotated_dir: Option<PathBuf>,
    /// Overrides `<storage_root>/chunks.sqlite`.
    pub db_path: Option<PathBuf>,
    pub pdfium_path: PathBuf,
    pub extraction: ExtractionConfig,
    pub header_texts: Vec<String>,
    pub highlight: HighlightConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub render_dpi: f32,
    /// Tokens at or below this confidence (0-100) are left out of line text.
    pub min_confidence: f32,
    pub tesseract_binary: String,
    pub ocr_language: String,
    pub denoise_strength: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub color: [f32; 3],
    pub opacity: f32,
    pub url_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("storage"),
            originals_dir: None,
            annotated_dir: None,
            db_path: None,
            pdfium_path: PathBuf::from("./lib"),
            extraction: ExtractionConfig::default(),
            header_texts: DEFAULT_HEADER_TEXTS.iter().map(|s| s.to_string()).collect(),
            highlight: HighlightConfig::default(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            render_dpi: 600.0,
            min_confidence: 30.0,
            tesseract_binary: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            denoise_strength: 5.0,
        }
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            color: DEFAULT_HIGHLIGHT_COLOR,
            opacity: 0.25,
            url_prefix: "/pdfs/annotated".to_string(),
        }
    }
}

impl Settings {
    /// Load from `path`, or `chonker.toml` if present, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading settings");
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ChonkerError::Config(e.to_string()))
    }

    /// Same storage layout rooted somewhere else; handy for tests.
    pub fn with_storage_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: root.into(),
            ..Self::default()
        }
    }

    fn apply_env(&mut self) {
        if let Ok(root) = env::var("CHONKER_STORAGE_ROOT") {
            self.storage_root = root.into();
        }
        if let Ok(db) = env::var("CHONKER_DB_PATH") {
            self.db_path = Some(db.into());
        }
        if let Ok(lib) = env::var("CHONKER_PDFIUM_PATH") {
            self.pdfium_path = lib.into();
        }
        if let Ok(bin) = env::var("CHONKER_TESSERACT") {
            self.extraction.tesseract_binary = bin;
        }
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.originals_dir
            .clone()
            .unwrap_or_else(|| self.storage_root.join("original_pdfs"))
    }

    pub fn annotated_dir(&self) -> PathBuf {
        self.annotated_dir
            .clone()
            .unwrap_or_else(|| self.storage_root.join("annotated_pdfs"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.storage_root.join("chunks.sqlite"))
    }

    /// Create the originals and annotated-output directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.originals_dir())?;
        fs::create_dir_all(self.annotated_dir())?;
        if let Some(parent) = self.db_path().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
