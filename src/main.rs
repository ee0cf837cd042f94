// CHONKER EVIDENCE - ingest certificate PDFs, reconstruct highlighted evidence
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chonker_evidence::chunking::{segment_lines, ChunkColumns, HeaderClassifier};
use chonker_evidence::highlight::{HighlightFailure, HighlightRequest, Highlighter};
use chonker_evidence::ingest::Ingestor;
use chonker_evidence::pdf_extraction::PageTextExtractor;
use chonker_evidence::storage::SqliteChunkStore;
use chonker_evidence::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Settings file (defaults to ./chonker.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, segment and index a PDF
    Ingest {
        pdf: PathBuf,
        /// Document name to index under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Also write the extracted text here
        #[arg(long)]
        text_out: Option<PathBuf>,
    },
    /// Print the chunks a PDF would produce, without storing anything
    Chunks {
        /// PDF path, or `-` to read the document from stdin
        pdf: PathBuf,
    },
    /// Annotate the stored original with the given chunks' regions
    Highlight {
        doc: String,
        #[arg(required = true)]
        chunk_ids: Vec<u32>,
        /// Highlight color as r,g,b in [0, 1]
        #[arg(long, value_delimiter = ',')]
        color: Option<Vec<f32>>,
        /// Write the annotated PDF bytes here instead of printing the JSON response
        #[arg(long)]
        raw: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let settings = Settings::load(args.config.as_deref()).context("loading settings")?;

    match args.command {
        Command::Ingest { pdf, name, text_out } => {
            settings.ensure_dirs().context("creating storage directories")?;
            let store = SqliteChunkStore::open(&settings.db_path())
                .with_context(|| format!("opening {}", settings.db_path().display()))?;
            let extractor = PageTextExtractor::from_settings(&settings);
            let report = Ingestor::new(&store, &settings)
                .ingest_file(&pdf, name.as_deref(), &extractor, text_out.as_deref())
                .with_context(|| format!("ingesting {}", pdf.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Chunks { pdf } => {
            let extractor = PageTextExtractor::from_settings(&settings);
            let extraction = if pdf.as_os_str() == "-" {
                let mut bytes = Vec::new();
                io::stdin().read_to_end(&mut bytes).context("reading pdf from stdin")?;
                extractor.extract_bytes(&bytes, None).context("extracting pdf from stdin")?
            } else {
                extractor
                    .extract_file(&pdf, None)
                    .with_context(|| format!("extracting {}", pdf.display()))?
            };
            let classifier = HeaderClassifier::new(settings.header_texts.iter());
            let chunks = segment_lines(&classifier, extraction.lines);
            let columns: ChunkColumns = chunks.iter().collect();
            info!(chunks = columns.len(), "segmented");
            println!("{}", serde_json::to_string_pretty(&columns)?);
        }
        Command::Highlight { doc, chunk_ids, color, raw } => {
            let store = SqliteChunkStore::open(&settings.db_path())
                .with_context(|| format!("opening {}", settings.db_path().display()))?;
            let highlighter = Highlighter::new(&store, &settings);
            let mut request = HighlightRequest::new(doc, chunk_ids);
            request.color = color;

            let response = match highlighter.generate_highlight(&request) {
                Ok(response) => response,
                Err(e) => {
                    let failure = HighlightFailure::for_request(&e, &request.chunk_ids);
                    println!("{}", serde_json::to_string_pretty(&failure)?);
                    return Ok(ExitCode::FAILURE);
                }
            };

            match raw {
                // raw bytes replace the metadata body
                Some(out) => {
                    let bytes = highlighter.read_artifact(&response)?;
                    fs::write(&out, bytes).with_context(|| format!("writing {}", out.display()))?;
                    info!(path = %out.display(), cached = response.cached, "annotated pdf written");
                }
                None => println!("{}", serde_json::to_string_pretty(&response)?),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
