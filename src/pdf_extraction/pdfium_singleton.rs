// Pdfium helper - fresh binding per document, no shared instance
use pdfium_render::prelude::*;
use std::path::Path;

use crate::types::{ChonkerError, Result};

/// Bind pdfium from `lib_dir`, falling back to the system library, and run `f`.
///
/// Bindings are not shared across calls, so each document gets its own
/// instance and nothing pdfium-owned outlives the closure.
pub fn with_pdfium<F, R>(lib_dir: &Path, f: F) -> Result<R>
where
    F: FnOnce(&Pdfium) -> Result<R>,
{
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(lib_dir))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ChonkerError::Extraction(format!("could not bind pdfium: {e}")))?;
    let pdfium = Pdfium::new(bindings);
    f(&pdfium)
}
