use lopdf::Document;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Reads a nutrition plan PDF and returns its text, pages joined by newlines.
pub fn extract_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(PipelineError::input(format!("{} is not a .pdf file", path.display())));
    }
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::input(format!("cannot read {}: {e}", path.display())))?;
    extract_text_from_bytes(&bytes)
}

pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(PipelineError::input("file is not a PDF document"));
    }

    let doc = Document::load_mem(bytes).map_err(|e| PipelineError::input(format!("unreadable PDF: {e}")))?;
    if doc.is_encrypted() {
        return Err(PipelineError::input("PDF is encrypted"));
    }

    let pages = doc.get_pages();
    let mut text = String::new();
    for page_number in pages.keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => {
                debug!(page = page_number, chars = page_text.len(), "page extracted");
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(page_text.trim_end());
            }
            Err(e) => warn!(page = page_number, error = %e, "skipping page without extractable text"),
        }
    }

    if text.trim().is_empty() {
        return Err(PipelineError::input("no text could be extracted from the PDF"));
    }
    info!(pages = pages.len(), chars = text.len(), "plan text extracted");
    Ok(text)
}
