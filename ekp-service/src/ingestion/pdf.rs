//! PDF text extraction through PDFium.

use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::{ContentExtractor, FileType};
use crate::error::ExtractionError;

/// Bytes searched for the `%PDF-` signature
const HEADER_SEARCH_WINDOW: usize = 1024;

pub struct PdfExtractor;

impl ContentExtractor for PdfExtractor {
    fn file_type(&self) -> FileType {
        FileType::Pdf
    }

    fn extract(&self, data: &[u8]) -> Result<String, ExtractionError> {
        // Reject non-PDF bytes before touching the native library
        if !has_pdf_header(data) {
            return Err(corrupt("missing %PDF- header"));
        }

        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| corrupt(format!("failed to load PDF: {:?}", e)))?;

        let page_count = document.pages().len();
        let mut pages = Vec::new();

        for (page_index, page) in document.pages().iter().enumerate() {
            let page_num = page_index + 1;
            let text = page.text().map_err(|e| {
                warn!(page = page_num, error = ?e, "Failed to get text object for page");
                corrupt(format!("failed to extract text from page {}: {:?}", page_num, e))
            })?;

            let page_text = text.all();
            let page_text = page_text.trim();
            if !page_text.is_empty() {
                pages.push(page_text.to_string());
            }
        }

        debug!(
            pages = page_count,
            pages_with_text = pages.len(),
            "PDF text extracted"
        );

        Ok(pages.join("\n\n"))
    }
}

fn has_pdf_header(data: &[u8]) -> bool {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn corrupt(message: impl Into<String>) -> ExtractionError {
    ExtractionError::Corrupt {
        file_type: FileType::Pdf.to_string(),
        message: message.into(),
    }
}

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> Result<Pdfium, ExtractionError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ExtractionError::EngineUnavailable {
            engine: "pdfium".to_string(),
            message: format!("failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}
