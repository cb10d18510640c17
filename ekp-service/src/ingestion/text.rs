//! Plain text extraction.

use super::{ContentExtractor, FileType};
use crate::error::ExtractionError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Passes UTF-8 text through, minus a leading byte order mark
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn file_type(&self) -> FileType {
        FileType::Txt
    }

    fn extract(&self, data: &[u8]) -> Result<String, ExtractionError> {
        decode_utf8(data, FileType::Txt)
    }
}

/// Strict UTF-8 decode shared by the text based formats
pub(super) fn decode_utf8(data: &[u8], file_type: FileType) -> Result<String, ExtractionError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    std::str::from_utf8(data)
        .map(str::to_string)
        .map_err(|e| ExtractionError::Corrupt {
            file_type: file_type.to_string(),
            message: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
        })
}
