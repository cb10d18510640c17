//! Word document extraction.

use docx_rs::{
    DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRow, TableRowChild,
};

use super::{ContentExtractor, FileType};
use crate::error::ExtractionError;

/// Extracts paragraph text, and table cell text row by row
pub struct DocxExtractor;

impl ContentExtractor for DocxExtractor {
    fn file_type(&self) -> FileType {
        FileType::Docx
    }

    fn extract(&self, data: &[u8]) -> Result<String, ExtractionError> {
        let doc = docx_rs::read_docx(data).map_err(|e| ExtractionError::Corrupt {
            file_type: FileType::Docx.to_string(),
            message: e.to_string(),
        })?;

        let mut lines = Vec::new();
        for child in &doc.document.children {
            match child {
                DocumentChild::Paragraph(p) => lines.push(paragraph_text(&p.children)),
                DocumentChild::Table(table) => {
                    for row_child in &table.rows {
                        if let TableChild::TableRow(row) = row_child {
                            lines.push(row_text(row));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(lines.join("\n"))
    }
}

fn row_text(row: &TableRow) -> String {
    let mut cells = Vec::new();
    for cell_child in &row.cells {
        if let TableRowChild::TableCell(cell) = cell_child {
            let paragraphs: Vec<String> = cell
                .children
                .iter()
                .filter_map(|c| match c {
                    TableCellContent::Paragraph(p) => Some(paragraph_text(&p.children)),
                    _ => None,
                })
                .collect();
            cells.push(paragraphs.join(" "));
        }
    }
    cells.join("\t")
}

fn paragraph_text(children: &[ParagraphChild]) -> String {
    let mut text = String::new();
    for child in children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}
