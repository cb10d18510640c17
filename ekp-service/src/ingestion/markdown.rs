//! Markdown document extraction.

use super::text::decode_utf8;
use super::{ContentExtractor, FileType, Section};
use crate::error::ExtractionError;

/// Extracts markdown as sectioned plain text, headings kept as section titles
pub struct MarkdownExtractor;

impl ContentExtractor for MarkdownExtractor {
    fn file_type(&self) -> FileType {
        FileType::Md
    }

    fn extract(&self, data: &[u8]) -> Result<String, ExtractionError> {
        let content = decode_utf8(data, FileType::Md)?;
        Ok(render_sections(&parse_markdown_sections(&content)))
    }
}

/// Split markdown at ATX headings. Text before the first heading becomes an
/// untitled section; `#` lines inside code fences stay in the body.
pub fn parse_markdown_sections(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut fenced = false;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            fenced = !fenced;
        }

        match heading_text(line).filter(|_| !fenced) {
            Some(heading) => {
                flush_section(&mut sections, title.take(), &body);
                body.clear();
                title = Some(heading.to_string());
            }
            None => body.push(line),
        }
    }
    flush_section(&mut sections, title, &body);

    sections
}

fn flush_section(sections: &mut Vec<Section>, title: Option<String>, body: &[&str]) {
    let content = body.join("\n").trim().to_string();
    if title.is_some() || !content.is_empty() {
        sections.push(Section { title, content });
    }
}

/// Text of an ATX heading: one to six `#` followed by a space or end of line
fn heading_text(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    let rest = &line[hashes..];
    let is_heading =
        (1..=6).contains(&hashes) && rest.chars().next().is_none_or(char::is_whitespace);
    is_heading.then(|| rest.trim())
}

/// Flatten sections back to text, one blank line between blocks
fn render_sections(sections: &[Section]) -> String {
    let mut blocks = Vec::new();
    for section in sections {
        if let Some(title) = section.title.as_deref().filter(|t| !t.is_empty()) {
            blocks.push(title);
        }
        if !section.content.is_empty() {
            blocks.push(section.content.as_str());
        }
    }
    blocks.join("\n\n")
}
