//! Deterministic structural extraction of a template's table grid.
//!
//! Walks `word/document.xml` as an event stream and emits one entry per
//! top-level table cell, keyed `table_{i}_row_{j}_col_{k}` in traversal
//! order. Cell text is the cell's direct paragraphs joined with `\n`, then
//! trimmed; tabs and line breaks inside a run become `\t` / `\n`. Nested
//! tables are not enumerated and do not leak text into the enclosing cell.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{DocxError, DocxPackage};
use crate::types::{CellId, TemplateStructure};

/// Extract the full cell structure of a `.docx` template.
///
/// A template with zero tables yields an empty structure, not an error.
pub fn extract_structure(path: &Path) -> Result<TemplateStructure, DocxError> {
    let package = DocxPackage::open(path)?;
    let structure = structure_from_xml(&package.document_xml)?;
    tracing::info!(
        template = %path.display(),
        cells = structure.len(),
        "template structure extracted"
    );
    Ok(structure)
}

/// Extraction over raw `document.xml` bytes.
pub fn structure_from_xml(xml: &[u8]) -> Result<TemplateStructure, DocxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut structure = TemplateStructure::new();

    // Counters only advance for depth-1 tables; nested tables are opaque.
    let mut tbl_depth = 0usize;
    let mut next_table = 0usize;
    let mut table = 0usize;
    let mut row_counter = 0usize;
    let mut row = 0usize;
    let mut cell_counter = 0usize;
    let mut col = 0usize;

    let mut in_cell = false;
    let mut in_para = false;
    let mut in_text = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:tbl" => {
                    tbl_depth += 1;
                    if tbl_depth == 1 {
                        table = next_table;
                        next_table += 1;
                        row_counter = 0;
                    }
                }
                b"w:tr" if tbl_depth == 1 => {
                    row = row_counter;
                    row_counter += 1;
                    cell_counter = 0;
                }
                b"w:tc" if tbl_depth == 1 => {
                    col = cell_counter;
                    cell_counter += 1;
                    in_cell = true;
                    paragraphs.clear();
                }
                b"w:p" if in_cell && tbl_depth == 1 => {
                    in_para = true;
                    current.clear();
                }
                b"w:t" if in_para => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                // Self-closing paragraph: an empty line in the cell.
                b"w:p" if in_cell && tbl_depth == 1 => paragraphs.push(String::new()),
                b"w:br" | b"w:cr" if in_para => current.push('\n'),
                b"w:tab" if in_para => current.push('\t'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| DocxError::Xml(err.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:tbl" => tbl_depth = tbl_depth.saturating_sub(1),
                b"w:t" => in_text = false,
                b"w:p" if in_para => {
                    paragraphs.push(std::mem::take(&mut current));
                    in_para = false;
                }
                b"w:tc" if in_cell && tbl_depth == 1 => {
                    let text = paragraphs.join("\n").trim().to_string();
                    structure.insert(CellId::new(table, row, col), text);
                    in_cell = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocxError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(structure)
}
