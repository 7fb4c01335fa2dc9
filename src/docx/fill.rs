//! Deterministic fill-back of a sparse fill map onto a template.
//!
//! The filler re-walks `word/document.xml` with exactly the traversal the
//! extractor uses. Matched cells get their paragraphs replaced with the fill
//! value (cell properties and nested tables are preserved); fill-map keys
//! that match no live cell are reported, never fatal. Exhibits are injected
//! at the end of the body, before the section properties.

use std::collections::HashSet;
use std::path::Path;

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

use super::exhibits::{self, ExhibitBlock};
use super::{DocxError, DocxPackage};
use crate::types::{CellId, FillMap};

/// Completion metadata for one fill pass: "N of M fields filled".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillReport {
    /// Fill-map cells actually written into the document.
    pub filled: usize,
    /// Fill-map cells requested (the reserved attachments key excluded).
    pub requested: usize,
    /// Requested keys that matched no cell in the live document.
    pub unmatched: Vec<String>,
}

/// Apply `fill_map` to `template` and save the completed document at
/// `output`. A partially-matched fill map still produces a saved document.
pub fn fill_template(
    template: &Path,
    output: &Path,
    fill_map: &FillMap,
) -> Result<FillReport, DocxError> {
    let package = DocxPackage::open(template)?;

    let block = if fill_map.attachments().is_empty() {
        None
    } else {
        Some(exhibits::build_block(
            fill_map.attachments(),
            package.next_relationship_id(),
        ))
    };

    let (document_xml, filled_keys) =
        rewrite_document(&package.document_xml, fill_map, block.as_ref())?;

    let (rels, content_types) = match &block {
        Some(block) if !block.relationships.is_empty() => (
            Some(block.patched_rels(&package.rels_xml)),
            Some(block.patched_content_types(&package.content_types_xml)),
        ),
        _ => (None, None),
    };

    let media = block.as_ref().map(|b| b.media.as_slice()).unwrap_or(&[]);
    package.save_with(
        output,
        &document_xml,
        rels.as_deref(),
        content_types.as_deref(),
        media,
    )?;

    let unmatched: Vec<String> = fill_map
        .keys()
        .filter(|k| !filled_keys.contains(*k))
        .cloned()
        .collect();
    let report = FillReport {
        filled: filled_keys.len(),
        requested: fill_map.len(),
        unmatched,
    };

    tracing::info!(
        output = %output.display(),
        filled = report.filled,
        requested = report.requested,
        "template filled"
    );
    for key in &report.unmatched {
        tracing::warn!(key, "fill-map key matched no cell in the template");
    }

    Ok(report)
}

/// One streaming pass over the document XML: replaces matched cells and
/// injects the exhibit block. Returns the rewritten XML and the set of
/// fill-map keys that matched a live cell.
fn rewrite_document(
    xml: &[u8],
    fill_map: &FillMap,
    block: Option<&ExhibitBlock>,
) -> Result<(Vec<u8>, HashSet<String>), DocxError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    let xml_err = |e: quick_xml::Error| DocxError::Xml(e.to_string());

    let mut tbl_depth = 0usize;
    let mut next_table = 0usize;
    let mut table = 0usize;
    let mut row_counter = 0usize;
    let mut row = 0usize;
    let mut cell_counter = 0usize;

    // Body-level bookkeeping for exhibit injection.
    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    let mut body_has_content = false;
    let mut block_written = false;

    let mut filled_keys = HashSet::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
        match event {
            Event::Start(ref e) => {
                let name = e.name().as_ref().to_vec();
                depth += 1;
                match name.as_slice() {
                    b"w:body" => body_depth = Some(depth),
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
                        let col = cell_counter;
                        cell_counter += 1;
                        let key = CellId::new(table, row, col).key();
                        if let Some(value) = fill_map.get(&key) {
                            writer.write_event(event.borrow()).map_err(xml_err)?;
                            replace_cell(&mut reader, &mut writer, value)?;
                            depth -= 1; // the sub-loop consumed the cell's end tag
                            filled_keys.insert(key);
                            buf.clear();
                            continue;
                        }
                    }
                    b"w:sectPr"
                        if block.is_some()
                            && !block_written
                            && body_depth.map_or(false, |bd| depth == bd + 1) =>
                    {
                        if let Some(block) = block {
                            write_raw(&mut writer, &block.xml(body_has_content))?;
                            block_written = true;
                        }
                    }
                    _ => {}
                }
                if body_depth.map_or(false, |bd| depth == bd + 1) && name != b"w:sectPr" {
                    body_has_content = true;
                }
                writer.write_event(event).map_err(xml_err)?;
            }
            Event::Empty(ref e) => {
                if body_depth.map_or(false, |bd| depth == bd) {
                    if e.name().as_ref() == b"w:sectPr" {
                        if let Some(block) = block {
                            if !block_written {
                                write_raw(&mut writer, &block.xml(body_has_content))?;
                                block_written = true;
                            }
                        }
                    } else {
                        body_has_content = true;
                    }
                }
                writer.write_event(event).map_err(xml_err)?;
            }
            Event::End(ref e) => {
                match e.name().as_ref() {
                    b"w:tbl" => tbl_depth = tbl_depth.saturating_sub(1),
                    b"w:body" => {
                        if let Some(block) = block {
                            if !block_written {
                                write_raw(&mut writer, &block.xml(body_has_content))?;
                                block_written = true;
                            }
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
                writer.write_event(event).map_err(xml_err)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(xml_err)?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), filled_keys))
}

/// Consume the remainder of a matched `w:tc`: keep `w:tcPr` and any nested
/// table, drop the cell's paragraphs, then write the replacement value and
/// the cell's end tag.
fn replace_cell<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    value: &str,
) -> Result<(), DocxError> {
    let xml_err = |e: quick_xml::Error| DocxError::Xml(e.to_string());
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                // Cell properties and nested tables survive the rewrite.
                b"w:tcPr" | b"w:tbl" => {
                    writer.write_event(event.borrow()).map_err(xml_err)?;
                    copy_subtree(reader, writer)?;
                }
                _ => skip_subtree(reader)?,
            },
            // Self-closing empty paragraphs are old content.
            Event::Empty(ref e) if e.name().as_ref() == b"w:p" => {}
            Event::Empty(_) => writer.write_event(event).map_err(xml_err)?,
            Event::End(ref e) if e.name().as_ref() == b"w:tc" => {
                write_raw(writer, &value_paragraphs(value))?;
                writer.write_event(event.borrow()).map_err(xml_err)?;
                return Ok(());
            }
            Event::End(_) | Event::Text(_) | Event::CData(_) | Event::Comment(_) => {}
            Event::Eof => return Err(DocxError::Xml("unexpected EOF inside table cell".into())),
            other => writer.write_event(other).map_err(xml_err)?,
        }
        buf.clear();
    }
}

/// Copy events through the matching end tag of an already-written start tag.
fn copy_subtree<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), DocxError> {
    let xml_err = |e: quick_xml::Error| DocxError::Xml(e.to_string());
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(DocxError::Xml("unexpected EOF in subtree".into())),
            _ => {}
        }
        writer.write_event(event).map_err(xml_err)?;
        if depth == 0 {
            return Ok(());
        }
        buf.clear();
    }
}

/// Discard events through the matching end tag of a consumed start tag.
fn skip_subtree<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<(), DocxError> {
    let xml_err = |e: quick_xml::Error| DocxError::Xml(e.to_string());
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Err(DocxError::Xml("unexpected EOF in subtree".into())),
            _ => {}
        }
        buf.clear();
    }
}

/// Render a fill value as cell paragraphs, one per line.
fn value_paragraphs(value: &str) -> String {
    if value.is_empty() {
        return "<w:p/>".to_string();
    }
    value
        .split('\n')
        .map(|line| {
            format!(
                "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
                quick_xml::escape::escape(line)
            )
        })
        .collect()
}

fn write_raw(writer: &mut Writer<Vec<u8>>, raw: &str) -> Result<(), DocxError> {
    writer
        .write_event(Event::Text(BytesText::from_escaped(raw)))
        .map_err(|e| DocxError::Xml(e.to_string()))
}
