//! Per-attachment dispatch into one combined oracle payload.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::pdf;
use super::{AttachmentKind, ContextError};
use crate::docx::DocxPackage;
use crate::types::{ContextPayload, ImageRef};

/// Build the oracle context from user attachments. A file that cannot be
/// handled skips with a warning; the call fails only when nothing at all
/// survived.
pub fn assemble<P: AsRef<Path>>(
    attachments: &[P],
    scratch_dir: &Path,
) -> Result<ContextPayload, ContextError> {
    let mut payload = ContextPayload::default();

    for attachment in attachments {
        let path = attachment.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let kind = AttachmentKind::of(path);
        tracing::debug!(file = %name, kind = kind.as_str(), "processing attachment");

        match kind {
            AttachmentKind::Text => match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => payload.push_text(&name, text.trim()),
                Ok(_) => tracing::warn!(file = %name, "attachment is empty, skipping"),
                Err(e) => tracing::warn!(file = %name, error = %e, "cannot read attachment"),
            },
            AttachmentKind::WordDocument => match document_text(path) {
                Ok(text) if !text.trim().is_empty() => payload.push_text(&name, text.trim()),
                Ok(_) => tracing::warn!(file = %name, "document has no text, skipping"),
                Err(e) => tracing::warn!(file = %name, error = %e, "cannot extract document text"),
            },
            AttachmentKind::PaginatedDocument => match pdf::extract(path, scratch_dir) {
                Ok(content) => {
                    if !content.text.trim().is_empty() {
                        payload.push_text(&name, content.text.trim());
                    }
                    if !content.images.is_empty() {
                        tracing::debug!(
                            file = %name,
                            images = content.images.len(),
                            "embedded images extracted"
                        );
                        payload.images.extend(content.images);
                    }
                }
                Err(e) => tracing::warn!(file = %name, error = %e, "cannot read attachment"),
            },
            AttachmentKind::Image => match std::fs::metadata(path) {
                Ok(_) => {
                    let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();
                    payload.images.push(ImageRef {
                        path: path.to_path_buf(),
                        mime,
                        origin: name,
                    });
                }
                Err(e) => tracing::warn!(file = %name, error = %e, "cannot read attachment"),
            },
            AttachmentKind::Unsupported => {
                tracing::warn!(file = %name, "unsupported attachment type, skipping");
            }
        }
    }

    if payload.is_empty() {
        return Err(ContextError::Empty(attachments.len()));
    }
    Ok(payload)
}

/// All readable text in a Word document, paragraphs joined with newlines.
fn document_text(path: &Path) -> Result<String, crate::docx::DocxError> {
    let package = DocxPackage::open(path)?;
    let mut reader = Reader::from_reader(package.document_xml.as_slice());
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| crate::docx::DocxError::Xml(e.to_string()))?
        {
            Event::Start(ref e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(ref e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Text(ref t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| crate::docx::DocxError::Xml(e.to_string()))?;
                out.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
