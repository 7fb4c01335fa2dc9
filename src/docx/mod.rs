//! DOCX package handling: structural extraction and deterministic fill-back.
//!
//! A `.docx` file is a zip archive; the table grid lives in
//! `word/document.xml`. Both the extractor and the filler walk that XML with
//! the same traversal rules (top-level tables in document order, rows
//! top-to-bottom, cells left-to-right), which is the invariant that lets a
//! fill map computed from one extraction be replayed onto the same layout.

pub mod exhibits;
pub mod fill;
pub mod package;
pub mod structure;

#[cfg(test)]
pub(crate) mod testdoc;

pub use fill::{fill_template, FillReport};
pub use package::{DocxPackage, MediaEntry};
pub use structure::extract_structure;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocxError {
    /// The file could not be opened as a valid DOCX package. Fatal.
    #[error("template unreadable: {0}")]
    TemplateUnreadable(String),

    /// `word/document.xml` is not well-formed.
    #[error("document XML error: {0}")]
    Xml(String),

    /// Writing the output package failed. The destination is left untouched.
    #[error("failed to save output: {0}")]
    Save(String),
}
