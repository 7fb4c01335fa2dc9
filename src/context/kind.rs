//! Attachment classification by file extension.

use std::path::Path;

/// How an attachment is turned into oracle context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Plain text read as-is.
    Text,
    /// A Word document whose cell and paragraph text is extracted.
    WordDocument,
    /// A page-oriented document with text and possibly embedded images.
    PaginatedDocument,
    /// A standalone image passed to the oracle directly.
    Image,
    /// Anything else; skipped with a warning.
    Unsupported,
}

impl AttachmentKind {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" | "json" | "csv" => Self::Text,
            "docx" => Self::WordDocument,
            "pdf" => Self::PaginatedDocument,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tiff" | "webp" => Self::Image,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::WordDocument => "word document",
            Self::PaginatedDocument => "paginated document",
            Self::Image => "image",
            Self::Unsupported => "unsupported",
        }
    }
}
