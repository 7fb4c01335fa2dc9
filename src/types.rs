//! Core data model shared across the pipeline.
//!
//! The load-bearing invariant lives here: `CellId` keys are positional
//! (`table_{i}_row_{j}_col_{k}`), generated in document traversal order, and
//! `TemplateStructure` preserves that order end to end. A fill map computed
//! against one extraction can therefore be replayed onto the same document.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reserved fill-map key carrying the attachment-exhibit list.
///
/// Never a valid cell identifier (cell ids always start with `table_`), and
/// stripped during `FillMap` parsing before any cell matching happens.
pub const ATTACHMENTS_KEY: &str = "_attachments";

// ──────────────────────────────────────────────
// Cell identifiers
// ──────────────────────────────────────────────

/// Positional address of one table cell: (table, row, column), all 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub table: usize,
    pub row: usize,
    pub col: usize,
}

impl CellId {
    pub fn new(table: usize, row: usize, col: usize) -> Self {
        Self { table, row, col }
    }

    /// The stable string key used in structure maps and fill maps.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table_{}_row_{}_col_{}", self.table, self.row, self.col)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("not a cell identifier: {0}")]
pub struct CellIdParseError(pub String);

impl FromStr for CellId {
    type Err = CellIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || CellIdParseError(s.to_string());
        let rest = s.strip_prefix("table_").ok_or_else(err)?;
        let (table, rest) = rest.split_once("_row_").ok_or_else(err)?;
        let (row, col) = rest.split_once("_col_").ok_or_else(err)?;
        Ok(CellId {
            table: table.parse().map_err(|_| err())?,
            row: row.parse().map_err(|_| err())?,
            col: col.parse().map_err(|_| err())?,
        })
    }
}

// ──────────────────────────────────────────────
// Template structure
// ──────────────────────────────────────────────

/// Full extraction of a template: every table cell's id mapped to its
/// trimmed literal text, in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateStructure {
    cells: IndexMap<String, String>,
}

impl TemplateStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: CellId, text: String) {
        self.cells.insert(id.key(), text);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.cells.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.cells.keys()
    }
}

// ──────────────────────────────────────────────
// Fill map
// ──────────────────────────────────────────────

/// One exhibit to append at the end of the generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExhibitRef {
    pub title: String,
    pub path: PathBuf,
}

/// Sparse mapping from cell ids to fill values, plus the optional exhibit
/// list parsed out of the reserved [`ATTACHMENTS_KEY`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillMap {
    cells: IndexMap<String, String>,
    attachments: Vec<ExhibitRef>,
}

impl FillMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.cells.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.cells.iter()
    }

    pub fn attachments(&self) -> &[ExhibitRef] {
        &self.attachments
    }

    pub fn set_attachments(&mut self, attachments: Vec<ExhibitRef>) {
        self.attachments = attachments;
    }

    /// Build a FillMap from a parsed oracle response object.
    ///
    /// The reserved attachments entry is extracted and removed before the
    /// remaining keys become cell fills; malformed exhibit entries are
    /// dropped with a warning rather than failing the whole map. Non-string
    /// cell values are rendered to their JSON text.
    pub fn from_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut map = FillMap::new();
        for (key, value) in object {
            if key == ATTACHMENTS_KEY {
                map.attachments = parse_exhibits(&value);
                continue;
            }
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            map.cells.insert(key, text);
        }
        map
    }

    /// JSON representation persisted as the audit artifact: cell fills in
    /// order, with the reserved key re-attached when exhibits are present.
    pub fn to_artifact_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.cells {
            object.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        if !self.attachments.is_empty() {
            object.insert(
                ATTACHMENTS_KEY.to_string(),
                serde_json::to_value(&self.attachments).unwrap_or_default(),
            );
        }
        serde_json::Value::Object(object)
    }
}

fn parse_exhibits(value: &serde_json::Value) -> Vec<ExhibitRef> {
    let Some(entries) = value.as_array() else {
        tracing::warn!("attachment list is not an array, ignoring");
        return Vec::new();
    };
    let mut exhibits = Vec::new();
    for entry in entries {
        let title = entry.get("title").and_then(|v| v.as_str());
        let path = entry.get("path").and_then(|v| v.as_str());
        match (title, path) {
            (Some(title), Some(path)) if !path.is_empty() => exhibits.push(ExhibitRef {
                title: title.to_string(),
                path: PathBuf::from(path),
            }),
            _ => tracing::warn!(?entry, "malformed attachment entry skipped"),
        }
    }
    exhibits
}

// ──────────────────────────────────────────────
// Context payload
// ──────────────────────────────────────────────

/// One inline image reference inside a [`ContextPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path of the image artifact on disk.
    pub path: PathBuf,
    /// MIME type, e.g. `image/png`.
    pub mime: String,
    /// Human-readable provenance, e.g. `report.pdf page 2 image 1`.
    pub origin: String,
}

/// Unified multimodal representation of a set of attachment files:
/// one text buffer with per-source boundary markers, plus ordered images.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPayload {
    pub text: String,
    pub images: Vec<ImageRef>,
}

impl ContextPayload {
    /// True when no attachment contributed anything usable.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty()
    }

    /// Append one text contribution wrapped in its source boundary marker.
    pub fn push_text(&mut self, source_name: &str, text: &str) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&format!("===== {source_name} =====\n"));
        self.text.push_str(text.trim_end());
        self.text.push('\n');
    }
}

/// Flat key/value input data supplied directly by the caller.
pub type LiteralData = serde_json::Map<String, serde_json::Value>;
