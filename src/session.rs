//! Session tracking and the shared template pool.
//!
//! A session groups the documents a user is generating and exposes a
//! dashboard view of their progress. The template pool is a directory of
//! reusable templates shared across sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("template pool error: {0}")]
    Pool(#[from] std::io::Error),
    #[error("a template named {0:?} already exists in the pool")]
    DuplicateTemplate(String),
    #[error("session store is poisoned")]
    Poisoned,
}

/// Progress of one document within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Completed,
    Failed,
}

/// One document being generated in a session.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentItem {
    pub id: String,
    pub name: String,
    pub status: ItemStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub template_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl DocumentItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            status: ItemStatus::Pending,
            created_at: chrono::Utc::now(),
            template_path: None,
            output_path: None,
            error: None,
        }
    }

    pub fn completed(&mut self, output: PathBuf) {
        self.status = ItemStatus::Completed;
        self.output_path = Some(output);
        self.error = None;
    }

    pub fn failed(&mut self, reason: impl Into<String>) {
        self.status = ItemStatus::Failed;
        self.error = Some(reason.into());
    }

    /// The row the dashboard shows for this item.
    pub fn dashboard_row(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "status": self.status,
            "created_at": self.created_at.to_rfc3339(),
            "has_output": self.output_path.is_some(),
            "error": self.error,
        })
    }
}

/// One user's working set of documents.
#[derive(Debug, Default)]
pub struct Session {
    pub items: Vec<DocumentItem>,
}

impl Session {
    pub fn item_mut(&mut self, id: &str) -> Option<&mut DocumentItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn dashboard(&self) -> Vec<serde_json::Value> {
        self.items.iter().map(DocumentItem::dashboard_row).collect()
    }
}

/// Keyed session storage.
pub trait SessionStore {
    /// Run `f` against the session for `id`, creating it if absent.
    fn with_session<R>(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut Session) -> R,
    ) -> Result<R, SessionError>;

    fn session_ids(&self) -> Result<Vec<String>, SessionError>;
}

/// Process-local session storage.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn with_session<R>(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        let session = sessions.entry(id.to_string()).or_default();
        Ok(f(session))
    }

    fn session_ids(&self) -> Result<Vec<String>, SessionError> {
        let sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        Ok(sessions.keys().cloned().collect())
    }
}

/// A directory of reusable templates shared across sessions.
#[derive(Debug)]
pub struct TemplatePool {
    root: PathBuf,
}

impl TemplatePool {
    pub fn open(root: PathBuf) -> Result<Self, SessionError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Copy a template into the pool under its own file name. Adding a name
    /// that already exists is an error; existing templates are never
    /// overwritten.
    pub fn add(&self, source: &Path) -> Result<PathBuf, SessionError> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "template.docx".to_string());
        let target = self.root.join(&name);

        // create_new makes the existence check and the claim atomic.
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SessionError::DuplicateTemplate(name));
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = std::fs::File::open(source)?;
        std::io::copy(&mut reader, &mut file)?;
        tracing::info!(template = %name, "template added to pool");
        Ok(target)
    }

    /// Templates currently in the pool, sorted by name.
    pub fn list(&self) -> Result<Vec<PathBuf>, SessionError> {
        let mut templates = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if matches!(ext.as_deref(), Some("doc") | Some("docx")) {
                templates.push(path);
            }
        }
        templates.sort();
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_track_their_lifecycle_on_the_dashboard() {
        let store = InMemorySessionStore::new();
        store
            .with_session("s1", &mut |session| {
                session.items.push(DocumentItem::new("lease form"));
            })
            .unwrap();

        let rows = store
            .with_session("s1", &mut |session| {
                session.items[0].completed(PathBuf::from("/tmp/out.docx"));
                session.items.push({
                    let mut item = DocumentItem::new("survey form");
                    item.failed("oracle request timed out");
                    item
                });
                session.dashboard()
            })
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["status"], "completed");
        assert_eq!(rows[0]["has_output"], true);
        assert_eq!(rows[1]["status"], "failed");
        assert_eq!(rows[1]["error"], "oracle request timed out");
    }

    #[test]
    fn sessions_are_isolated_by_id() {
        let store = InMemorySessionStore::new();
        store
            .with_session("a", &mut |s| s.items.push(DocumentItem::new("one")))
            .unwrap();
        let count = store.with_session("b", &mut |s| s.items.len()).unwrap();
        assert_eq!(count, 0);
        let mut ids = store.session_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn pool_rejects_duplicate_template_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lease.docx");
        std::fs::write(&source, b"bytes").unwrap();

        let pool = TemplatePool::open(dir.path().join("pool")).unwrap();
        let stored = pool.add(&source).unwrap();
        assert!(stored.is_file());

        let err = pool.add(&source).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateTemplate(name) if name == "lease.docx"));
    }

    #[test]
    fn pool_lists_only_templates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = TemplatePool::open(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("a.docx"), b"x").unwrap();
        std::fs::write(dir.path().join("b.doc"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let listed = pool.list().unwrap();
        let names: Vec<_> = listed
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.docx", "b.doc"]);
    }
}
