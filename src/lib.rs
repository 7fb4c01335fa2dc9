//! Fill tabular Word templates from structured data or loose attachments.
//!
//! The pipeline splits the problem into deterministic halves around one
//! non-deterministic core. Template structure is read mechanically
//! ([`docx::extract_structure`]), attachments are flattened into a
//! multimodal payload ([`context::assemble`]), and a chat-completion model
//! decides which data belongs in which cell ([`oracle::MappingOracle`]).
//! The completed document is then written mechanically
//! ([`docx::fill_template`]), so identical fill maps always produce
//! identical documents.
//!
//! [`workflow::Orchestrator`] wires the stages together for one job;
//! [`session`] tracks batches of jobs for interactive callers.

pub mod config;
pub mod context;
pub mod convert;
pub mod docx;
pub mod oracle;
pub mod session;
pub mod types;
pub mod workflow;

pub use types::{CellId, FillMap, TemplateStructure};
pub use workflow::{DataSource, GenerationJob, JobState, Orchestrator};
