//! Job model and orchestration for the generation pipeline.
//!
//! A [`GenerationJob`] walks a fixed sequence of stages. Every stage
//! transition is recorded on the job, so a failed job carries the stage it
//! died in and a human-readable reason.

mod orchestrator;

pub use orchestrator::{Orchestrator, JobOutcome};

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::context::ContextError;
use crate::convert::ConvertError;
use crate::docx::DocxError;
use crate::oracle::OracleError;
use crate::types::LiteralData;

/// Where the field data for a job comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Caller-supplied field data, used verbatim.
    Literal(LiteralData),
    /// Files to distill into field data via the oracle.
    Attachments(Vec<PathBuf>),
}

impl DataSource {
    /// A source that cannot possibly yield data is rejected up front, before
    /// any oracle traffic.
    pub fn is_vacuous(&self) -> bool {
        match self {
            Self::Literal(data) => data.is_empty(),
            Self::Attachments(files) => files.is_empty(),
        }
    }
}

/// Pipeline stage names, used in job state and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Conversion,
    Extraction,
    DataResolution,
    Mapping,
    Filling,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Conversion => "conversion",
            Self::Extraction => "extraction",
            Self::DataResolution => "data resolution",
            Self::Mapping => "mapping",
            Self::Filling => "filling",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Initialized,
    StructureExtracted,
    DataResolved,
    Mapped,
    Filled,
    Done,
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Template(#[from] DocxError),
    #[error("cannot fill template: {0}")]
    Fill(DocxError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("no data source: supply field data or at least one attachment")]
    NoDataSource,
    #[error("cannot create scratch directory: {0}")]
    Scratch(std::io::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl JobError {
    /// The stage a given failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Convert(_) => Stage::Conversion,
            Self::Template(_) => Stage::Extraction,
            Self::Fill(_) => Stage::Filling,
            Self::NoDataSource | Self::Scratch(_) | Self::Context(_) => Stage::DataResolution,
            Self::Oracle(OracleError::Unparseable) => Stage::DataResolution,
            Self::Oracle(_) => Stage::Mapping,
        }
    }
}

/// One template-fill job from template to completed document.
#[derive(Debug)]
pub struct GenerationJob {
    pub id: Uuid,
    pub template: PathBuf,
    pub output: PathBuf,
    pub source: DataSource,
    /// Where to persist the intermediate JSON artifacts, if anywhere.
    pub artifact_dir: Option<PathBuf>,
    pub state: JobState,
}

impl GenerationJob {
    pub fn new(template: PathBuf, output: PathBuf, source: DataSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            template,
            output,
            source,
            artifact_dir: None,
            state: JobState::Initialized,
        }
    }

    pub fn with_artifact_dir(mut self, dir: PathBuf) -> Self {
        self.artifact_dir = Some(dir);
        self
    }
}
