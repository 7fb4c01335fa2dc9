//! Drives one job through the pipeline stages.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{DataSource, GenerationJob, JobError, JobState};
use crate::context::{self, AttachmentKind};
use crate::convert;
use crate::docx;
use crate::oracle::{ChatCompletion, MappingOracle};
use crate::types::{ExhibitRef, FillMap, LiteralData, TemplateStructure};

const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(120);

/// What a finished job produced.
#[derive(Debug)]
pub struct JobOutcome {
    pub output: PathBuf,
    pub filled: usize,
    pub requested: usize,
    pub unmatched: Vec<String>,
    pub duration: Duration,
}

/// Runs generation jobs against one oracle transport.
pub struct Orchestrator<C> {
    oracle: MappingOracle<C>,
    convert_timeout: Duration,
}

impl<C: ChatCompletion> Orchestrator<C> {
    pub fn new(client: C) -> Self {
        Self {
            oracle: MappingOracle::new(client),
            convert_timeout: DEFAULT_CONVERT_TIMEOUT,
        }
    }

    pub fn with_convert_timeout(mut self, timeout: Duration) -> Self {
        self.convert_timeout = timeout;
        self
    }

    /// Run `job` to completion. On failure the job is left in
    /// [`JobState::Failed`] with the stage and reason recorded.
    pub fn run(&self, job: &mut GenerationJob) -> Result<JobOutcome, JobError> {
        let span = tracing::info_span!("job", id = %job.id, template = %job.template.display());
        let _guard = span.enter();
        let started = Instant::now();

        match self.run_stages(job) {
            Ok(report) => {
                job.state = JobState::Done;
                let outcome = JobOutcome {
                    output: job.output.clone(),
                    filled: report.filled,
                    requested: report.requested,
                    unmatched: report.unmatched,
                    duration: started.elapsed(),
                };
                tracing::info!(
                    filled = outcome.filled,
                    requested = outcome.requested,
                    elapsed_ms = outcome.duration.as_millis() as u64,
                    "job complete"
                );
                Ok(outcome)
            }
            Err(error) => {
                let stage = error.stage();
                tracing::error!(%stage, %error, "job failed");
                job.state = JobState::Failed { stage, reason: error.to_string() };
                Err(error)
            }
        }
    }

    fn run_stages(&self, job: &mut GenerationJob) -> Result<docx::FillReport, JobError> {
        let template = if convert::needs_conversion(&job.template) {
            convert::doc_to_docx(&job.template, self.convert_timeout)?
        } else {
            job.template.clone()
        };

        let structure = docx::extract_structure(&template)?;
        job.state = JobState::StructureExtracted;
        tracing::info!(cells = structure.len(), "template structure extracted");
        self.persist_artifact(
            job,
            &template,
            "template_structure",
            &serde_json::to_value(&structure).unwrap_or_default(),
        );

        if job.source.is_vacuous() {
            return Err(JobError::NoDataSource);
        }
        let data = self.resolve_data(&job.source)?;
        job.state = JobState::DataResolved;
        tracing::info!(fields = data.len(), "field data resolved");

        let mut fill_map = self.map_fields(&structure, &data)?;
        job.state = JobState::Mapped;
        if let DataSource::Attachments(files) = &job.source {
            fill_map.set_attachments(image_exhibits(files));
        }
        self.persist_artifact(job, &template, "filled_data", &fill_map.to_artifact_json());

        let report =
            docx::fill_template(&template, &job.output, &fill_map).map_err(JobError::Fill)?;
        job.state = JobState::Filled;
        Ok(report)
    }

    fn resolve_data(&self, source: &DataSource) -> Result<LiteralData, JobError> {
        match source {
            DataSource::Literal(data) => Ok(data.clone()),
            DataSource::Attachments(files) => {
                let scratch = tempfile::tempdir().map_err(JobError::Scratch)?;
                let payload = context::assemble(files, scratch.path())?;
                let data = self.oracle.extract_fields(&payload)?;
                Ok(data)
            }
        }
    }

    fn map_fields(
        &self,
        structure: &TemplateStructure,
        data: &LiteralData,
    ) -> Result<FillMap, JobError> {
        Ok(self.oracle.map_fields(structure, data)?)
    }

    /// Persist an intermediate JSON artifact. Failures are warnings; the
    /// artifacts exist for inspection, not for the pipeline itself.
    fn persist_artifact(
        &self,
        job: &GenerationJob,
        template: &Path,
        suffix: &str,
        value: &serde_json::Value,
    ) {
        let Some(dir) = &job.artifact_dir else { return };
        let stem = template
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "template".to_string());
        let path = dir.join(format!("{stem}_{suffix}.json"));
        let rendered = match serde_json::to_string_pretty(value) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialize artifact");
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, rendered) {
            tracing::warn!(path = %path.display(), error = %e, "cannot write artifact");
        } else {
            tracing::debug!(path = %path.display(), "artifact written");
        }
    }
}

/// Image attachments survive as exhibits in the completed document.
fn image_exhibits(files: &[PathBuf]) -> Vec<ExhibitRef> {
    files
        .iter()
        .filter(|f| AttachmentKind::of(f) == AttachmentKind::Image)
        .map(|f| ExhibitRef {
            title: f
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| f.display().to_string()),
            path: f.clone(),
        })
        .collect()
}
