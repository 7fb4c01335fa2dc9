use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use formfill::config::OracleConfig;
use formfill::oracle::OpenRouterClient;
use formfill::{DataSource, GenerationJob, Orchestrator};

/// Fill a tabular Word template from JSON data or loose attachments.
#[derive(Parser, Debug)]
#[command(name = "formfill", version, about)]
struct Opts {
    /// Template document (.docx, or .doc with LibreOffice installed)
    template: PathBuf,

    /// Output path; defaults to `<template stem>_filled.docx` beside the template
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with field data to map onto the template
    #[arg(long, conflicts_with = "attach")]
    data: Option<PathBuf>,

    /// Attachment files (text, docx, pdf, images) to distill field data from
    #[arg(long = "attach")]
    attach: Vec<PathBuf>,

    /// Directory for intermediate JSON artifacts
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Override the oracle model
    #[arg(long, env = "FORMFILL_MODEL")]
    model: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();

    let mut config = OracleConfig::from_env()?;
    if let Some(model) = opts.model {
        config.model = model;
    }

    let source = match &opts.data {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read data file {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", path.display()))?;
            let object = value
                .as_object()
                .with_context(|| format!("{} must contain a JSON object", path.display()))?;
            DataSource::Literal(object.clone())
        }
        None => DataSource::Attachments(opts.attach.clone()),
    };

    let output = opts.output.unwrap_or_else(|| default_output(&opts.template));

    let mut job = GenerationJob::new(opts.template, output, source);
    if let Some(dir) = opts.artifacts {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create artifact directory {}", dir.display()))?;
        job = job.with_artifact_dir(dir);
    }

    let client = OpenRouterClient::new(&config)?;
    let orchestrator = Orchestrator::new(client);
    let outcome = orchestrator.run(&mut job)?;

    println!(
        "{} — {} of {} fields filled in {:.1}s",
        outcome.output.display(),
        outcome.filled,
        outcome.requested,
        outcome.duration.as_secs_f64(),
    );
    for key in &outcome.unmatched {
        println!("  unmatched: {key}");
    }
    Ok(())
}

fn default_output(template: &PathBuf) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    template.with_file_name(format!("{stem}_filled.docx"))
}
