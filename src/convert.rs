//! Legacy `.doc` conversion via a local LibreOffice install.
//!
//! The binary `.doc` format is not parsed directly; LibreOffice converts it
//! to `.docx` in headless mode and the pipeline continues from there.
//! Conversion failures are fatal to the job.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

const CANDIDATE_BINARIES: &[&str] = &[
    "soffice",
    "libreoffice",
    "/Applications/LibreOffice.app/Contents/MacOS/soffice",
];

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no LibreOffice installation found (tried soffice, libreoffice)")]
    ConverterNotFound,
    #[error("cannot run converter: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("conversion timed out after {0:?}")]
    Timeout(Duration),
    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("converter produced no output for {0}")]
    MissingOutput(PathBuf),
}

/// Convert `path` to `.docx` next to the original and return the new path.
pub fn doc_to_docx(path: &Path, timeout: Duration) -> Result<PathBuf, ConvertError> {
    let binary = find_converter().ok_or(ConvertError::ConverterNotFound)?;
    let outdir = path.parent().unwrap_or_else(|| Path::new("."));

    tracing::info!(input = %path.display(), converter = binary, "converting legacy document");

    let mut child = Command::new(binary)
        .arg("--headless")
        .arg("--convert-to")
        .arg("docx")
        .arg("--outdir")
        .arg(outdir)
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let started = Instant::now();
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if started.elapsed() > timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConvertError::Timeout(timeout));
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    if !status.success() {
        let stderr = child
            .stderr
            .take()
            .map(|mut s| {
                let mut buf = String::new();
                use std::io::Read;
                let _ = s.read_to_string(&mut buf);
                buf
            })
            .unwrap_or_default();
        return Err(ConvertError::Failed { status: status.to_string(), stderr });
    }

    let converted = path.with_extension("docx");
    if !converted.is_file() {
        return Err(ConvertError::MissingOutput(converted));
    }
    tracing::info!(output = %converted.display(), "conversion complete");
    Ok(converted)
}

/// Whether `path` needs conversion before structural extraction.
pub fn needs_conversion(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("doc"))
        .unwrap_or(false)
}

fn find_converter() -> Option<&'static str> {
    CANDIDATE_BINARIES.iter().copied().find(|binary| {
        Command::new(binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_legacy_doc_needs_conversion() {
        assert!(needs_conversion(Path::new("form.doc")));
        assert!(needs_conversion(Path::new("FORM.DOC")));
        assert!(!needs_conversion(Path::new("form.docx")));
        assert!(!needs_conversion(Path::new("form")));
        assert!(!needs_conversion(Path::new("form.pdf")));
    }
}
