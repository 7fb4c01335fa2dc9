//! Reading and rewriting the DOCX zip package.
//!
//! Opening loads the three parts the pipeline touches (`word/document.xml`,
//! its relationships, and `[Content_Types].xml`). Saving copies every other
//! entry of the original archive verbatim, swaps in the rewritten parts and
//! any new media, and lands atomically via write-then-persist so a failed
//! save never leaves a partial file at the destination.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use super::DocxError;

const DOCUMENT_PART: &str = "word/document.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// A binary part to add to the package (exhibit images).
#[derive(Debug, Clone)]
pub struct MediaEntry {
    /// Full zip path, e.g. `word/media/formfill1.png`.
    pub zip_path: String,
    pub bytes: Vec<u8>,
}

/// An opened DOCX template.
#[derive(Debug)]
pub struct DocxPackage {
    path: PathBuf,
    pub document_xml: Vec<u8>,
    pub rels_xml: String,
    pub content_types_xml: String,
}

impl DocxPackage {
    /// Open a `.docx` file and load the parts the pipeline needs.
    ///
    /// Any failure here means the template is unreadable, which is fatal to
    /// the whole job.
    pub fn open(path: &Path) -> Result<Self, DocxError> {
        let unreadable = |detail: String| {
            DocxError::TemplateUnreadable(format!("{}: {detail}", path.display()))
        };

        let file = std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;
        let mut archive = ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;

        let document_xml = read_part_bytes(&mut archive, DOCUMENT_PART)
            .map_err(|e| unreadable(format!("{DOCUMENT_PART}: {e}")))?;
        // These two exist in every real producer's output, but a missing one
        // is recoverable: substitute a minimal empty part.
        let rels_xml = read_part_string(&mut archive, RELS_PART).unwrap_or_else(|_| {
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
            )
            .to_string()
        });
        let content_types_xml =
            read_part_string(&mut archive, CONTENT_TYPES_PART).map_err(|e| {
                unreadable(format!("{CONTENT_TYPES_PART}: {e}"))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            document_xml,
            rels_xml,
            content_types_xml,
        })
    }

    /// First free numeric relationship id (`rId{n}`) in the document rels.
    pub fn next_relationship_id(&self) -> u32 {
        let re = regex::Regex::new(r#"Id="rId(\d+)""#).expect("static regex");
        re.captures_iter(&self.rels_xml)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Write a copy of the package to `output` with the given parts replaced
    /// and media added. All other entries are copied verbatim.
    pub fn save_with(
        &self,
        output: &Path,
        document_xml: &[u8],
        rels_xml: Option<&str>,
        content_types_xml: Option<&str>,
        media: &[MediaEntry],
    ) -> Result<(), DocxError> {
        let save_err = |detail: String| DocxError::Save(format!("{}: {detail}", output.display()));

        let file = std::fs::File::open(&self.path).map_err(|e| save_err(e.to_string()))?;
        let mut archive = ZipArchive::new(file).map_err(|e| save_err(e.to_string()))?;

        let out_dir = output.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = out_dir {
            std::fs::create_dir_all(dir).map_err(|e| save_err(e.to_string()))?;
        }
        let tmp = match out_dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new(),
        }
        .map_err(|e| save_err(e.to_string()))?;

        let mut writer = ZipWriter::new(tmp);
        let options: FileOptions = FileOptions::default();

        let replaced = |name: &str| {
            name == DOCUMENT_PART
                || (rels_xml.is_some() && name == RELS_PART)
                || (content_types_xml.is_some() && name == CONTENT_TYPES_PART)
        };

        for index in 0..archive.len() {
            let entry = archive.by_index(index).map_err(|e| save_err(e.to_string()))?;
            if replaced(entry.name()) {
                continue;
            }
            writer
                .raw_copy_file(entry)
                .map_err(|e| save_err(e.to_string()))?;
        }

        write_entry(&mut writer, DOCUMENT_PART, document_xml, options, &save_err)?;
        if let Some(rels) = rels_xml {
            write_entry(&mut writer, RELS_PART, rels.as_bytes(), options, &save_err)?;
        }
        if let Some(cts) = content_types_xml {
            write_entry(&mut writer, CONTENT_TYPES_PART, cts.as_bytes(), options, &save_err)?;
        }
        for entry in media {
            write_entry(&mut writer, &entry.zip_path, &entry.bytes, options, &save_err)?;
        }

        let tmp = writer.finish().map_err(|e| save_err(e.to_string()))?;
        tmp.persist(output).map_err(|e| save_err(e.to_string()))?;

        tracing::debug!(output = %output.display(), media = media.len(), "package saved");
        Ok(())
    }
}

fn write_entry<W: Write + std::io::Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: FileOptions,
    save_err: &impl Fn(String) -> DocxError,
) -> Result<(), DocxError> {
    writer
        .start_file(name, options)
        .map_err(|e| save_err(e.to_string()))?;
    writer.write_all(bytes).map_err(|e| save_err(e.to_string()))?;
    Ok(())
}

fn read_part_bytes(
    archive: &mut ZipArchive<std::fs::File>,
    name: &str,
) -> Result<Vec<u8>, String> {
    let mut part = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    part.read_to_end(&mut bytes).map_err(|e| e.to_string())?;
    Ok(bytes)
}

fn read_part_string(
    archive: &mut ZipArchive<std::fs::File>,
    name: &str,
) -> Result<String, String> {
    let bytes = read_part_bytes(archive, name)?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}
