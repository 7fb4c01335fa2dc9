//! Attachment exhibits appended to the end of a generated document.
//!
//! For each exhibit the block carries a bold numbered sub-heading, then one
//! of: an inline image (image MIME and the file exists), a plain filename
//! reference (exists, not an image), or a "file not found" placeholder.
//! A missing or undecodable exhibit never aborts the fill.

use quick_xml::escape::escape;

use super::package::MediaEntry;
use crate::types::ExhibitRef;

/// EMU per CSS pixel at 96 DPI.
const EMU_PER_PIXEL: u64 = 9525;
/// Maximum inline image width: 5.5 inches.
const MAX_WIDTH_EMU: u64 = 5_029_200;

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Everything the package rewrite needs to append the exhibits section.
pub struct ExhibitBlock {
    /// New binary parts under `word/media/`.
    pub media: Vec<MediaEntry>,
    /// `(rId, target)` relationship entries to add to the document rels.
    pub relationships: Vec<(String, String)>,
    /// `(extension, mime)` defaults to ensure in `[Content_Types].xml`.
    pub content_types: Vec<(String, String)>,
    body_xml: String,
}

impl ExhibitBlock {
    /// The block's `w:p` run, optionally preceded by a page break.
    pub fn xml(&self, with_page_break: bool) -> String {
        let mut out = String::new();
        if with_page_break {
            out.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        }
        out.push_str(&self.body_xml);
        out
    }

    /// Splice the new relationships into an existing rels part.
    pub fn patched_rels(&self, rels_xml: &str) -> String {
        let mut additions = String::new();
        for (id, target) in &self.relationships {
            additions.push_str(&format!(
                r#"<Relationship Id="{id}" Type="{IMAGE_REL_TYPE}" Target="{target}"/>"#
            ));
        }
        match rels_xml.rfind("</Relationships>") {
            Some(pos) => {
                let mut patched = rels_xml.to_string();
                patched.insert_str(pos, &additions);
                patched
            }
            None => rels_xml.to_string(),
        }
    }

    /// Ensure a `<Default>` entry exists for every media extension used.
    pub fn patched_content_types(&self, content_types_xml: &str) -> String {
        let mut patched = content_types_xml.to_string();
        for (ext, mime) in &self.content_types {
            if patched.contains(&format!(r#"Extension="{ext}""#)) {
                continue;
            }
            if let Some(pos) = patched.rfind("</Types>") {
                patched.insert_str(pos, &format!(r#"<Default Extension="{ext}" ContentType="{mime}"/>"#));
            }
        }
        patched
    }
}

/// Build the exhibits block. `first_rel_id` is the first free `rId{n}` in
/// the document relationships.
pub fn build_block(exhibits: &[ExhibitRef], first_rel_id: u32) -> ExhibitBlock {
    let mut block = ExhibitBlock {
        media: Vec::new(),
        relationships: Vec::new(),
        content_types: Vec::new(),
        body_xml: String::new(),
    };
    block.body_xml.push_str(&bold_paragraph("Attachments"));

    let mut rel_id = first_rel_id;
    for (index, exhibit) in exhibits.iter().enumerate() {
        let heading = format!("Attachment {}: {}", index + 1, exhibit.title);
        block.body_xml.push_str(&bold_paragraph(&heading));

        if !exhibit.path.exists() {
            tracing::warn!(path = %exhibit.path.display(), "exhibit file missing, placeholder inserted");
            block.body_xml.push_str(&plain_paragraph(&format!(
                "[file not found: {}]",
                exhibit.path.display()
            )));
            continue;
        }

        let mime = mime_guess::from_path(&exhibit.path).first_or_octet_stream();
        if mime.type_() == mime_guess::mime::IMAGE {
            match inline_image(exhibit, rel_id, &mut block) {
                Ok(xml) => {
                    block.body_xml.push_str(&xml);
                    rel_id += 1;
                    continue;
                }
                Err(reason) => {
                    tracing::warn!(
                        path = %exhibit.path.display(),
                        reason,
                        "exhibit image not embeddable, falling back to filename reference"
                    );
                }
            }
        }

        let name = exhibit
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| exhibit.path.display().to_string());
        block.body_xml.push_str(&plain_paragraph(&format!("[attached file: {name}]")));
    }

    block
}

/// Read, size and register one inline image; returns its drawing paragraph.
fn inline_image(
    exhibit: &ExhibitRef,
    rel_id: u32,
    block: &mut ExhibitBlock,
) -> Result<String, String> {
    let bytes = std::fs::read(&exhibit.path).map_err(|e| e.to_string())?;
    let probed = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
    let (cx, cy) = scaled_extent(u64::from(probed.width()), u64::from(probed.height()));

    let ext = exhibit
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    let mime = mime_guess::from_ext(&ext).first_or_octet_stream().to_string();

    let media_index = block.media.len() + 1;
    let file_name = format!("formfill{media_index}.{ext}");
    let id = format!("rId{rel_id}");

    block.media.push(MediaEntry {
        zip_path: format!("word/media/{file_name}"),
        bytes,
    });
    block.relationships.push((id.clone(), format!("media/{file_name}")));
    block.content_types.push((ext, mime));

    let name = escape(&exhibit.title).into_owned();
    Ok(format!(
        concat!(
            "<w:p><w:r><w:drawing>",
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0" "#,
            r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{doc_id}" name="{name}"/>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{doc_id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            "</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"
        ),
        cx = cx,
        cy = cy,
        doc_id = rel_id,
        name = name,
        rid = id,
    ))
}

/// Natural size at 96 DPI, scaled down to the maximum width if needed.
fn scaled_extent(width_px: u64, height_px: u64) -> (u64, u64) {
    let cx = width_px.max(1) * EMU_PER_PIXEL;
    let cy = height_px.max(1) * EMU_PER_PIXEL;
    if cx <= MAX_WIDTH_EMU {
        return (cx, cy);
    }
    let scaled_cy = (cy as u128 * MAX_WIDTH_EMU as u128 / cx as u128) as u64;
    (MAX_WIDTH_EMU, scaled_cy.max(1))
}

fn bold_paragraph(text: &str) -> String {
    format!(
        "<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        escape(text)
    )
}

fn plain_paragraph(text: &str) -> String {
    format!(
        "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        escape(text)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::testdoc;
    use std::path::PathBuf;

    #[test]
    fn missing_exhibit_gets_placeholder() {
        let exhibits = [ExhibitRef {
            title: "Sketch".into(),
            path: PathBuf::from("/definitely/not/here.png"),
        }];
        let block = build_block(&exhibits, 1);
        assert!(block.media.is_empty());
        assert!(block.body_xml.contains("Attachment 1: Sketch"));
        assert!(block.body_xml.contains("[file not found:"));
    }

    #[test]
    fn image_exhibit_registers_media_rel_and_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, testdoc::tiny_png()).unwrap();

        let exhibits = [ExhibitRef { title: "Site photo".into(), path }];
        let block = build_block(&exhibits, 4);
        assert_eq!(block.media.len(), 1);
        assert_eq!(block.media[0].zip_path, "word/media/formfill1.png");
        assert_eq!(block.relationships, vec![("rId4".to_string(), "media/formfill1.png".to_string())]);
        assert_eq!(block.content_types[0].0, "png");
        assert!(block.body_xml.contains(r#"r:embed="rId4""#));
    }

    #[test]
    fn non_image_exhibit_becomes_filename_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let exhibits = [ExhibitRef { title: "Raw data".into(), path }];
        let block = build_block(&exhibits, 1);
        assert!(block.media.is_empty());
        assert!(block.body_xml.contains("[attached file: report.csv]"));
    }

    #[test]
    fn corrupt_image_falls_back_to_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not actually a png").unwrap();

        let exhibits = [ExhibitRef { title: "Broken".into(), path }];
        let block = build_block(&exhibits, 1);
        assert!(block.media.is_empty());
        assert!(block.body_xml.contains("[attached file: broken.png]"));
    }

    #[test]
    fn page_break_only_when_requested() {
        let block = build_block(&[], 1);
        assert!(block.xml(true).contains(r#"<w:br w:type="page"/>"#));
        assert!(!block.xml(false).contains(r#"<w:br w:type="page"/>"#));
    }

    #[test]
    fn wide_image_clamped_to_max_width() {
        let (cx, cy) = scaled_extent(2000, 1000);
        assert_eq!(cx, MAX_WIDTH_EMU);
        assert_eq!(cy, MAX_WIDTH_EMU / 2);

        let (cx, cy) = scaled_extent(100, 50);
        assert_eq!(cx, 100 * EMU_PER_PIXEL);
        assert_eq!(cy, 50 * EMU_PER_PIXEL);
    }

    #[test]
    fn rels_and_content_types_patching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.png");
        std::fs::write(&path, testdoc::tiny_png()).unwrap();
        let block = build_block(&[ExhibitRef { title: "P".into(), path }], 2);

        let rels = r#"<Relationships xmlns="x"></Relationships>"#;
        let patched = block.patched_rels(rels);
        assert!(patched.contains(r#"Id="rId2""#));
        assert!(patched.ends_with("</Relationships>"));

        let cts = r#"<Types xmlns="y"><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        let patched = block.patched_content_types(cts);
        assert!(patched.contains(r#"Extension="png""#));
        // Re-patching is idempotent.
        let again = block.patched_content_types(&patched);
        assert_eq!(patched, again);
    }

    #[test]
    fn exhibit_titles_escaped_in_xml() {
        let exhibits = [ExhibitRef {
            title: "A & B <C>".into(),
            path: PathBuf::from("/missing.bin"),
        }];
        let block = build_block(&exhibits, 1);
        assert!(block.body_xml.contains("A &amp; B &lt;C&gt;"));
        assert!(!block.body_xml.contains("A & B"));
    }
}
