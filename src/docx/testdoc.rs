//! Test fixture: build minimal but valid DOCX packages in memory.

use std::io::Write;
use std::path::Path;

use quick_xml::escape::escape;
use zip::write::FileOptions;
use zip::ZipWriter;

/// A table is rows of cell texts.
pub type Table<'a> = Vec<Vec<&'a str>>;

pub fn document_xml(tables: &[Table<'_>]) -> String {
    let mut body = String::new();
    for table in tables {
        body.push_str("<w:tbl><w:tblPr/>");
        for row in table {
            body.push_str("<w:tr>");
            for cell in row {
                body.push_str("<w:tc><w:tcPr/><w:p><w:r><w:t xml:space=\"preserve\">");
                body.push_str(&escape(cell));
                body.push_str("</w:t></w:r></w:p></w:tc>");
            }
            body.push_str("</w:tr>");
        }
        body.push_str("</w:tbl>");
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            "<w:body>{}<w:sectPr/></w:body></w:document>"
        ),
        body
    )
}

pub fn docx_bytes_from_xml(document_xml: &str) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options: FileOptions = FileOptions::default();

        writer.start_file("[Content_Types].xml", options).unwrap();
        writer
            .write_all(
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                    "</Types>"
                )
                .as_bytes(),
            )
            .unwrap();

        writer.start_file("_rels/.rels", options).unwrap();
        writer
            .write_all(
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
                    "</Relationships>"
                )
                .as_bytes(),
            )
            .unwrap();

        writer.start_file("word/_rels/document.xml.rels", options).unwrap();
        writer
            .write_all(
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                    "</Relationships>"
                )
                .as_bytes(),
            )
            .unwrap();

        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn docx_bytes(tables: &[Table<'_>]) -> Vec<u8> {
    docx_bytes_from_xml(&document_xml(tables))
}

pub fn write_docx(path: &Path, tables: &[Table<'_>]) {
    std::fs::write(path, docx_bytes(tables)).unwrap();
}

/// A 1x1 PNG, enough for `image::load_from_memory` to report dimensions.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(1, 1, image::Rgb([200u8, 10, 10]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}
