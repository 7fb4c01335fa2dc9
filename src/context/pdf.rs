//! PDF attachment handling: page text plus embedded raster images.
//!
//! Text comes out with page markers so the oracle can cite locations.
//! Embedded images are decoded to files in the job's scratch directory and
//! forwarded as vision inputs; streams with exotic filters or color spaces
//! are skipped with a warning rather than failing the attachment.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

use crate::types::ImageRef;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("cannot read pdf: {0}")]
    Read(#[from] std::io::Error),
    #[error("cannot parse pdf: {0}")]
    Parse(String),
}

pub struct PdfContent {
    pub text: String,
    pub images: Vec<ImageRef>,
}

/// Extract page text and embedded images from one PDF attachment.
pub fn extract(path: &Path, scratch_dir: &Path) -> Result<PdfContent, PdfError> {
    let bytes = std::fs::read(path)?;

    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page.trim();
        if page_text.is_empty() {
            continue;
        }
        text.push_str(&format!("--- page {} ---\n{}\n", idx + 1, page_text));
    }

    let images = match Document::load_mem(&bytes) {
        Ok(doc) => collect_images(&doc, path, scratch_dir),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping embedded images");
            Vec::new()
        }
    };

    Ok(PdfContent { text, images })
}

fn collect_images(doc: &Document, source: &Path, scratch_dir: &Path) -> Vec<ImageRef> {
    let source_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());

    let mut images = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let (inline, referenced) = match doc.get_page_resources(page_id) {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(
                    source = %source_name,
                    page = page_num,
                    error = %e,
                    "cannot read page resources"
                );
                continue;
            }
        };
        let mut xobjects: Vec<ObjectId> = Vec::new();
        if let Some(dict) = inline {
            gather_xobject_ids(doc, dict, &mut xobjects);
        }
        for res_id in referenced {
            if let Ok(Object::Dictionary(dict)) = doc.get_object(res_id) {
                gather_xobject_ids(doc, dict, &mut xobjects);
            }
        }
        xobjects.sort();
        xobjects.dedup();

        let mut img_num = 0usize;
        for id in xobjects {
            let Ok(object) = doc.get_object(id) else { continue };
            let Ok(stream) = object.as_stream() else { continue };
            if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Image".as_slice()) {
                continue;
            }
            img_num += 1;
            match decode_image(stream, scratch_dir, page_num, img_num) {
                Ok(Some((file, mime))) => {
                    images.push(ImageRef {
                        path: file,
                        mime,
                        origin: format!("{source_name} page {page_num} image {img_num}"),
                    });
                }
                Ok(None) => {
                    tracing::warn!(
                        source = %source_name,
                        page = page_num,
                        "skipping embedded image with unsupported encoding"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        source = %source_name,
                        page = page_num,
                        error = %e,
                        "failed to decode embedded image"
                    );
                }
            }
        }
    }
    images
}

fn gather_xobject_ids(doc: &Document, resources: &Dictionary, out: &mut Vec<ObjectId>) {
    let xobject = match resources.get(b"XObject") {
        Ok(Object::Dictionary(dict)) => dict,
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => dict,
            _ => return,
        },
        _ => return,
    };
    for (_, value) in xobject.iter() {
        if let Object::Reference(id) = value {
            out.push(*id);
        }
    }
}

/// Decode one image stream to a file. `Ok(None)` means the encoding is one
/// we deliberately do not handle.
fn decode_image(
    stream: &lopdf::Stream,
    scratch_dir: &Path,
    page: u32,
    index: usize,
) -> Result<Option<(PathBuf, String)>, Box<dyn std::error::Error>> {
    let filter = stream
        .dict
        .get(b"Filter")
        .and_then(Object::as_name)
        .unwrap_or(b"");

    match filter {
        // JPEG data is stored verbatim.
        b"DCTDecode" => {
            let file = scratch_dir.join(format!("page{page}_img{index}.jpg"));
            std::fs::write(&file, &stream.content)?;
            Ok(Some((file, "image/jpeg".to_string())))
        }
        b"FlateDecode" => {
            let bits = stream
                .dict
                .get(b"BitsPerComponent")
                .and_then(Object::as_i64)
                .unwrap_or(8);
            if bits != 8 {
                return Ok(None);
            }
            let width = stream.dict.get(b"Width").and_then(Object::as_i64)? as u32;
            let height = stream.dict.get(b"Height").and_then(Object::as_i64)? as u32;
            let data = stream.decompressed_content()?;
            let color_space = stream
                .dict
                .get(b"ColorSpace")
                .and_then(Object::as_name)
                .unwrap_or(b"");
            let file = scratch_dir.join(format!("page{page}_img{index}.png"));
            match color_space {
                b"DeviceRGB" => {
                    let Some(img) = image::RgbImage::from_raw(width, height, data) else {
                        return Ok(None);
                    };
                    img.save(&file)?;
                }
                b"DeviceGray" => {
                    let Some(img) = image::GrayImage::from_raw(width, height, data) else {
                        return Ok(None);
                    };
                    img.save(&file)?;
                }
                _ => return Ok(None),
            }
            Ok(Some((file, "image/png".to_string())))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0 fake jpeg payload \xff\xd9";

    fn image_stream(filter: &str) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Filter" => filter,
                "Width" => 1,
                "Height" => 1,
            },
            JPEG_BYTES.to_vec(),
        )
    }

    /// One page whose resources hold a JPEG image plus a form XObject.
    fn single_page_doc() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(image_stream("DCTDecode"));
        let form_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Form" },
            Vec::new(),
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! {
                "Im0" => Object::Reference(image_id),
                "Fm0" => Object::Reference(form_id),
            },
        });
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn jpeg_stream_written_verbatim() {
        let scratch = tempfile::tempdir().unwrap();
        let stream = image_stream("DCTDecode");

        let (file, mime) = decode_image(&stream, scratch.path(), 1, 1).unwrap().unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(file.file_name().unwrap(), "page1_img1.jpg");
        assert_eq!(std::fs::read(&file).unwrap(), JPEG_BYTES);
    }

    #[test]
    fn exotic_filters_are_skipped_not_fatal() {
        let scratch = tempfile::tempdir().unwrap();
        assert!(decode_image(&image_stream("JPXDecode"), scratch.path(), 1, 1)
            .unwrap()
            .is_none());
        assert!(decode_image(&image_stream("CCITTFaxDecode"), scratch.path(), 1, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn page_walk_finds_images_and_ignores_form_xobjects() {
        let scratch = tempfile::tempdir().unwrap();
        let doc = single_page_doc();

        let images = collect_images(&doc, Path::new("scan.pdf"), scratch.path());
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime, "image/jpeg");
        assert_eq!(images[0].origin, "scan.pdf page 1 image 1");
        assert_eq!(std::fs::read(&images[0].path).unwrap(), JPEG_BYTES);
    }

    #[test]
    fn unsupported_image_degrades_without_output() {
        let scratch = tempfile::tempdir().unwrap();
        let mut doc = single_page_doc();
        // Swap the image's filter for one the decoder does not handle.
        let image_id = doc
            .objects
            .iter()
            .find_map(|(id, obj)| {
                let stream = obj.as_stream().ok()?;
                (stream.dict.get(b"Subtype").and_then(Object::as_name).ok()
                    == Some(b"Image".as_slice()))
                .then_some(*id)
            })
            .unwrap();
        if let Ok(Object::Stream(stream)) = doc.get_object_mut(image_id) {
            stream.dict.set("Filter", "JPXDecode");
        }

        let images = collect_images(&doc, Path::new("scan.pdf"), scratch.path());
        assert!(images.is_empty());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
