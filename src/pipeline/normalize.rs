//! Input normalization: one or more uploads → exactly one [`CanonicalArtifact`].
//!
//! * Several images are stitched top-to-bottom on a white canvas as wide as
//!   the widest page, left aligned, in submission order.
//! * Any image result is then downscaled (never upscaled) to the configured
//!   width ceiling with Lanczos3, preserving aspect ratio.
//! * A Word document yields its paragraph text joined by newlines.
//! * A PDF yields its page text joined by newlines. A PDF without a text layer
//!   is rejected: scanned PDFs are not OCR'd.
//!
//! Everything here is synchronous and CPU-bound; [`crate::review::Reviewer`]
//! runs it inside `spawn_blocking`.

use crate::error::ReviewError;
use crate::pipeline::input::{DeclaredKind, RawUpload};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use tracing::{debug, info, warn};

/// The single normalized input of a submission cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalArtifact {
    /// A stitched and/or downscaled raster, ready for transcription.
    Image(RgbImage),
    /// Text extracted from a document; bypasses transcription.
    Text(String),
}

impl CanonicalArtifact {
    /// Short human-readable summary, used in logs and progress events.
    pub fn describe(&self) -> String {
        match self {
            CanonicalArtifact::Image(img) => format!("{}x{} px image", img.width(), img.height()),
            CanonicalArtifact::Text(text) => format!("{} chars of text", text.chars().count()),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, CanonicalArtifact::Image(_))
    }
}

/// Normalize a submission into its canonical artifact.
///
/// All uploads must share one [`DeclaredKind`]; documents are accepted one at
/// a time.
pub fn normalize(uploads: &[RawUpload], max_width: u32) -> Result<CanonicalArtifact, ReviewError> {
    let first = uploads
        .first()
        .ok_or_else(|| ReviewError::Validation("nothing to normalize: no upload given".into()))?;

    if let Some(odd) = uploads.iter().find(|u| u.kind != first.kind) {
        return Err(ReviewError::Validation(format!(
            "cannot mix {:?} and {:?} uploads ('{}')",
            first.kind, odd.kind, odd.name
        )));
    }

    match first.kind {
        DeclaredKind::Image => {
            let images = uploads
                .iter()
                .map(|u| {
                    image::load_from_memory(&u.bytes).map_err(|e| ReviewError::parse(&u.name, e))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let canonical = downscale_to_width(stitch_vertical(&images), max_width);
            info!(
                "Normalized {} image(s) → {}x{} px",
                images.len(),
                canonical.width(),
                canonical.height()
            );
            Ok(CanonicalArtifact::Image(canonical))
        }
        DeclaredKind::Docx | DeclaredKind::Pdf if uploads.len() > 1 => Err(ReviewError::Validation(
            format!("only one {:?} document can be submitted at a time", first.kind),
        )),
        DeclaredKind::Docx => extract_docx_text(&first.name, &first.bytes).map(CanonicalArtifact::Text),
        DeclaredKind::Pdf => extract_pdf_text(&first.name, &first.bytes).map(CanonicalArtifact::Text),
    }
}

/// Stack images top-to-bottom on a white canvas, left aligned.
///
/// Canvas width is the widest input; height is the sum of all heights.
/// Narrower images leave a white gutter on the right. Transparent pixels are
/// composited over white.
pub fn stitch_vertical(images: &[DynamicImage]) -> RgbImage {
    let total_width = images.iter().map(|i| i.width()).max().unwrap_or(0);
    let total_height: u32 = images.iter().map(|i| i.height()).sum();

    let mut canvas = RgbaImage::from_pixel(total_width, total_height, Rgba([255, 255, 255, 255]));
    let mut offset: i64 = 0;
    for img in images {
        imageops::overlay(&mut canvas, &img.to_rgba8(), 0, offset);
        offset += i64::from(img.height());
    }
    debug!("Stitched {} images → {}x{}", images.len(), total_width, total_height);

    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

/// Downscale so that width ≤ `max_width`, preserving aspect ratio. Never upscales.
pub fn downscale_to_width(img: RgbImage, max_width: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w <= max_width {
        return img;
    }
    let new_height = ((f64::from(h) * f64::from(max_width)) / f64::from(w)).round().max(1.0) as u32;
    debug!("Downscaling {}x{} → {}x{}", w, h, max_width, new_height);
    imageops::resize(&img, max_width, new_height, FilterType::Lanczos3)
}

/// Extract paragraph text from a `.docx`, joined by newlines in document order.
pub fn extract_docx_text(name: &str, bytes: &[u8]) -> Result<String, ReviewError> {
    use docx_rs::DocumentChild;

    let docx = docx_rs::read_docx(bytes).map_err(|e| ReviewError::parse(name, format!("{e:?}")))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(para) => Some(paragraph_text(para)),
            _ => None,
        })
        .collect();

    let text = paragraphs.join("\n");
    if text.trim().is_empty() {
        return Err(ReviewError::parse(name, "the document contains no text"));
    }
    debug!("Extracted {} paragraphs from {}", paragraphs.len(), name);
    Ok(text)
}

/// Paragraph → Run → Text; runs of one paragraph are concatenated as-is.
fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    use docx_rs::{ParagraphChild, RunChild};

    let mut text = String::new();
    for child in &para.children {
        if let ParagraphChild::Run(run) = child {
            for rc in &run.children {
                if let RunChild::Text(t) = rc {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// Extract page text from a PDF, joined by newlines in page order.
///
/// Fails when the PDF has no embedded text layer.
pub fn extract_pdf_text(name: &str, bytes: &[u8]) -> Result<String, ReviewError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ReviewError::parse(name, e))?;
    if doc.is_encrypted() {
        return Err(ReviewError::parse(name, "the PDF is encrypted"));
    }

    let pages: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|&page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                warn!("{}: page {} has no extractable text: {}", name, page_num, e);
                String::new()
            }
        })
        .collect();

    join_pages(name, pages)
}

/// Join per-page text with newlines, rejecting an all-blank result.
fn join_pages(name: &str, pages: Vec<String>) -> Result<String, ReviewError> {
    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(ReviewError::parse(
            name,
            "the PDF has no embedded text layer (scanned PDFs are not supported)",
        ));
    }
    let text = pages
        .iter()
        .map(|p| p.trim_end_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n");
    debug!("Extracted {} pages from {}", pages.len(), name);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn png_upload(name: &str, w: u32, h: u32, color: [u8; 3]) -> RawUpload {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        RawUpload::new(name, DeclaredKind::Image, buf).unwrap()
    }

    fn as_image(a: CanonicalArtifact) -> RgbImage {
        match a {
            CanonicalArtifact::Image(img) => img,
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn equal_width_stitch_sums_heights_in_order() {
        let uploads = vec![
            png_upload("a.png", 300, 100, [255, 0, 0]),
            png_upload("b.png", 300, 50, [0, 255, 0]),
            png_upload("c.png", 300, 70, [0, 0, 255]),
        ];
        let img = as_image(normalize(&uploads, 1024).unwrap());
        assert_eq!(img.dimensions(), (300, 220));
        assert_eq!(img.get_pixel(10, 10), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(10, 120), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(10, 200), &Rgb([0, 0, 255]));
    }

    #[test]
    fn narrow_images_leave_white_gutter_on_the_right() {
        let uploads = vec![
            png_upload("wide.png", 400, 20, [0, 0, 0]),
            png_upload("narrow.png", 100, 20, [0, 0, 0]),
        ];
        let img = as_image(normalize(&uploads, 1024).unwrap());
        assert_eq!(img.dimensions(), (400, 40));
        assert_eq!(img.get_pixel(50, 30), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(300, 30), &Rgb([255, 255, 255]));
    }

    #[test]
    fn wide_image_is_downscaled_preserving_aspect() {
        let uploads = vec![png_upload("wide.png", 1200, 900, [200, 200, 200])];
        let img = as_image(normalize(&uploads, 1024).unwrap());
        assert_eq!(img.width(), 1024);
        assert_eq!(img.height(), 768);
    }

    #[test]
    fn odd_aspect_rounds_height() {
        let img = RgbImage::new(3000, 1001);
        let out = downscale_to_width(img, 1024);
        assert_eq!(out.width(), 1024);
        // 1001 * 1024 / 3000 = 341.67
        assert_eq!(out.height(), 342);
    }

    #[test]
    fn small_image_is_never_upscaled() {
        let uploads = vec![png_upload("small.png", 640, 480, [1, 2, 3])];
        let img = as_image(normalize(&uploads, 1024).unwrap());
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[test]
    fn stitched_result_is_downscaled_too() {
        let uploads = vec![
            png_upload("a.png", 2048, 100, [0, 0, 0]),
            png_upload("b.png", 2048, 100, [0, 0, 0]),
        ];
        let img = as_image(normalize(&uploads, 1024).unwrap());
        assert_eq!(img.dimensions(), (1024, 100));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let rgba = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        let out = stitch_vertical(&[DynamicImage::ImageRgba8(rgba)]);
        assert_eq!(out.get_pixel(5, 5), &Rgb([255, 255, 255]));
    }

    #[test]
    fn empty_submission_is_rejected() {
        assert!(matches!(normalize(&[], 1024), Err(ReviewError::Validation(_))));
    }

    #[test]
    fn mixed_kinds_are_rejected() {
        let pdf = RawUpload::new("x.pdf", DeclaredKind::Pdf, b"%PDF-1.4".to_vec()).unwrap();
        let uploads = vec![png_upload("a.png", 10, 10, [0, 0, 0]), pdf];
        assert!(matches!(normalize(&uploads, 1024), Err(ReviewError::Validation(_))));
    }

    #[test]
    fn undecodable_image_is_parse_error() {
        let bogus = RawUpload::new("bogus.png", DeclaredKind::Image, b"not an image".to_vec()).unwrap();
        assert!(matches!(normalize(&[bogus], 1024), Err(ReviewError::Parse { .. })));
    }

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        use docx_rs::{Docx, Paragraph, Run};
        let mut docx = Docx::new();
        for p in paragraphs {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*p)));
        }
        let mut buf = Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn docx_paragraphs_join_with_newlines() {
        let bytes = docx_bytes(&["My Pet Cat", "She is orange.", "She sleeps a lot."]);
        let upload = RawUpload::new("cat.docx", DeclaredKind::Docx, bytes).unwrap();
        match normalize(&[upload], 1024).unwrap() {
            CanonicalArtifact::Text(t) => {
                assert_eq!(t, "My Pet Cat\nShe is orange.\nShe sleeps a lot.")
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn empty_docx_is_parse_error() {
        let bytes = docx_bytes(&[]);
        let upload = RawUpload::new("empty.docx", DeclaredKind::Docx, bytes).unwrap();
        assert!(matches!(normalize(&[upload], 1024), Err(ReviewError::Parse { .. })));
    }

    #[test]
    fn two_documents_are_rejected() {
        let a = RawUpload::new("a.docx", DeclaredKind::Docx, docx_bytes(&["a"])).unwrap();
        let b = RawUpload::new("b.docx", DeclaredKind::Docx, docx_bytes(&["b"])).unwrap();
        assert!(matches!(normalize(&[a, b], 1024), Err(ReviewError::Validation(_))));
    }

    #[test]
    fn corrupt_pdf_is_parse_error() {
        let upload =
            RawUpload::new("broken.pdf", DeclaredKind::Pdf, b"%PDF-1.4 garbage".to_vec()).unwrap();
        assert!(matches!(normalize(&[upload], 1024), Err(ReviewError::Parse { .. })));
    }

    /// A one-page PDF whose page has an empty content stream (no text layer).
    pub(crate) fn blank_pdf_bytes() -> Vec<u8> {
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    /// A PDF with one `Tj` text line per page, Courier Type1 font.
    fn text_pdf_bytes(pages: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn pdf_text_is_joined_in_page_order() {
        let bytes = text_pdf_bytes(&["My summer holiday", "We went to the sea"]);
        let upload = RawUpload::new("essay.pdf", DeclaredKind::Pdf, bytes).unwrap();
        let text = match normalize(&[upload], 1024).unwrap() {
            CanonicalArtifact::Text(t) => t,
            other => panic!("expected text, got {other:?}"),
        };

        let first = text.find("My summer holiday").expect("page 1 text");
        let second = text.find("We went to the sea").expect("page 2 text");
        assert!(first < second, "pages out of order: {text:?}");
        assert!(text[first..second].contains('\n'), "pages not newline-separated: {text:?}");
    }

    #[test]
    fn pdf_without_text_layer_is_parse_error() {
        let upload = RawUpload::new("scan.pdf", DeclaredKind::Pdf, blank_pdf_bytes()).unwrap();
        let err = normalize(&[upload], 1024).unwrap_err();
        assert!(matches!(err, ReviewError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn join_pages_rejects_blank_pages() {
        let err = join_pages("scan.pdf", vec!["  ".into(), "\n".into()]).unwrap_err();
        assert!(err.to_string().contains("no embedded text layer"));
    }

    #[test]
    fn join_pages_keeps_page_order() {
        let text = join_pages("ok.pdf", vec!["Page one\n".into(), "Page two".into()]).unwrap();
        assert_eq!(text, "Page one\nPage two");
    }
}
