//! Image encoding and the scoped file hand-off to the vision service.
//!
//! Vision providers read the essay from a file path, so the canonical image is
//! written to a [`StagedImage`]: a `NamedTempFile` that lives exactly as long
//! as the transcription call. Dropping it deletes the file on every exit
//! path, including errors and panics.
//!
//! PNG is used throughout: lossless compression keeps pen strokes crisp, and
//! JPEG artefacts around thin handwriting confuse vision models.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, RgbImage};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Encode any raster as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// A canonical image written to a temporary file for the duration of one call.
pub struct StagedImage {
    file: NamedTempFile,
}

impl StagedImage {
    /// Write `img` as PNG to a fresh temporary file.
    pub fn create(img: &RgbImage) -> std::io::Result<Self> {
        let png = encode_png(&DynamicImage::ImageRgb8(img.clone()))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = tempfile::Builder::new()
            .prefix("essay-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(&png)?;
        file.flush()?;
        debug!("Staged {} byte PNG at {}", png.len(), file.path().display());

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Read a staged PNG back as a base64 `ImageData` for the VLM request body.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; without
/// it small handwriting collapses into a single low-resolution tile.
pub async fn image_data_from_path(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
