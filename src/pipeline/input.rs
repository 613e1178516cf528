//! Input resolution: turn user-supplied paths or URLs into [`RawUpload`]s.
//!
//! Each upload carries a [`DeclaredKind`] derived from its extension. Magic
//! bytes are checked up front (`%PDF` for PDF, `PK` for the DOCX zip
//! container) so a renamed file fails here with a readable message instead of
//! deep inside a parser.

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Image extensions accepted by the uploader.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// The declared format of an uploaded blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredKind {
    Image,
    Docx,
    Pdf,
}

impl DeclaredKind {
    /// Infer the kind from a file name or URL path.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        match ext.as_str() {
            "pdf" => Some(DeclaredKind::Pdf),
            "docx" => Some(DeclaredKind::Docx),
            e if IMAGE_EXTENSIONS.contains(&e) => Some(DeclaredKind::Image),
            _ => None,
        }
    }
}

/// One user-submitted blob, discarded after normalization.
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// File name or URL, used in error messages.
    pub name: String,
    pub kind: DeclaredKind,
    pub bytes: Vec<u8>,
}

impl RawUpload {
    /// Build an upload from in-memory bytes, validating magic bytes for documents.
    pub fn new(
        name: impl Into<String>,
        kind: DeclaredKind,
        bytes: Vec<u8>,
    ) -> Result<Self, ReviewError> {
        let name = name.into();
        check_magic(&name, kind, &bytes)?;
        Ok(Self { name, kind, bytes })
    }
}

fn check_magic(name: &str, kind: DeclaredKind, bytes: &[u8]) -> Result<(), ReviewError> {
    let expected: &[u8] = match kind {
        DeclaredKind::Pdf => b"%PDF",
        DeclaredKind::Docx => b"PK",
        DeclaredKind::Image => return Ok(()),
    };
    if !bytes.starts_with(expected) {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(ReviewError::parse(
            name,
            format!("not a valid {kind:?} file (first bytes: {magic:?})"),
        ));
    }
    Ok(())
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve one input string (local path or HTTP/HTTPS URL) into an upload.
pub async fn load_upload(
    input: &str,
    timeout_secs: Option<u64>,
) -> Result<RawUpload, ReviewError> {
    let kind = DeclaredKind::from_name(url_path(input)).ok_or_else(|| {
        ReviewError::Validation(format!(
            "unsupported file type for '{input}' (expected png, jpg, jpeg, docx or pdf)"
        ))
    })?;

    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };

    RawUpload::new(input, kind, bytes)
}

/// Resolve several inputs, keeping submission order.
pub async fn load_uploads(
    inputs: &[String],
    timeout_secs: Option<u64>,
) -> Result<Vec<RawUpload>, ReviewError> {
    let mut uploads = Vec::with_capacity(inputs.len());
    for input in inputs {
        uploads.push(load_upload(input, timeout_secs).await?);
    }
    Ok(uploads)
}

/// The path component of a URL (query and fragment removed), or the input itself.
fn url_path(input: &str) -> &str {
    if is_url(input) {
        input.split(['?', '#']).next().unwrap_or(input)
    } else {
        input
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ReviewError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ReviewError::PermissionDenied { path })
        }
        Err(_) => Err(ReviewError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: Option<u64>) -> Result<Vec<u8>, ReviewError> {
    info!("Downloading upload from: {}", url);

    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(std::time::Duration::from_secs(secs));
    }
    let client = builder.build().map_err(|e| ReviewError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
