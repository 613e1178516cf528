//! Output types: rendered artifacts and the per-artifact render report.

use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which renderer produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Audio,
    Card,
    Document,
}

/// Bytes derived purely from feedback text. Regenerable, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub kind: ArtifactKind,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Size of `bytes`; kept for JSON reports where the bytes are skipped.
    pub size: usize,
}

impl RenderedArtifact {
    pub fn new(kind: ArtifactKind, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            mime_type: mime_type.into(),
            size: bytes.len(),
            bytes,
        }
    }

    /// Write the artifact to `path` via a temp file + rename, so a crash
    /// never leaves a half-written file behind.
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, &self.bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

/// Which outputs to render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSelection {
    pub audio: bool,
    pub card: bool,
    pub document: bool,
}

impl OutputSelection {
    pub fn all() -> Self {
        Self {
            audio: true,
            card: true,
            document: true,
        }
    }
}

/// Independent results of a fan-out render. `None` means not requested.
///
/// One failed artifact never affects the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderReport {
    pub audio: Option<Result<RenderedArtifact, RenderError>>,
    pub card: Option<Result<RenderedArtifact, RenderError>>,
    pub document: Option<Result<RenderedArtifact, RenderError>>,
}

impl RenderReport {
    /// Errors of every requested artifact that failed.
    pub fn errors(&self) -> Vec<&RenderError> {
        [&self.audio, &self.card, &self.document]
            .into_iter()
            .filter_map(|r| r.as_ref().and_then(|r| r.as_ref().err()))
            .collect()
    }

    /// Every artifact that rendered successfully.
    pub fn artifacts(&self) -> Vec<&RenderedArtifact> {
        [&self.audio, &self.card, &self.document]
            .into_iter()
            .filter_map(|r| r.as_ref().and_then(|r| r.as_ref().ok()))
            .collect()
    }
}
