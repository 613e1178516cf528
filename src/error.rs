//! Error types for the edgequake-essay library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReviewError`]: **Stage-fatal**: the current stage cannot complete
//!   (unreadable upload, PDF without a text layer, vision call rejected).
//!   Returned as `Err(ReviewError)` from [`crate::review::Reviewer`] and
//!   [`crate::session::Session`] methods. The session itself stays usable.
//!
//! * [`RenderError`]: **Non-fatal**: one output artifact failed (speech
//!   service down, PNG encoding glitch) while the others are fine. Stored
//!   inside [`crate::output::RenderReport`] so a failed audio render never
//!   hides a finished feedback card.
//!
//! Font download failures are neither: they are logged and replaced by the
//! built-in glyph set (see [`crate::render::font`]).

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which hosted collaborator a [`ServiceError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServiceKind {
    /// Vision-to-text handwriting transcription.
    Vision,
    /// Text generation for feedback.
    Text,
    /// Speech synthesis.
    Speech,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceKind::Vision => "vision",
            ServiceKind::Text => "text generation",
            ServiceKind::Speech => "speech synthesis",
        };
        f.write_str(name)
    }
}

/// A hosted service returned a non-success status or the transport failed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{service} service failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ServiceError {
    pub service: ServiceKind,
    /// HTTP status when the service answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: ServiceKind, message: impl Into<String>) -> Self {
        Self {
            service,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// All stage-fatal errors returned by the edgequake-essay library.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// A document or image could not be decoded or yielded no usable text.
    #[error("Could not read {source_name}: {detail}")]
    Parse { source_name: String, detail: String },

    /// An action was attempted without its precondition (empty text,
    /// grading before confirmation, mixed upload kinds, …).
    #[error("{0}")]
    Validation(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// A hosted model call failed. Never retried automatically.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    pub(crate) fn parse(source_name: impl Into<String>, detail: impl fmt::Display) -> Self {
        ReviewError::Parse {
            source_name: source_name.into(),
            detail: detail.to_string(),
        }
    }

    /// `true` when retrying the same action with the same inputs may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReviewError::Service(_) | ReviewError::DownloadFailed { .. }
        )
    }
}

/// A non-fatal error for a single rendered artifact.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RenderError {
    /// The speech service rejected the request or was unreachable.
    #[error("audio: {0}")]
    Synthesis(ServiceError),

    /// Rasterising or encoding the feedback card failed.
    #[error("card: encoding failed: {detail}")]
    Encode { detail: String },

    /// Building the Word document failed.
    #[error("document: {detail}")]
    Document { detail: String },
}
