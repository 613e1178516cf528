//! Progress-callback trait for per-stage review events.
//!
//! Inject an [`Arc<dyn ReviewProgressCallback>`] via
//! [`crate::config::ReviewConfigBuilder::progress_callback`] to be told when
//! each stage starts, finishes, or fails. The CLI uses it to drive a spinner
//! while the hosted models think.
//!
//! # Example
//!
//! ```rust
//! use edgequake_essay::{PipelineStage, ReviewConfig, ReviewProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ReviewProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: PipelineStage, detail: &str) {
//!         eprintln!("{stage} done: {detail}");
//!     }
//! }
//!
//! let config = ReviewConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ReviewProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One observable step of the review pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Normalize,
    Transcribe,
    Grade,
    RenderAudio,
    RenderCard,
    RenderDocument,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Normalize => "normalize",
            PipelineStage::Transcribe => "transcribe",
            PipelineStage::Grade => "grade",
            PipelineStage::RenderAudio => "audio",
            PipelineStage::RenderCard => "card",
            PipelineStage::RenderDocument => "document",
        };
        f.write_str(name)
    }
}

/// Called by [`crate::review::Reviewer`] around every stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The three render stages run concurrently and may
/// interleave their events.
pub trait ReviewProgressCallback: Send + Sync {
    /// Called just before a stage starts work (after cache checks).
    fn on_stage_start(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// Called when a stage succeeds.
    ///
    /// `detail` is a short human-readable summary, e.g. `"1024x1830 px"`.
    fn on_stage_complete(&self, stage: PipelineStage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called when a stage fails.
    fn on_stage_error(&self, stage: PipelineStage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReviewProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReviewConfig`].
pub type ProgressCallback = Arc<dyn ReviewProgressCallback>;
