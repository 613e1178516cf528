//! # edgequake-essay
//!
//! Feedback on handwritten primary-school essays using Vision Language Models.
//!
//! ## Why this crate?
//!
//! Reading a stack of handwritten essays and writing tailored feedback for
//! each child takes hours. This crate goes from photo to feedback in one pass: a
//! VLM transcribes the page, a person corrects the transcript, a text model
//! writes grade-appropriate feedback, and the result is rendered as spoken
//! audio, a shareable PNG card and a Word report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo(s) / .docx / .pdf
//!  │
//!  ├─ 1. Input       read local files or download URLs
//!  ├─ 2. Normalize   stitch + downscale images, or extract document text
//!  ├─ 3. Transcribe  VLM reads the handwriting verbatim (images only)
//!  ├─ 4. Confirm     a human corrects the transcript; nothing is graded unseen
//!  ├─ 5. Grade       text model writes four-section Markdown feedback
//!  └─ 6. Render      audio ∥ PNG card ∥ DOCX, each succeeding or failing alone
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_essay::{OutputSelection, ReviewConfig, Reviewer, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let reviewer = Reviewer::new(ReviewConfig::default());
//!     let mut session = Session::default();
//!
//!     reviewer.submit_inputs(&mut session, &["essay.jpg".to_string()]).await?;
//!     let transcript = reviewer.transcribe(&mut session).await?.text.clone();
//!
//!     // A person reviews and corrects `transcript` here.
//!     session.confirm(transcript)?;
//!
//!     let feedback = reviewer.grade(&mut session).await?;
//!     println!("{}", feedback.as_str());
//!
//!     let report = reviewer.render(&session, OutputSelection::all()).await?;
//!     for err in report.errors() {
//!         eprintln!("warning: {err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `essay-review` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-essay = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing Models
//!
//! | Stage | Default | Notes |
//! |-------|---------|-------|
//! | Transcription | `gpt-4.1-mini` | Handwriting needs the stronger vision model |
//! | Feedback      | `gpt-4.1-nano` | Short, structured Markdown; cheap is fine |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod review;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CardLayout, FontSource, GradeBand, GradingConfig, ReviewConfig, ReviewConfigBuilder, VoiceTone,
};
pub use error::{RenderError, ReviewError, ServiceError, ServiceKind};
pub use output::{ArtifactKind, OutputSelection, RenderReport, RenderedArtifact};
pub use pipeline::input::{load_upload, load_uploads, DeclaredKind, RawUpload};
pub use pipeline::llm::{LlmService, TextService, VisionService};
pub use pipeline::normalize::{normalize, CanonicalArtifact};
pub use progress::{NoopProgressCallback, PipelineStage, ProgressCallback, ReviewProgressCallback};
pub use prompts::{build_feedback_prompt, FeedbackPrompt};
pub use render::audio::{HttpSpeechSynthesizer, SpeechSynthesizer};
pub use render::OutputRenderer;
pub use review::Reviewer;
pub use session::{ConfirmedEssay, FeedbackText, Session, SessionStage, TranscriptOrigin, TranscriptText};
