//! Per-session state: the only place pipeline entities are held.
//!
//! A [`Session`] owns at most one of each entity and moves through
//! [`SessionStage`]s linearly:
//!
//! ```text
//! Empty ─submit─▶ Normalized ─transcribe─▶ Transcribed ─confirm─▶ Confirmed ─grade─▶ Graded
//!                                               ▲                    │  ▲               │
//!                                               └──── re-edit ───────┘  └── re-confirm ─┘
//! ```
//!
//! Submitting a new upload resets everything downstream. Re-confirming
//! identical text is a no-op that keeps cached feedback; confirming different
//! text discards it. Rendered outputs are not stored here: they are pure
//! functions of [`FeedbackText`] and are regenerated on demand.

use crate::config::GradingConfig;
use crate::error::ReviewError;
use crate::pipeline::normalize::CanonicalArtifact;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a transcript came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptOrigin {
    /// Read from an image by the vision service.
    Vision,
    /// Copied from a document's text layer.
    Extracted,
}

/// Text awaiting human correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptText {
    pub text: String,
    pub origin: TranscriptOrigin,
}

/// Human-approved essay text. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedEssay(String);

impl ConfirmedEssay {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Markdown feedback: the source of truth for every rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackText {
    pub markdown: String,
}

impl FeedbackText {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.markdown
    }
}

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionStage {
    Empty,
    Normalized,
    Transcribed,
    Confirmed,
    Graded,
}

/// Explicit session state passed by reference through every stage.
#[derive(Debug, Clone, Default)]
pub struct Session {
    grading: GradingConfig,
    artifact: Option<CanonicalArtifact>,
    transcript: Option<TranscriptText>,
    confirmed: Option<ConfirmedEssay>,
    feedback: Option<FeedbackText>,
}

impl Session {
    pub fn new(grading: GradingConfig) -> Self {
        Self {
            grading,
            ..Default::default()
        }
    }

    pub fn grading(&self) -> &GradingConfig {
        &self.grading
    }

    /// Change the grading choices. Cached feedback was produced under the old
    /// choices, so it is discarded when they differ.
    pub fn set_grading(&mut self, grading: GradingConfig) {
        if grading != self.grading {
            self.feedback = None;
            self.grading = grading;
        }
    }

    /// Drop every entity, keeping the grading choices.
    pub fn reset(&mut self) {
        self.artifact = None;
        self.transcript = None;
        self.confirmed = None;
        self.feedback = None;
    }

    /// Start a new submission cycle with a freshly normalized artifact.
    pub fn submit(&mut self, artifact: CanonicalArtifact) -> &CanonicalArtifact {
        self.reset();
        debug!("Session: new artifact ({})", artifact.describe());
        self.artifact.insert(artifact)
    }

    pub fn stage(&self) -> SessionStage {
        if self.feedback.is_some() {
            SessionStage::Graded
        } else if self.confirmed.is_some() {
            SessionStage::Confirmed
        } else if self.transcript.is_some() {
            SessionStage::Transcribed
        } else if self.artifact.is_some() {
            SessionStage::Normalized
        } else {
            SessionStage::Empty
        }
    }

    pub fn artifact(&self) -> Option<&CanonicalArtifact> {
        self.artifact.as_ref()
    }

    /// The editable surface of the correction gate.
    pub fn transcript(&self) -> Option<&TranscriptText> {
        self.transcript.as_ref()
    }

    pub fn confirmed(&self) -> Option<&ConfirmedEssay> {
        self.confirmed.as_ref()
    }

    pub fn feedback(&self) -> Option<&FeedbackText> {
        self.feedback.as_ref()
    }

    pub(crate) fn record_transcript(
        &mut self,
        text: String,
        origin: TranscriptOrigin,
    ) -> Result<&TranscriptText, ReviewError> {
        if self.artifact.is_none() {
            return Err(ReviewError::Validation(
                "nothing to transcribe: submit an upload first".into(),
            ));
        }
        self.confirmed = None;
        self.feedback = None;
        Ok(self.transcript.insert(TranscriptText { text, origin }))
    }

    /// Correction gate: accept the (possibly edited) essay text.
    ///
    /// Blank text is rejected. Confirming the text already confirmed is a
    /// no-op and keeps cached feedback; different text replaces the
    /// confirmation and discards feedback so grading runs again.
    pub fn confirm(&mut self, edited: impl Into<String>) -> Result<&ConfirmedEssay, ReviewError> {
        let edited = edited.into();
        if self.transcript.is_none() {
            return Err(ReviewError::Validation(
                "nothing to confirm: transcribe the upload first".into(),
            ));
        }
        if edited.trim().is_empty() {
            return Err(ReviewError::Validation(
                "the essay text is empty; type or paste the essay before confirming".into(),
            ));
        }

        let unchanged = self.confirmed.as_ref().is_some_and(|c| c.0 == edited);
        if !unchanged {
            debug!("Session: confirmed {} chars", edited.chars().count());
            self.feedback = None;
            self.confirmed = Some(ConfirmedEssay(edited));
        }
        self.confirmed
            .as_ref()
            .ok_or_else(|| ReviewError::Internal("confirmation vanished".into()))
    }

    pub(crate) fn record_feedback(&mut self, markdown: String) -> Result<&FeedbackText, ReviewError> {
        if self.confirmed.is_none() {
            return Err(ReviewError::Validation(
                "nothing to grade: confirm the essay text first".into(),
            ));
        }
        Ok(self.feedback.insert(FeedbackText::new(markdown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GradeBand, VoiceTone};

    fn transcribed() -> Session {
        let mut s = Session::default();
        s.submit(CanonicalArtifact::Text("raw".into()));
        s.record_transcript("I has a dog.".into(), TranscriptOrigin::Extracted)
            .unwrap();
        s
    }

    #[test]
    fn stages_advance_linearly() {
        let mut s = Session::default();
        assert_eq!(s.stage(), SessionStage::Empty);
        s.submit(CanonicalArtifact::Text("t".into()));
        assert_eq!(s.stage(), SessionStage::Normalized);
        s.record_transcript("t".into(), TranscriptOrigin::Extracted).unwrap();
        assert_eq!(s.stage(), SessionStage::Transcribed);
        s.confirm("t").unwrap();
        assert_eq!(s.stage(), SessionStage::Confirmed);
        s.record_feedback("### 1. Highlights".into()).unwrap();
        assert_eq!(s.stage(), SessionStage::Graded);
    }

    #[test]
    fn reconfirming_identical_text_is_idempotent() {
        let mut s = transcribed();
        let first = s.confirm("I have a dog.").unwrap().clone();
        s.record_feedback("feedback".into()).unwrap();

        let second = s.confirm("I have a dog.").unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(second.as_str().as_bytes(), b"I have a dog.");
        assert!(s.feedback().is_some(), "identical re-confirmation keeps feedback");
    }

    #[test]
    fn confirming_new_text_discards_feedback() {
        let mut s = transcribed();
        s.confirm("I have a dog.").unwrap();
        s.record_feedback("feedback".into()).unwrap();

        s.confirm("I have two dogs.").unwrap();
        assert!(s.feedback().is_none());
        assert_eq!(s.confirmed().unwrap().as_str(), "I have two dogs.");
        assert_eq!(s.stage(), SessionStage::Confirmed);
    }

    #[test]
    fn blank_confirmation_is_rejected() {
        let mut s = transcribed();
        assert!(matches!(s.confirm("  \n\t"), Err(ReviewError::Validation(_))));
        assert!(s.confirmed().is_none());
    }

    #[test]
    fn confirm_before_transcript_is_rejected() {
        let mut s = Session::default();
        assert!(matches!(s.confirm("text"), Err(ReviewError::Validation(_))));
    }

    #[test]
    fn feedback_requires_confirmation() {
        let mut s = transcribed();
        assert!(s.record_feedback("x".into()).is_err());
    }

    #[test]
    fn submit_resets_downstream_entities() {
        let mut s = transcribed();
        s.confirm("ok").unwrap();
        s.record_feedback("fb".into()).unwrap();

        s.submit(CanonicalArtifact::Text("new".into()));
        assert_eq!(s.stage(), SessionStage::Normalized);
        assert!(s.transcript().is_none());
        assert!(s.confirmed().is_none());
        assert!(s.feedback().is_none());
    }

    #[test]
    fn changing_grading_discards_feedback() {
        let mut s = transcribed();
        s.confirm("ok").unwrap();
        s.record_feedback("fb".into()).unwrap();

        s.set_grading(GradingConfig::default());
        assert!(s.feedback().is_some(), "same grading keeps feedback");

        s.set_grading(GradingConfig::new(GradeBand::Upper, VoiceTone::Calm));
        assert!(s.feedback().is_none());
        assert_eq!(s.grading().band, GradeBand::Upper);
    }
}
