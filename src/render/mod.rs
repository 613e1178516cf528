//! Output renderers: every artifact is a pure function of the feedback text.
//!
//! ```text
//!                     ┌──▶ audio     (speech service, char cap, voice from tone)
//! FeedbackText ───────┼──▶ card      (PNG, shared font cache)
//!                     └──▶ document  (DOCX)
//! ```
//!
//! [`OutputRenderer::render_all`] runs the three concurrently. Each result is
//! reported on its own; one failure never cancels or hides another.

pub mod audio;
pub mod card;
pub mod document;
pub mod font;

use crate::config::{GradingConfig, ReviewConfig};
use crate::error::{RenderError, ServiceError};
use crate::output::{OutputSelection, RenderReport, RenderedArtifact};
use crate::progress::{PipelineStage, ProgressCallback};
use crate::session::FeedbackText;
use audio::{HttpSpeechSynthesizer, SpeechSynthesizer};
use font::FontCache;
use std::sync::Arc;
use tracing::info;

/// Renders feedback into audio, a PNG card and a Word report.
#[derive(Clone)]
pub struct OutputRenderer {
    config: Arc<ReviewConfig>,
    fonts: Arc<FontCache>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
}

impl OutputRenderer {
    pub fn new(config: Arc<ReviewConfig>) -> Self {
        let fonts = FontCache::shared(&config.font_source, config.http_timeout_secs);
        Self {
            speech: config.speech.clone(),
            config,
            fonts,
        }
    }

    /// The process-wide font cache for the configured source.
    pub fn fonts(&self) -> &Arc<FontCache> {
        &self.fonts
    }

    fn synthesizer(&self) -> Result<Arc<dyn SpeechSynthesizer>, ServiceError> {
        if let Some(s) = &self.speech {
            return Ok(Arc::clone(s));
        }
        let http = HttpSpeechSynthesizer::new(
            &self.config.speech_endpoint,
            &self.config.speech_model,
            &self.config.speech_format,
            self.config.http_timeout_secs,
        )?;
        Ok(Arc::new(http))
    }

    pub async fn render_audio(
        &self,
        feedback: &FeedbackText,
        grading: &GradingConfig,
    ) -> Result<RenderedArtifact, RenderError> {
        let synth = self.synthesizer().map_err(RenderError::Synthesis)?;
        audio::render_audio(
            synth.as_ref(),
            feedback.as_str(),
            grading.tone.voice_id(),
            self.config.speech_char_limit,
            &self.config.speech_format,
        )
        .await
    }

    pub async fn render_card(&self, feedback: &FeedbackText) -> Result<RenderedArtifact, RenderError> {
        let font = self.fonts.get().await.clone();
        let text = feedback.as_str().to_string();
        let layout = self.config.card.clone();
        tokio::task::spawn_blocking(move || card::render_card(&text, &layout, &font))
            .await
            .map_err(|e| RenderError::Encode {
                detail: format!("render task failed: {e}"),
            })?
    }

    pub fn render_document(&self, feedback: &FeedbackText) -> Result<RenderedArtifact, RenderError> {
        document::render_document(feedback.as_str(), &self.config.document_attribution)
    }

    /// Render every selected artifact concurrently.
    pub async fn render_all(
        &self,
        feedback: &FeedbackText,
        grading: &GradingConfig,
        selection: OutputSelection,
    ) -> RenderReport {
        let cb = self.config.progress_callback.clone();

        let audio = async {
            if !selection.audio {
                return None;
            }
            Some(tracked(&cb, PipelineStage::RenderAudio, self.render_audio(feedback, grading)).await)
        };
        let card = async {
            if !selection.card {
                return None;
            }
            Some(tracked(&cb, PipelineStage::RenderCard, self.render_card(feedback)).await)
        };
        let document = async {
            if !selection.document {
                return None;
            }
            Some(tracked(&cb, PipelineStage::RenderDocument, async { self.render_document(feedback) }).await)
        };

        let (audio, card, document) = tokio::join!(audio, card, document);
        let report = RenderReport { audio, card, document };
        info!(
            "Rendered {} artifact(s), {} failed",
            report.artifacts().len(),
            report.errors().len()
        );
        report
    }
}

async fn tracked<F>(
    cb: &Option<ProgressCallback>,
    stage: PipelineStage,
    fut: F,
) -> Result<RenderedArtifact, RenderError>
where
    F: std::future::Future<Output = Result<RenderedArtifact, RenderError>>,
{
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    let result = fut.await;
    if let Some(cb) = cb {
        match &result {
            Ok(art) => cb.on_stage_complete(stage, &format!("{} bytes", art.size)),
            Err(e) => cb.on_stage_error(stage, &e.to_string()),
        }
    }
    result
}
