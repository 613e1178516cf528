//! Session-driven entry points: submit, transcribe, confirm, grade, render.
//!
//! A [`Reviewer`] holds the shared, read-only parts of the pipeline (config,
//! hosted-model services, font cache). All per-essay state lives in the
//! [`Session`] passed to each call, so one reviewer can serve many sessions.
//!
//! ```text
//! submit ──▶ transcribe ──▶ Session::confirm (human gate) ──▶ grade ──▶ render
//! ```

use crate::config::ReviewConfig;
use crate::error::{ReviewError, ServiceError};
use crate::output::{OutputSelection, RenderReport};
use crate::pipeline::encode::StagedImage;
use crate::pipeline::input::{self, RawUpload};
use crate::pipeline::llm::{LlmService, TextService, VisionService};
use crate::pipeline::normalize::{self, CanonicalArtifact};
use crate::pipeline::postprocess::clean_transcript;
use crate::progress::PipelineStage;
use crate::prompts::{build_feedback_prompt, DEFAULT_TRANSCRIPTION_PROMPT};
use crate::render::OutputRenderer;
use crate::session::{FeedbackText, Session, TranscriptOrigin, TranscriptText};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Appended to vision failures: the usual cause is a blurry or rotated photo.
pub const PHOTO_HINT: &str = "make sure the photo is sharp and upright, then try again";

/// Runs the review pipeline against caller-owned [`Session`]s.
pub struct Reviewer {
    config: Arc<ReviewConfig>,
    vision: OnceCell<Arc<dyn VisionService>>,
    text: OnceCell<Arc<dyn TextService>>,
    renderer: OutputRenderer,
}

impl Reviewer {
    /// Create a reviewer. Hosted-model providers are resolved on first use,
    /// so a session that never transcribes an image needs no vision key.
    pub fn new(config: ReviewConfig) -> Self {
        let config = Arc::new(config);
        Self {
            renderer: OutputRenderer::new(Arc::clone(&config)),
            vision: OnceCell::new(),
            text: OnceCell::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn renderer(&self) -> &OutputRenderer {
        &self.renderer
    }

    fn stage_start(&self, stage: PipelineStage) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    fn stage_done<T>(&self, stage: PipelineStage, result: &Result<T, ReviewError>, detail: impl FnOnce(&T) -> String) {
        if let Some(cb) = &self.config.progress_callback {
            match result {
                Ok(v) => cb.on_stage_complete(stage, &detail(v)),
                Err(e) => cb.on_stage_error(stage, &e.to_string()),
            }
        }
    }

    // ── Stage 1: submit ──────────────────────────────────────────────────

    /// Load local paths or URLs and submit them as one upload.
    pub async fn submit_inputs<'s>(
        &self,
        session: &'s mut Session,
        inputs: &[String],
    ) -> Result<&'s CanonicalArtifact, ReviewError> {
        let uploads = input::load_uploads(inputs, self.config.http_timeout_secs).await?;
        self.submit(session, uploads).await
    }

    /// Normalize `uploads` and start a new cycle in `session`.
    ///
    /// The session is reset before normalization, so a failed submission
    /// leaves it empty rather than holding a stale essay.
    pub async fn submit<'s>(
        &self,
        session: &'s mut Session,
        uploads: Vec<RawUpload>,
    ) -> Result<&'s CanonicalArtifact, ReviewError> {
        session.reset();
        self.stage_start(PipelineStage::Normalize);
        let start = Instant::now();

        let max_width = self.config.max_image_width;
        let result = tokio::task::spawn_blocking(move || normalize::normalize(&uploads, max_width))
            .await
            .map_err(|e| ReviewError::Internal(format!("normalize task panicked: {e}")))
            .and_then(|r| r);
        self.stage_done(PipelineStage::Normalize, &result, |a| a.describe());

        let artifact = result?;
        info!("Normalized upload in {:?}: {}", start.elapsed(), artifact.describe());
        Ok(session.submit(artifact))
    }

    // ── Stage 2: transcribe ──────────────────────────────────────────────

    /// Produce the transcript for the session's artifact.
    ///
    /// Extracted document text is copied as-is without any model call. An
    /// existing transcript is returned unchanged, so repeated calls never
    /// re-bill the vision model.
    pub async fn transcribe<'s>(&self, session: &'s mut Session) -> Result<&'s TranscriptText, ReviewError> {
        if session.transcript().is_some() {
            debug!("Transcript cached; skipping vision call");
            return session
                .transcript()
                .ok_or_else(|| ReviewError::Internal("transcript vanished".into()));
        }

        let artifact = session
            .artifact()
            .cloned()
            .ok_or_else(|| ReviewError::Validation("nothing to transcribe: submit an upload first".into()))?;

        self.stage_start(PipelineStage::Transcribe);
        let result = match artifact {
            CanonicalArtifact::Text(text) => Ok((text, TranscriptOrigin::Extracted)),
            CanonicalArtifact::Image(img) => self
                .transcribe_image(img)
                .await
                .map(|text| (text, TranscriptOrigin::Vision)),
        };
        self.stage_done(PipelineStage::Transcribe, &result, |(t, _)| {
            format!("{} chars", t.chars().count())
        });

        let (text, origin) = result?;
        if text.trim().is_empty() {
            warn!("Transcript is empty; the essay must be typed in before confirming");
        }
        session.record_transcript(text, origin)
    }

    async fn transcribe_image(&self, img: image::RgbImage) -> Result<String, ReviewError> {
        let vision = self.vision_service().await?;
        let staged = tokio::task::spawn_blocking(move || StagedImage::create(&img))
            .await
            .map_err(|e| ReviewError::Internal(format!("staging task panicked: {e}")))?
            .map_err(|e| ReviewError::Internal(format!("cannot stage image: {e}")))?;

        let instruction = self
            .config
            .transcription_prompt
            .as_deref()
            .unwrap_or(DEFAULT_TRANSCRIPTION_PROMPT);

        let start = Instant::now();
        let raw = vision
            .transcribe(staged.path(), instruction)
            .await
            .map_err(|e| {
                ReviewError::Service(ServiceError {
                    message: format!("{}; {}", e.message, PHOTO_HINT),
                    ..e
                })
            })?;
        drop(staged);

        info!("Transcribed image in {:?}", start.elapsed());
        Ok(clean_transcript(&raw))
    }

    // ── Stage 3: grade ───────────────────────────────────────────────────

    /// Generate feedback for the confirmed essay.
    ///
    /// Cached feedback is returned unchanged; confirming different text or
    /// changing the grading choices clears the cache.
    pub async fn grade<'s>(&self, session: &'s mut Session) -> Result<&'s FeedbackText, ReviewError> {
        if session.feedback().is_some() {
            debug!("Feedback cached; skipping text generation");
            return session
                .feedback()
                .ok_or_else(|| ReviewError::Internal("feedback vanished".into()));
        }

        let essay = session
            .confirmed()
            .ok_or_else(|| ReviewError::Validation("nothing to grade: confirm the essay text first".into()))?;
        let prompt = build_feedback_prompt(
            essay.as_str(),
            session.grading(),
            self.config.system_prompt.as_deref(),
        );

        self.stage_start(PipelineStage::Grade);
        let start = Instant::now();
        let result = match self.text_service().await {
            Ok(text) => text.generate(&prompt).await.map_err(ReviewError::from),
            Err(e) => Err(e),
        };
        self.stage_done(PipelineStage::Grade, &result, |f| {
            format!("{} chars", f.chars().count())
        });

        let markdown = result?;
        info!(
            "Graded essay ({}) in {:?}",
            session.grading().band.label(),
            start.elapsed()
        );
        session.record_feedback(markdown.trim().to_string())
    }

    // ── Stage 4: render ──────────────────────────────────────────────────

    /// Render the selected outputs from the session's feedback.
    pub async fn render(&self, session: &Session, selection: OutputSelection) -> Result<RenderReport, ReviewError> {
        let feedback = session
            .feedback()
            .ok_or_else(|| ReviewError::Validation("nothing to render: grade the essay first".into()))?;
        Ok(self
            .renderer
            .render_all(feedback, session.grading(), selection)
            .await)
    }

    // ── Service resolution ───────────────────────────────────────────────

    async fn vision_service(&self) -> Result<Arc<dyn VisionService>, ReviewError> {
        self.vision
            .get_or_try_init(|| async { self.build_vision() })
            .await
            .map(Arc::clone)
    }

    async fn text_service(&self) -> Result<Arc<dyn TextService>, ReviewError> {
        self.text
            .get_or_try_init(|| async { self.build_text() })
            .await
            .map(Arc::clone)
    }

    fn build_vision(&self) -> Result<Arc<dyn VisionService>, ReviewError> {
        if let Some(s) = &self.config.vision_service {
            return Ok(Arc::clone(s));
        }
        let provider = resolve_provider(&self.config, &self.config.vision_model)?;
        info!("Vision model: {}", self.config.vision_model);
        Ok(Arc::new(LlmService::new(
            provider,
            self.config.transcription_temperature,
            self.config.transcription_max_tokens,
        )))
    }

    fn build_text(&self) -> Result<Arc<dyn TextService>, ReviewError> {
        if let Some(s) = &self.config.text_service {
            return Ok(Arc::clone(s));
        }
        let provider = resolve_provider(&self.config, &self.config.text_model)?;
        info!("Text model: {}", self.config.text_model);
        Ok(Arc::new(LlmService::new(
            provider,
            self.config.feedback_temperature,
            self.config.feedback_max_tokens,
        )))
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| ReviewError::ProviderNotConfigured {
        provider: provider_name.to_string(),
        hint: format!("{e}"),
    })
}

/// Resolve the LLM provider for `model`, from most to least specific:
///
/// 1. `config.provider`: a pre-built provider, used as-is.
/// 2. `config.provider_name`: created through the factory, which reads the
///    matching API key from the environment.
/// 3. `EDGEQUAKE_LLM_PROVIDER` when set.
/// 4. OpenAI when `OPENAI_API_KEY` is present.
/// 5. Full auto-detection via `ProviderFactory::from_env`.
fn resolve_provider(config: &ReviewConfig, model: &str) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = &config.provider_name {
        return create_provider(name, model);
    }

    if let Ok(name) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        if !name.is_empty() {
            return create_provider(&name, model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| ReviewError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
            Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
            Error: {}",
            e
        ),
    })?;
    Ok(llm)
}
