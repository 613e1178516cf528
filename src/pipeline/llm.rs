//! Hosted-model calls: handwriting transcription and feedback generation.
//!
//! The two stages talk to their models through narrow traits,
//! [`VisionService`] and [`TextService`], so the pipeline and its tests never
//! depend on a particular vendor. [`LlmService`] implements both over any
//! `edgequake-llm` provider.
//!
//! There is no retry loop here: a failed call is reported to the
//! person at the keyboard, who decides whether to try again. Both stages are
//! idempotent, so a manual retry is always safe.

use crate::error::{ServiceError, ServiceKind};
use crate::pipeline::encode::image_data_from_path;
use crate::prompts::FeedbackPrompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Vision-to-text transcription of a staged essay image.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Transcribe the image at `image` following `instruction`.
    async fn transcribe(&self, image: &Path, instruction: &str) -> Result<String, ServiceError>;
}

/// Single-turn text generation for feedback.
#[async_trait]
pub trait TextService: Send + Sync {
    async fn generate(&self, prompt: &FeedbackPrompt) -> Result<String, ServiceError>;
}

/// [`VisionService`] + [`TextService`] backed by an `edgequake-llm` provider.
pub struct LlmService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    async fn chat(&self, kind: ServiceKind, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let start = Instant::now();
        match self.provider.chat(messages, Some(&self.options)).await {
            Ok(response) => {
                debug!(
                    "{} call: {} input tokens, {} output tokens, {:?}",
                    kind,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                warn!("{} call failed after {:?}: {}", kind, start.elapsed(), e);
                Err(ServiceError::new(kind, e.to_string()))
            }
        }
    }
}

#[async_trait]
impl VisionService for LlmService {
    /// The request is a single user turn carrying the instruction text and
    /// the page PNG as a base64 attachment.
    async fn transcribe(&self, image: &Path, instruction: &str) -> Result<String, ServiceError> {
        let image_data = image_data_from_path(image).await.map_err(|e| {
            ServiceError::new(
                ServiceKind::Vision,
                format!("cannot read staged image {}: {e}", image.display()),
            )
        })?;

        let messages = vec![ChatMessage::user_with_images(instruction, vec![image_data])];
        self.chat(ServiceKind::Vision, &messages).await
    }
}

#[async_trait]
impl TextService for LlmService {
    async fn generate(&self, prompt: &FeedbackPrompt) -> Result<String, ServiceError> {
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user(prompt.user.as_str()),
        ];
        self.chat(ServiceKind::Text, &messages).await
    }
}
