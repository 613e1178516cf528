//! Spoken feedback via an OpenAI-compatible speech endpoint.
//!
//! The feedback Markdown is flattened to plain text with
//! [`strip_markdown`](crate::pipeline::postprocess::strip_markdown), cut to the
//! configured character cap, and sent with the voice picked by the session's
//! [`VoiceTone`](crate::config::VoiceTone).

use crate::error::{RenderError, ServiceError, ServiceKind};
use crate::output::{ArtifactKind, RenderedArtifact};
use crate::pipeline::postprocess::strip_markdown;
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Text-to-speech seam.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, returning encoded audio bytes.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// [`SpeechSynthesizer`] over `POST {endpoint}` with a bearer token.
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    format: String,
    api_key: Option<String>,
}

impl HttpSpeechSynthesizer {
    /// Build a synthesizer; the API key is read from `OPENAI_API_KEY`.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        format: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, ServiceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ServiceError::new(ServiceKind::Speech, e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            format: format.into(),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ServiceError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            response_format: &self.format,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::new(ServiceKind::Speech, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail = detail.chars().take(300).collect::<String>();
            return Err(ServiceError::new(ServiceKind::Speech, detail).with_status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::new(ServiceKind::Speech, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Plain text sent for synthesis: Markdown stripped, at most `limit` chars.
pub fn speech_text(feedback: &str, limit: usize) -> String {
    let plain = strip_markdown(feedback);
    let plain = plain.trim();
    match plain.char_indices().nth(limit) {
        Some((cut, _)) => plain[..cut].to_string(),
        None => plain.to_string(),
    }
}

/// MIME type for a speech `response_format`.
pub fn audio_mime(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// Render the spoken version of `feedback`.
pub async fn render_audio(
    synthesizer: &dyn SpeechSynthesizer,
    feedback: &str,
    voice: &str,
    limit: usize,
    format: &str,
) -> Result<RenderedArtifact, RenderError> {
    let text = speech_text(feedback, limit);
    if text.is_empty() {
        return Err(RenderError::Synthesis(ServiceError::new(
            ServiceKind::Speech,
            "feedback has no speakable text",
        )));
    }

    let start = Instant::now();
    match synthesizer.synthesize(&text, voice).await {
        Ok(bytes) => {
            debug!(
                "Synthesized {} chars with voice '{}' → {} bytes in {:?}",
                text.chars().count(),
                voice,
                bytes.len(),
                start.elapsed()
            );
            Ok(RenderedArtifact::new(ArtifactKind::Audio, audio_mime(format), bytes))
        }
        Err(e) => {
            warn!("Audio render failed: {}", e);
            Err(RenderError::Synthesis(e))
        }
    }
}
