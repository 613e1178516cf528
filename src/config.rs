//! Configuration types for essay review.
//!
//! Two layers of configuration exist because they change at different rates:
//!
//! * [`GradingConfig`]: what the *teacher* picks per session: grade band and
//!   voice tone. Read by the feedback prompt builder and the audio renderer.
//! * [`ReviewConfig`]: how the *pipeline* talks to the outside world: models,
//!   providers, endpoints, image ceiling, card layout. Built via
//!   [`ReviewConfigBuilder`] and shared for the lifetime of a
//!   [`crate::review::Reviewer`].

use crate::error::ReviewError;
use crate::pipeline::llm::{TextService, VisionService};
use crate::progress::ProgressCallback;
use crate::render::audio::SpeechSynthesizer;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default font for feedback cards: Noto Sans CJK (covers Latin and Chinese).
pub const DEFAULT_FONT_URL: &str =
    "https://github.com/googlefonts/noto-cjk/raw/main/Sans/OTF/SimplifiedChinese/NotoSansCJKsc-Regular.otf";

/// Default OpenAI-compatible speech endpoint.
pub const DEFAULT_SPEECH_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

// ── Grading configuration ────────────────────────────────────────────────

/// School grade band of the essay's author.
///
/// Each band maps to exactly one emphasis clause in the feedback prompt
/// (see [`crate::prompts::band_emphasis`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeBand {
    /// Grades 1–2.
    Lower,
    /// Grades 3–4. (default)
    #[default]
    Middle,
    /// Grades 5–6.
    Upper,
}

impl GradeBand {
    pub fn label(&self) -> &'static str {
        match self {
            GradeBand::Lower => "lower-primary (grades 1-2)",
            GradeBand::Middle => "middle-primary (grades 3-4)",
            GradeBand::Upper => "upper-primary (grades 5-6)",
        }
    }
}

impl std::str::FromStr for GradeBand {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lower" | "low" | "1" | "2" => Ok(GradeBand::Lower),
            "middle" | "mid" | "3" | "4" => Ok(GradeBand::Middle),
            "upper" | "high" | "5" | "6" => Ok(GradeBand::Upper),
            other => Err(ReviewError::InvalidConfig(format!(
                "unknown grade band '{other}' (expected lower, middle or upper)"
            ))),
        }
    }
}

/// Tone of the feedback: shapes the prompt wording and picks the voice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceTone {
    /// Warm and encouraging. (default)
    #[default]
    Gentle,
    /// Lively and playful.
    Cheerful,
    /// Calm and precise.
    Calm,
    /// Gentle wording, caller-chosen voice identifier.
    Custom(String),
}

impl VoiceTone {
    /// Voice identifier sent to the speech service.
    pub fn voice_id(&self) -> &str {
        match self {
            VoiceTone::Gentle => "nova",
            VoiceTone::Cheerful => "shimmer",
            VoiceTone::Calm => "onyx",
            VoiceTone::Custom(id) => id,
        }
    }

    /// Wording clause injected into the feedback prompt.
    pub fn prompt_clause(&self) -> &'static str {
        match self {
            VoiceTone::Gentle | VoiceTone::Custom(_) => {
                "Write in a warm, patient and encouraging voice, like a favourite teacher."
            }
            VoiceTone::Cheerful => {
                "Write in a lively, playful voice that makes the child smile, with short sentences."
            }
            VoiceTone::Calm => "Write in a calm, precise voice; be kind but get straight to the point.",
        }
    }
}

impl std::str::FromStr for VoiceTone {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gentle" => Ok(VoiceTone::Gentle),
            "cheerful" => Ok(VoiceTone::Cheerful),
            "calm" => Ok(VoiceTone::Calm),
            "" => Err(ReviewError::InvalidConfig("voice tone must not be empty".into())),
            _ => Ok(VoiceTone::Custom(s.trim().to_string())),
        }
    }
}

/// Per-session choices made by the person requesting feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingConfig {
    pub band: GradeBand,
    pub tone: VoiceTone,
}

impl GradingConfig {
    pub fn new(band: GradeBand, tone: VoiceTone) -> Self {
        Self { band, tone }
    }
}

// ── Font source ──────────────────────────────────────────────────────────

/// Where the feedback card font comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontSource {
    /// Download once per process from this URL.
    Url(String),
    /// Read once per process from a local file.
    File(PathBuf),
    /// Skip loading and use the built-in glyph set.
    Builtin,
}

impl Default for FontSource {
    fn default() -> Self {
        FontSource::Url(DEFAULT_FONT_URL.to_string())
    }
}

// ── Card layout ──────────────────────────────────────────────────────────

/// Fixed geometry of the feedback card.
///
/// Card height is always `header_height + lines * line_height + footer_height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardLayout {
    /// Canvas width in pixels. Default: 800.
    pub width: u32,
    /// Soft-wrap budget in characters per line. Default: 32.
    pub chars_per_line: usize,
    /// Vertical advance per body line in pixels. Default: 35.
    pub line_height: u32,
    /// Band above the body holding the title and separator. Default: 120.
    pub header_height: u32,
    /// Band below the body holding the watermark. Default: 80.
    pub footer_height: u32,
    /// Title drawn in the header band.
    pub title: String,
    /// Watermark drawn in the footer band.
    pub watermark: String,
}

impl Default for CardLayout {
    fn default() -> Self {
        Self {
            width: 800,
            chars_per_line: 32,
            line_height: 35,
            header_height: 120,
            footer_height: 80,
            title: "Essay Feedback".to_string(),
            watermark: "edgequake-essay · AI teaching assistant".to_string(),
        }
    }
}

// ── Review configuration ─────────────────────────────────────────────────

/// Configuration for the essay review pipeline.
///
/// Built via [`ReviewConfig::builder()`] or using [`ReviewConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_essay::ReviewConfig;
///
/// let config = ReviewConfig::builder()
///     .max_image_width(1024)
///     .vision_model("gpt-4.1-mini")
///     .speech_char_limit(800)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ReviewConfig {
    /// Width ceiling for canonical images in pixels. Default: 1024.
    ///
    /// Wider images are downscaled proportionally; narrower ones are never
    /// upscaled. 1024 px keeps handwriting legible for the vision model while
    /// keeping the upload small.
    pub max_image_width: u32,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with the provider fields, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Model used for handwriting transcription. Default: "gpt-4.1-mini".
    pub vision_model: String,

    /// Model used for feedback generation. Default: "gpt-4.1-nano".
    pub text_model: String,

    /// Pre-constructed LLM provider for both stages. Takes precedence over
    /// `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-built vision service. Takes precedence over every provider field.
    pub vision_service: Option<Arc<dyn VisionService>>,

    /// Pre-built text service. Takes precedence over every provider field.
    pub text_service: Option<Arc<dyn TextService>>,

    /// Pre-built speech synthesizer. When None an HTTP synthesizer is built
    /// from `speech_endpoint` on first audio render.
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,

    /// Sampling temperature for transcription. Default: 0.1.
    ///
    /// Transcription must be faithful to the page; anything above ~0.2 starts
    /// "improving" the child's spelling.
    pub transcription_temperature: f32,

    /// Sampling temperature for feedback. Default: 0.7.
    pub feedback_temperature: f32,

    /// Maximum tokens per transcription. Default: 4096.
    pub transcription_max_tokens: usize,

    /// Maximum tokens per feedback. Default: 2048.
    pub feedback_max_tokens: usize,

    /// Custom transcription instruction. If None, uses the built-in default.
    pub transcription_prompt: Option<String>,

    /// Custom teacher persona (system message). If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Character cap for speech synthesis input. Default: 800.
    pub speech_char_limit: usize,

    /// OpenAI-compatible speech endpoint.
    pub speech_endpoint: String,

    /// Speech model identifier. Default: "tts-1".
    pub speech_model: String,

    /// Audio container requested from the speech service. Default: "mp3".
    pub speech_format: String,

    /// Card font source. Default: Noto Sans CJK download.
    pub font_source: FontSource,

    /// Card geometry.
    pub card: CardLayout,

    /// Right-aligned attribution appended to Word reports.
    pub document_attribution: String,

    /// Timeout for HTTP calls made by this crate (speech, font, URL inputs).
    /// None keeps the transport defaults. Default: None.
    pub http_timeout_secs: Option<u64>,

    /// Optional progress callback for stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_image_width: 1024,
            provider_name: None,
            vision_model: "gpt-4.1-mini".to_string(),
            text_model: "gpt-4.1-nano".to_string(),
            provider: None,
            vision_service: None,
            text_service: None,
            speech: None,
            transcription_temperature: 0.1,
            feedback_temperature: 0.7,
            transcription_max_tokens: 4096,
            feedback_max_tokens: 2048,
            transcription_prompt: None,
            system_prompt: None,
            speech_char_limit: 800,
            speech_endpoint: DEFAULT_SPEECH_ENDPOINT.to_string(),
            speech_model: "tts-1".to_string(),
            speech_format: "mp3".to_string(),
            font_source: FontSource::default(),
            card: CardLayout::default(),
            document_attribution: "Generated by edgequake-essay".to_string(),
            http_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("max_image_width", &self.max_image_width)
            .field("provider_name", &self.provider_name)
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("vision_service", &self.vision_service.as_ref().map(|_| "<dyn VisionService>"))
            .field("text_service", &self.text_service.as_ref().map(|_| "<dyn TextService>"))
            .field("speech", &self.speech.as_ref().map(|_| "<dyn SpeechSynthesizer>"))
            .field("transcription_temperature", &self.transcription_temperature)
            .field("feedback_temperature", &self.feedback_temperature)
            .field("speech_char_limit", &self.speech_char_limit)
            .field("speech_endpoint", &self.speech_endpoint)
            .field("font_source", &self.font_source)
            .field("card", &self.card)
            .finish()
    }
}

impl ReviewConfig {
    /// Create a new builder for `ReviewConfig`.
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReviewConfig`].
#[derive(Debug)]
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl ReviewConfigBuilder {
    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px.max(64);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn vision_service(mut self, service: Arc<dyn VisionService>) -> Self {
        self.config.vision_service = Some(service);
        self
    }

    pub fn text_service(mut self, service: Arc<dyn TextService>) -> Self {
        self.config.text_service = Some(service);
        self
    }

    pub fn speech(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.config.speech = Some(synthesizer);
        self
    }

    pub fn transcription_temperature(mut self, t: f32) -> Self {
        self.config.transcription_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn feedback_temperature(mut self, t: f32) -> Self {
        self.config.feedback_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn transcription_max_tokens(mut self, n: usize) -> Self {
        self.config.transcription_max_tokens = n;
        self
    }

    pub fn feedback_max_tokens(mut self, n: usize) -> Self {
        self.config.feedback_max_tokens = n;
        self
    }

    pub fn transcription_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.transcription_prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn speech_char_limit(mut self, n: usize) -> Self {
        self.config.speech_char_limit = n;
        self
    }

    pub fn speech_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.speech_endpoint = url.into();
        self
    }

    pub fn speech_model(mut self, model: impl Into<String>) -> Self {
        self.config.speech_model = model.into();
        self
    }

    pub fn speech_format(mut self, format: impl Into<String>) -> Self {
        self.config.speech_format = format.into();
        self
    }

    pub fn font_source(mut self, source: FontSource) -> Self {
        self.config.font_source = source;
        self
    }

    pub fn card(mut self, layout: CardLayout) -> Self {
        self.config.card = layout;
        self
    }

    pub fn document_attribution(mut self, text: impl Into<String>) -> Self {
        self.config.document_attribution = text.into();
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        if c.speech_char_limit == 0 {
            return Err(ReviewError::InvalidConfig(
                "speech_char_limit must be ≥ 1".into(),
            ));
        }
        if c.card.chars_per_line == 0 || c.card.line_height == 0 {
            return Err(ReviewError::InvalidConfig(
                "card chars_per_line and line_height must be ≥ 1".into(),
            ));
        }
        if c.card.width < 200 {
            return Err(ReviewError::InvalidConfig(format!(
                "card width must be ≥ 200 px, got {}",
                c.card.width
            )));
        }
        if c.vision_model.trim().is_empty() || c.text_model.trim().is_empty() {
            return Err(ReviewError::InvalidConfig("model names must not be empty".into()));
        }
        Ok(self.config)
    }
}
