//! Pipeline integration tests with in-process model services.
//!
//! Every hosted collaborator (vision, text generation, speech) is replaced by
//! a recording mock, so these run offline and check exactly what the pipeline
//! sends and how it reacts to failures.

use async_trait::async_trait;
use edgequake_essay::render::card::{card_height, card_lines};
use edgequake_essay::{
    CanonicalArtifact, DeclaredKind, FeedbackPrompt, FontSource, GradeBand, GradingConfig,
    OutputSelection, PipelineStage, RawUpload, RenderError, ReviewConfig, ReviewError,
    ReviewProgressCallback, Reviewer, ServiceError, ServiceKind, Session, SessionStage,
    SpeechSynthesizer, TextService, TranscriptOrigin, VisionService, VoiceTone,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Mocks ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockVision {
    calls: Mutex<Vec<PathBuf>>,
    fail: bool,
}

#[async_trait]
impl VisionService for MockVision {
    async fn transcribe(&self, image: &Path, instruction: &str) -> Result<String, ServiceError> {
        assert!(image.exists(), "staged image must exist during the call");
        assert!(instruction.contains("Do NOT correct"));
        self.calls.lock().unwrap().push(image.to_path_buf());
        if self.fail {
            return Err(ServiceError::new(ServiceKind::Vision, "model refused").with_status(400));
        }
        Ok("```\nMy dog is my best frend.\nWe plays every day.\n```".to_string())
    }
}

struct MockText {
    prompts: Mutex<Vec<FeedbackPrompt>>,
    reply: String,
}

impl MockText {
    fn replying(reply: impl Into<String>) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: reply.into(),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextService for MockText {
    async fn generate(&self, prompt: &FeedbackPrompt) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
struct MockSpeech {
    inputs: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ServiceError> {
        self.inputs
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));
        if self.fail {
            return Err(ServiceError::new(ServiceKind::Speech, "service unavailable").with_status(503));
        }
        Ok(b"ID3 fake mp3".to_vec())
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl ReviewProgressCallback for EventLog {
    fn on_stage_start(&self, stage: PipelineStage) {
        self.0.lock().unwrap().push(format!("start:{stage}"));
    }
    fn on_stage_complete(&self, stage: PipelineStage, _detail: &str) {
        self.0.lock().unwrap().push(format!("done:{stage}"));
    }
    fn on_stage_error(&self, stage: PipelineStage, _error: &str) {
        self.0.lock().unwrap().push(format!("error:{stage}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const FEEDBACK: &str = "### 1. Highlights\n\
**You chose a topic you love.**\n\
### 2. Error diagnosis\n\
\"frend\" should be \"friend\"; \"We plays\" should be \"We play\".\n\
### 3. Improvement suggestions\n\
Tell us one game you play together.\n\
---\n\
### 4. Overall rating\n\
B\n";

struct Harness {
    vision: Arc<MockVision>,
    text: Arc<MockText>,
    speech: Arc<MockSpeech>,
    events: Arc<EventLog>,
    reviewer: Reviewer,
}

fn harness(vision: MockVision, text: MockText, speech: MockSpeech) -> Harness {
    let vision = Arc::new(vision);
    let text = Arc::new(text);
    let speech = Arc::new(speech);
    let events = Arc::new(EventLog::default());
    let config = ReviewConfig::builder()
        .vision_service(Arc::clone(&vision) as Arc<dyn VisionService>)
        .text_service(Arc::clone(&text) as Arc<dyn TextService>)
        .speech(Arc::clone(&speech) as Arc<dyn SpeechSynthesizer>)
        .font_source(FontSource::Builtin)
        .progress_callback(Arc::clone(&events) as Arc<dyn ReviewProgressCallback>)
        .build()
        .unwrap();
    Harness {
        vision,
        text,
        speech,
        events,
        reviewer: Reviewer::new(config),
    }
}

fn default_harness() -> Harness {
    harness(MockVision::default(), MockText::replying(FEEDBACK), MockSpeech::default())
}

fn photo(width: u32, height: u32) -> RawUpload {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        if (x / 20 + y / 20) % 2 == 0 {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([20, 20, 20])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    RawUpload::new("page.png", DeclaredKind::Image, buf.into_inner()).unwrap()
}

fn docx(paragraphs: &[&str]) -> RawUpload {
    use docx_rs::{Docx, Paragraph, Run};
    let mut doc = Docx::new();
    for p in paragraphs {
        doc = doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*p)));
    }
    let mut buf = Cursor::new(Vec::new());
    doc.build().pack(&mut buf).unwrap();
    RawUpload::new("essay.docx", DeclaredKind::Docx, buf.into_inner()).unwrap()
}

fn textless_pdf() -> RawUpload {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    RawUpload::new("scan.pdf", DeclaredKind::Pdf, buf).unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn photo_to_feedback_card() {
    let h = default_harness();
    let mut session = Session::new(GradingConfig::new(GradeBand::Middle, VoiceTone::Gentle));

    // 1200 px wide photo is downscaled to the 1024 px ceiling.
    let artifact = h.reviewer.submit(&mut session, vec![photo(1200, 900)]).await.unwrap();
    match artifact {
        CanonicalArtifact::Image(img) => {
            assert_eq!(img.width(), 1024);
            assert_eq!(img.height(), 768);
        }
        other => panic!("expected image, got {}", other.describe()),
    }

    let transcript = h.reviewer.transcribe(&mut session).await.unwrap();
    assert_eq!(transcript.origin, TranscriptOrigin::Vision);
    assert_eq!(transcript.text, "My dog is my best frend.\nWe plays every day.");

    session
        .confirm("My dog is my best friend.\nWe play every day.")
        .unwrap();
    let feedback = h.reviewer.grade(&mut session).await.unwrap().clone();
    assert_eq!(session.stage(), SessionStage::Graded);

    let prompts = h.text.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].user.contains("clarity, detail and order"));
    assert!(prompts[0].user.contains("My dog is my best friend."));
    assert!(!prompts[0].user.contains("frend"));

    let selection = OutputSelection {
        card: true,
        ..Default::default()
    };
    let report = h.reviewer.render(&session, selection).await.unwrap();
    let card = report.card.unwrap().unwrap();
    let png = image::load_from_memory(&card.bytes).unwrap();

    let layout = &h.reviewer.config().card;
    let lines = card_lines(feedback.as_str(), layout.chars_per_line).len();
    assert_eq!(png.height(), card_height(layout, lines));
    assert_eq!(png.height(), 120 + lines as u32 * 35 + 80);
}

#[tokio::test]
async fn two_photos_are_stitched_in_order() {
    let h = default_harness();
    let mut session = Session::default();
    let artifact = h
        .reviewer
        .submit(&mut session, vec![photo(600, 400), photo(400, 300)])
        .await
        .unwrap();
    match artifact {
        CanonicalArtifact::Image(img) => assert_eq!((img.width(), img.height()), (600, 700)),
        other => panic!("expected image, got {}", other.describe()),
    }
}

#[tokio::test]
async fn textless_pdf_fails_before_grading() {
    let h = default_harness();
    let mut session = Session::default();

    let err = h
        .reviewer
        .submit(&mut session, vec![textless_pdf()])
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Parse { .. }), "got {err:?}");
    assert_eq!(session.stage(), SessionStage::Empty);

    assert!(h.reviewer.transcribe(&mut session).await.is_err());
    assert!(h.reviewer.grade(&mut session).await.is_err());
    assert_eq!(h.text.calls(), 0);
    assert!(h.vision.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn docx_text_skips_vision() {
    let h = default_harness();
    let mut session = Session::default();
    h.reviewer
        .submit(&mut session, vec![docx(&["My Weekend", "I went to the park."])])
        .await
        .unwrap();

    let transcript = h.reviewer.transcribe(&mut session).await.unwrap();
    assert_eq!(transcript.origin, TranscriptOrigin::Extracted);
    assert_eq!(transcript.text, "My Weekend\nI went to the park.");
    assert!(h.vision.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn spoken_feedback_is_capped_at_800_chars() {
    let long = "Great effort. ".repeat(150);
    assert!(long.chars().count() > 2000);
    let h = harness(MockVision::default(), MockText::replying(long), MockSpeech::default());
    let mut session = Session::new(GradingConfig::new(GradeBand::Lower, VoiceTone::Cheerful));

    h.reviewer.submit(&mut session, vec![docx(&["I like cats."])]).await.unwrap();
    h.reviewer.transcribe(&mut session).await.unwrap();
    session.confirm("I like cats.").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();

    let selection = OutputSelection {
        audio: true,
        ..Default::default()
    };
    let report = h.reviewer.render(&session, selection).await.unwrap();
    let audio = report.audio.unwrap().unwrap();
    assert_eq!(audio.mime_type, "audio/mpeg");

    let inputs = h.speech.inputs.lock().unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].0.chars().count(), 800);
    assert_eq!(inputs[0].1, "shimmer");
}

#[tokio::test]
async fn staged_image_is_removed_when_vision_fails() {
    let vision = MockVision {
        fail: true,
        ..Default::default()
    };
    let h = harness(vision, MockText::replying(FEEDBACK), MockSpeech::default());
    let mut session = Session::default();
    h.reviewer.submit(&mut session, vec![photo(300, 200)]).await.unwrap();

    let err = h.reviewer.transcribe(&mut session).await.unwrap_err();
    match &err {
        ReviewError::Service(e) => {
            assert_eq!(e.status, Some(400));
            assert!(e.message.contains("sharp and upright"), "got {}", e.message);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.is_retryable());

    let staged = h.vision.calls.lock().unwrap().clone();
    assert_eq!(staged.len(), 1);
    assert!(!staged[0].exists(), "temp file must be gone after the call");
    assert_eq!(session.stage(), SessionStage::Normalized);
}

#[tokio::test]
async fn repeated_stages_reuse_cached_results() {
    let h = default_harness();
    let mut session = Session::default();
    h.reviewer.submit(&mut session, vec![photo(200, 200)]).await.unwrap();

    h.reviewer.transcribe(&mut session).await.unwrap();
    h.reviewer.transcribe(&mut session).await.unwrap();
    assert_eq!(h.vision.calls.lock().unwrap().len(), 1);

    session.confirm("My dog is my best friend.").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();
    session.confirm("My dog is my best friend.").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();
    assert_eq!(h.text.calls(), 1, "identical re-confirmation keeps feedback");

    session.confirm("My dog is my very best friend.").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();
    assert_eq!(h.text.calls(), 2, "edited text is graded again");

    session.set_grading(GradingConfig::new(GradeBand::Upper, VoiceTone::Calm));
    h.reviewer.grade(&mut session).await.unwrap();
    assert_eq!(h.text.calls(), 3, "new grade band is graded again");
    let last = h.text.prompts.lock().unwrap().last().cloned().unwrap();
    assert!(last.user.contains("theme, emotion and reflection"));
}

#[tokio::test]
async fn audio_failure_does_not_block_card_or_document() {
    let speech = MockSpeech {
        fail: true,
        ..Default::default()
    };
    let h = harness(MockVision::default(), MockText::replying(FEEDBACK), speech);
    let mut session = Session::default();
    h.reviewer.submit(&mut session, vec![docx(&["I like rain."])]).await.unwrap();
    h.reviewer.transcribe(&mut session).await.unwrap();
    session.confirm("I like rain.").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();

    let report = h.reviewer.render(&session, OutputSelection::all()).await.unwrap();
    match report.audio {
        Some(Err(RenderError::Synthesis(ref e))) => assert_eq!(e.status, Some(503)),
        ref other => panic!("unexpected audio result {other:?}"),
    }
    let card = report.card.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(card.mime_type, "image/png");
    let document = report.document.as_ref().unwrap().as_ref().unwrap();
    assert!(document.bytes.starts_with(b"PK"));
    assert_eq!(report.errors().len(), 1);
    assert_eq!(report.artifacts().len(), 2);

    let events = h.events.0.lock().unwrap();
    assert!(events.contains(&"error:audio".to_string()));
    assert!(events.contains(&"done:card".to_string()));
    assert!(events.contains(&"done:document".to_string()));
}

#[tokio::test]
async fn progress_events_follow_the_stages() {
    let h = default_harness();
    let mut session = Session::default();
    h.reviewer.submit(&mut session, vec![photo(100, 100)]).await.unwrap();
    h.reviewer.transcribe(&mut session).await.unwrap();
    session.confirm("text").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();

    let events = h.events.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start:normalize",
            "done:normalize",
            "start:transcribe",
            "done:transcribe",
            "start:grade",
            "done:grade",
        ]
    );
}

#[tokio::test]
async fn new_submission_resets_the_session() {
    let h = default_harness();
    let mut session = Session::default();
    h.reviewer.submit(&mut session, vec![docx(&["First essay."])]).await.unwrap();
    h.reviewer.transcribe(&mut session).await.unwrap();
    session.confirm("First essay.").unwrap();
    h.reviewer.grade(&mut session).await.unwrap();

    h.reviewer.submit(&mut session, vec![docx(&["Second essay."])]).await.unwrap();
    assert_eq!(session.stage(), SessionStage::Normalized);
    assert!(session.feedback().is_none());
    let transcript = h.reviewer.transcribe(&mut session).await.unwrap();
    assert_eq!(transcript.text, "Second essay.");
}

#[tokio::test]
async fn mixed_upload_kinds_are_rejected() {
    let h = default_harness();
    let mut session = Session::default();
    let err = h
        .reviewer
        .submit(&mut session, vec![photo(50, 50), docx(&["text"])])
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));
}
