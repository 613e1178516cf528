//! CLI binary for edgequake-essay.
//!
//! A thin shim over the library crate: maps CLI flags to `ReviewConfig`,
//! drives one session through the pipeline and writes the outputs.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_essay::{
    CardLayout, FontSource, GradeBand, GradingConfig, OutputSelection, PipelineStage,
    ProgressCallback, RenderedArtifact, ReviewConfig, ReviewProgressCallback, Reviewer, Session,
    VoiceTone,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner line for the running stage and a log line
/// per finished stage. Render stages run concurrently, so start times are
/// tracked per stage.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<PipelineStage, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, stage: PipelineStage) -> String {
        let secs = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&stage))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        format!("{secs:.1}s")
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ReviewProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: PipelineStage) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(stage, Instant::now());
        }
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("working…");
    }

    fn on_stage_complete(&self, stage: PipelineStage, detail: &str) {
        self.bar.println(format!(
            "  {} {:<11} {:<16} {}",
            green("✓"),
            stage.to_string(),
            dim(detail),
            dim(&self.elapsed(stage)),
        ));
    }

    fn on_stage_error(&self, stage: PipelineStage, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<11} {}  {}",
            red("✗"),
            stage.to_string(),
            red(&msg),
            dim(&self.elapsed(stage)),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photo in, feedback Markdown out (asks you to check the transcript first)
  essay-review essay.jpg

  # Two-page essay, upper-primary band, all outputs
  essay-review page1.jpg page2.jpg --grade upper \
      --audio feedback.mp3 --card feedback.png --docx feedback.docx

  # Correct the transcript in your editor before grading
  essay-review --edit essay.png -o feedback.md

  # Two-step: transcribe, fix by hand, then grade the corrected text
  essay-review --transcribe-only essay.jpg > essay.txt
  essay-review --corrected essay.txt essay.jpg -o feedback.md

  # Typed essays need no vision call
  essay-review homework.docx --tone cheerful

  # JSON report (transcript, feedback, artifact summary)
  essay-review --json essay.jpg --card card.png > report.json

GRADE BANDS:
  lower    grades 1-2   completeness, basic punctuation
  middle   grades 3-4   clarity, detail and order (default)
  upper    grades 5-6   theme, emotion and reflection

VOICE TONES:
  gentle (default, voice "nova"), cheerful ("shimmer"), calm ("onyx"),
  or any other string, passed to the speech service as the voice id.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (also used for speech synthesis)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDITOR                  Editor used by --edit (default: vi)
"#;

/// Handwritten essay feedback using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "essay-review",
    version,
    about = "Transcribe handwritten essays and generate grade-appropriate feedback",
    long_about = "Transcribe a photographed handwritten essay (or read a .docx/.pdf), let you \
correct the transcript, then generate teacher-style feedback tailored to the child's grade band. \
Feedback can additionally be rendered as spoken audio, a PNG card and a Word report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Essay photos (png/jpg, stitched in order), or one .docx/.pdf. Paths or URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Grade band: lower, middle, upper.
    #[arg(short, long, env = "ESSAY_GRADE", default_value = "middle")]
    grade: GradeBand,

    /// Feedback tone / voice: gentle, cheerful, calm, or a custom voice id.
    #[arg(short, long, env = "ESSAY_TONE", default_value = "gentle")]
    tone: VoiceTone,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Vision model used for transcription.
    #[arg(long, env = "ESSAY_VISION_MODEL", default_value = "gpt-4.1-mini")]
    vision_model: String,

    /// Text model used for feedback.
    #[arg(long, env = "ESSAY_TEXT_MODEL", default_value = "gpt-4.1-nano")]
    text_model: String,

    /// Write feedback Markdown to this file instead of stdout.
    #[arg(short, long, env = "ESSAY_OUTPUT")]
    output: Option<PathBuf>,

    /// Render spoken feedback to this file.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Render the feedback card (PNG) to this file.
    #[arg(long)]
    card: Option<PathBuf>,

    /// Render the Word report (DOCX) to this file.
    #[arg(long)]
    docx: Option<PathBuf>,

    /// Print a JSON report instead of Markdown.
    #[arg(long, env = "ESSAY_JSON")]
    json: bool,

    /// Stop after transcription and print the transcript.
    #[arg(long, conflicts_with_all = ["edit", "corrected"])]
    transcribe_only: bool,

    /// Open the transcript in $EDITOR before grading.
    #[arg(long, conflicts_with = "corrected")]
    edit: bool,

    /// Grade the text in this file instead of the raw transcript.
    #[arg(long)]
    corrected: Option<PathBuf>,

    /// Maximum width of the canonical image in pixels.
    #[arg(long, env = "ESSAY_MAX_WIDTH", default_value_t = 1024)]
    max_width: u32,

    /// Path to a text file containing a custom teacher persona.
    #[arg(long, env = "ESSAY_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Card font: a URL or a local font file.
    #[arg(long, env = "ESSAY_FONT")]
    font: Option<String>,

    /// Never download a card font; use the built-in glyphs.
    #[arg(long, conflicts_with = "font")]
    no_font_download: bool,

    /// OpenAI-compatible speech endpoint.
    #[arg(long, env = "ESSAY_SPEECH_ENDPOINT")]
    speech_endpoint: Option<String>,

    /// Character cap for spoken feedback.
    #[arg(long, env = "ESSAY_SPEECH_LIMIT", default_value_t = 800)]
    speech_limit: usize,

    /// HTTP timeout in seconds for downloads and speech synthesis.
    #[arg(long, env = "ESSAY_HTTP_TIMEOUT")]
    http_timeout: Option<u64>,

    /// Disable the progress spinner.
    #[arg(long, env = "ESSAY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ESSAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ESSAY_QUIET")]
    quiet: bool,
}

/// JSON report printed by `--json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    grading: &'a GradingConfig,
    transcript: Option<&'a str>,
    confirmed: Option<&'a str>,
    feedback: Option<&'a str>,
    outputs: Vec<JsonOutput>,
}

#[derive(Serialize)]
struct JsonOutput {
    path: PathBuf,
    #[serde(flatten)]
    artifact: Option<RenderedArtifact>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.edit;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|p| p as ProgressCallback),
    )
    .await?;
    let reviewer = Reviewer::new(config);
    let mut session = Session::new(GradingConfig::new(cli.grade, cli.tone.clone()));

    // ── Submit + transcribe ──────────────────────────────────────────────
    reviewer
        .submit_inputs(&mut session, &cli.inputs)
        .await
        .context("Could not read the essay")?;
    let transcript = reviewer
        .transcribe(&mut session)
        .await
        .context("Transcription failed")?
        .text
        .clone();

    if cli.transcribe_only {
        if let Some(p) = &progress {
            p.finish();
        }
        if cli.json {
            print_json(&session, Vec::new())?;
        } else {
            println!("{transcript}");
        }
        return Ok(());
    }

    // ── Correction gate ──────────────────────────────────────────────────
    let corrected = if let Some(path) = &cli.corrected {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read corrected text from {:?}", path))?
    } else if cli.edit {
        edit_in_editor(&transcript)?
    } else if io::stdin().is_terminal() && !cli.json {
        if let Some(p) = &progress {
            p.bar.suspend(|| review_interactively(&transcript))?
        } else {
            review_interactively(&transcript)?
        }
    } else {
        if !cli.quiet {
            eprintln!(
                "{} grading the transcript unreviewed; use --edit or --corrected to fix it first",
                cyan("⚠")
            );
        }
        transcript
    };
    session
        .confirm(corrected)
        .context("The essay text was not accepted")?;

    // ── Grade ────────────────────────────────────────────────────────────
    let feedback = reviewer
        .grade(&mut session)
        .await
        .context("Feedback generation failed")?
        .as_str()
        .to_string();

    // ── Render ───────────────────────────────────────────────────────────
    let selection = OutputSelection {
        audio: cli.audio.is_some(),
        card: cli.card.is_some(),
        document: cli.docx.is_some(),
    };
    let mut outputs = Vec::new();
    if selection != OutputSelection::default() {
        let report = reviewer
            .render(&session, selection)
            .await
            .context("Rendering failed")?;
        for (path, result) in [
            (&cli.audio, report.audio),
            (&cli.card, report.card),
            (&cli.docx, report.document),
        ] {
            let (Some(path), Some(result)) = (path, result) else {
                continue;
            };
            outputs.push(save_output(path, result).await);
        }
    }
    if let Some(p) = &progress {
        p.finish();
    }

    // ── Emit ─────────────────────────────────────────────────────────────
    let any_failed = outputs.iter().any(|o| o.error.is_some());
    if cli.json {
        print_json(&session, outputs)?;
    } else {
        match &cli.output {
            Some(path) => write_atomic(path, feedback.as_bytes())
                .await
                .with_context(|| format!("Failed to write feedback to {:?}", path))?,
            None => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(feedback.as_bytes())
                    .context("Failed to write to stdout")?;
                if !feedback.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
        }
        if !cli.quiet {
            for out in &outputs {
                match (&out.artifact, &out.error) {
                    (Some(a), _) => eprintln!(
                        "{} {}  {}",
                        green("✔"),
                        bold(&out.path.display().to_string()),
                        dim(&format!("{} bytes", a.size))
                    ),
                    (None, Some(e)) => eprintln!(
                        "{} {}  {}",
                        red("✘"),
                        bold(&out.path.display().to_string()),
                        red(e)
                    ),
                    (None, None) => {}
                }
            }
            if let Some(path) = &cli.output {
                eprintln!("{} feedback  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
    }

    if any_failed {
        std::process::exit(2);
    }
    Ok(())
}

/// Map CLI args to `ReviewConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReviewConfig> {
    let mut builder = ReviewConfig::builder()
        .max_image_width(cli.max_width)
        .vision_model(&cli.vision_model)
        .text_model(&cli.text_model)
        .speech_char_limit(cli.speech_limit)
        .card(CardLayout::default());

    if let Some(name) = &cli.provider {
        builder = builder.provider_name(name);
    }
    if let Some(path) = &cli.system_prompt {
        let persona = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(persona);
    }
    if cli.no_font_download {
        builder = builder.font_source(FontSource::Builtin);
    } else if let Some(font) = &cli.font {
        let source = if font.starts_with("http://") || font.starts_with("https://") {
            FontSource::Url(font.clone())
        } else {
            FontSource::File(PathBuf::from(font))
        };
        builder = builder.font_source(source);
    }
    if let Some(url) = &cli.speech_endpoint {
        builder = builder.speech_endpoint(url);
    }
    if let Some(secs) = cli.http_timeout {
        builder = builder.http_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Show the transcript and ask whether to accept, edit, or abort.
fn review_interactively(transcript: &str) -> Result<String> {
    eprintln!("{}", bold("Transcript (check it against the page):"));
    eprintln!("{}", dim("────────────────────────────────────────"));
    eprintln!("{transcript}");
    eprintln!("{}", dim("────────────────────────────────────────"));
    loop {
        eprint!("Accept [Y], edit [e] or quit [q]? ");
        io::stderr().flush().ok();
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read answer")?;
        match answer.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => return Ok(transcript.to_string()),
            "e" | "edit" => return edit_in_editor(transcript),
            "q" | "quit" => anyhow::bail!("Aborted before grading"),
            _ => continue,
        }
    }
}

/// Correct the transcript in `$EDITOR` through a scoped temp file.
fn edit_in_editor(transcript: &str) -> Result<String> {
    let mut file = tempfile::Builder::new()
        .prefix("essay-transcript-")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create a temp file for editing")?;
    file.write_all(transcript.as_bytes())
        .and_then(|_| file.flush())
        .context("Failed to write the transcript for editing")?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = std::process::Command::new(&editor)
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to launch editor '{editor}'"))?;
    if !status.success() {
        anyhow::bail!("Editor '{editor}' exited with {status}");
    }

    std::fs::read_to_string(file.path()).context("Failed to read back the edited transcript")
}

async fn save_output(
    path: &Path,
    result: Result<RenderedArtifact, edgequake_essay::RenderError>,
) -> JsonOutput {
    match result {
        Ok(artifact) => match artifact.save(path).await {
            Ok(()) => JsonOutput {
                path: path.to_path_buf(),
                artifact: Some(artifact),
                error: None,
            },
            Err(e) => JsonOutput {
                path: path.to_path_buf(),
                artifact: None,
                error: Some(format!("write failed: {e}")),
            },
        },
        Err(e) => JsonOutput {
            path: path.to_path_buf(),
            artifact: None,
            error: Some(e.to_string()),
        },
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

fn print_json(session: &Session, outputs: Vec<JsonOutput>) -> Result<()> {
    let report = JsonReport {
        grading: session.grading(),
        transcript: session.transcript().map(|t| t.text.as_str()),
        confirmed: session.confirmed().map(|c| c.as_str()),
        feedback: session.feedback().map(|f| f.as_str()),
        outputs,
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
    println!("{json}");
    Ok(())
}
