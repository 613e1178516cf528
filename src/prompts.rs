//! Prompts for handwriting transcription and essay feedback.
//!
//! Every prompt lives here so a wording change touches exactly one place and
//! unit tests can inspect prompts without a live model. Prompt construction
//! is a pure function of its inputs: re-grading the same essay with the same
//! [`GradingConfig`] produces a byte-identical request.
//!
//! Callers can override the transcription instruction and the teacher
//! persona via [`crate::config::ReviewConfig`]; the constants here are used
//! only when no override is provided.

use crate::config::{GradeBand, GradingConfig};
use serde::{Deserialize, Serialize};

/// Instruction sent with the essay image to the vision model.
pub const DEFAULT_TRANSCRIPTION_PROMPT: &str = r#"Transcribe the handwritten essay in this image.

Rules:
- Copy the text exactly as the child wrote it, including spelling and punctuation mistakes
- Do NOT correct, improve, or complete anything
- Do NOT add a title, commentary, explanations, or Markdown formatting
- Keep the paragraph breaks you can see on the page
- If a character is unreadable, infer it from the surrounding context

Output ONLY the essay body."#;

/// Persona sent as the system message of the feedback request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an experienced primary-school language teacher \
with twenty years in the classroom: warm, patient and good at guiding children step by step. \
You review essays written by children and give feedback their parents can read aloud to them.";

/// The fixed four-section Markdown contract every feedback must follow.
pub const FEEDBACK_OUTPUT_CONTRACT: &str = r#"Reply in Markdown using exactly these four sections, in this order:

### 1. Highlights
Quote the best sentences or ideas and say why they work.

### 2. Error diagnosis
List every wrong character, misspelling or punctuation mistake as `wrong -> right`.
Write "None found" if there are none.

### 3. Improvement suggestions
Give two or three concrete suggestions a child of this age can act on.

### 4. Overall rating
Give a letter grade (A, B, C or D) followed by one encouraging sentence."#;

/// Emphasis clause for a grade band.
///
/// The mapping is fixed; each band picks exactly one clause.
pub fn band_emphasis(band: GradeBand) -> &'static str {
    match band {
        GradeBand::Lower => {
            "At this age, encourage completeness: praise every finished thought, \
and gently point out where a sentence or the story is unfinished."
        }
        GradeBand::Middle => {
            "At this age, emphasize clarity, detail and order: check that each sentence \
is clear, that descriptions have concrete details, and that events follow a sensible order."
        }
        GradeBand::Upper => {
            "At this age, emphasize theme, emotion and reflection: check that the essay has \
a clear central idea, conveys genuine feeling, and ends with some personal reflection."
        }
    }
}

/// A fully built feedback request: one system turn and one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPrompt {
    pub system: String,
    pub user: String,
}

/// Build the feedback request for `essay` under `grading`.
///
/// `system_override` replaces the teacher persona when set.
pub fn build_feedback_prompt(
    essay: &str,
    grading: &GradingConfig,
    system_override: Option<&str>,
) -> FeedbackPrompt {
    let system = system_override.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string();

    let user = format!(
        "Please review the following essay written by a {band} student.\n\
{emphasis}\n\
{tone}\n\n\
Essay:\n\"\"\"\n{essay}\n\"\"\"\n\n\
{contract}",
        band = grading.band.label(),
        emphasis = band_emphasis(grading.band),
        tone = grading.tone.prompt_clause(),
        essay = essay,
        contract = FEEDBACK_OUTPUT_CONTRACT,
    );

    FeedbackPrompt { system, user }
}
