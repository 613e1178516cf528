//! Deterministic text cleanup around the hosted models.
//!
//! Two directions:
//!
//! * [`clean_transcript`]: strip the wrapping code fence some vision models
//!   add around their answer. Nothing inside the essay is touched: spelling
//!   mistakes are the child's and must reach the correction gate as written.
//! * [`strip_markdown`]: turn feedback Markdown into plain lines for speech:
//!   drop paired bold markers, heading markers and horizontal rules.
//!   [`strip_line`] alone serves the card and the Word report, where rules
//!   stay as text.

use once_cell::sync::Lazy;
use regex::Regex;

static OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A\s*```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```\s*\z").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s{0,3}#{1,6}\s*").unwrap());
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s{0,3}(?:(?:-\s*){3,}|(?:\*\s*){3,}|(?:_\s*){3,})$").unwrap());
static BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\s](?:.*?[^*\s])?)\*\*|__([^_\s](?:.*?[^_\s])?)__").unwrap());

/// Remove a single wrapping code fence and surrounding whitespace.
pub fn clean_transcript(raw: &str) -> String {
    match OUTER_FENCE.captures(raw) {
        Some(caps) => caps[1].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Strip heading markers and paired bold markers from one line.
///
/// Unpaired `**` or `__` (a fill-in blank, an identifier) is kept as written.
pub fn strip_line(line: &str) -> String {
    let without_heading = HEADING.replace(line, "");
    BOLD.replace_all(&without_heading, "${1}${2}").trim_end().to_string()
}

/// `true` for a Markdown horizontal rule (`---`, `***`, `___`, spaced or not).
pub fn is_rule(line: &str) -> bool {
    RULE.is_match(line)
}

/// Plain-text rendition of feedback Markdown, line structure preserved.
///
/// Horizontal rules are dropped entirely; headings and bold spans keep their
/// text without the markers.
pub fn strip_markdown(markdown: &str) -> String {
    markdown
        .lines()
        .filter(|l| !is_rule(l))
        .map(strip_line)
        .collect::<Vec<_>>()
        .join("\n")
}
