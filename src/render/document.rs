//! Word report: the feedback as a `.docx` built with `docx-rs`.
//!
//! Each non-blank feedback line becomes one paragraph:
//!
//! | line                 | paragraph                         |
//! |----------------------|-----------------------------------|
//! | `## Heading`         | "Heading 2" styled, markers gone  |
//! | `**whole line**`     | single bold run                   |
//! | anything else        | plain run, inline `**` removed    |
//!
//! Blank lines are dropped. A line that strips to nothing (a rule, a bare
//! `#`) keeps its raw text. A right-aligned attribution paragraph closes the
//! document.

use crate::error::RenderError;
use crate::output::{ArtifactKind, RenderedArtifact};
use crate::pipeline::postprocess::strip_line;
use docx_rs::{AlignmentType, Docx, Paragraph, Run, Style, StyleType};
use std::io::Cursor;
use tracing::debug;

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const HEADING_STYLE: &str = "Heading2";

/// How one feedback line is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocLine {
    Heading(String),
    Bold(String),
    Plain(String),
}

impl DocLine {
    pub fn text(&self) -> &str {
        match self {
            DocLine::Heading(t) | DocLine::Bold(t) | DocLine::Plain(t) => t,
        }
    }
}

/// Classify feedback lines: one entry per non-blank line, in order.
pub fn classify_lines(feedback: &str) -> Vec<DocLine> {
    feedback
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|trimmed| {
            let stripped = strip_line(trimmed);
            if stripped.trim().is_empty() {
                DocLine::Plain(trimmed.to_string())
            } else if trimmed.starts_with('#') {
                DocLine::Heading(stripped)
            } else if let Some(inner) = whole_line_bold(trimmed) {
                DocLine::Bold(inner.to_string())
            } else {
                DocLine::Plain(stripped)
            }
        })
        .collect()
}

fn whole_line_bold(line: &str) -> Option<&str> {
    let inner = line.strip_prefix("**")?.strip_suffix("**")?;
    (!inner.is_empty() && !inner.contains("**")).then_some(inner)
}

/// Render the Word report.
pub fn render_document(feedback: &str, attribution: &str) -> Result<RenderedArtifact, RenderError> {
    let lines = classify_lines(feedback);

    let mut docx = Docx::new().add_style(
        Style::new(HEADING_STYLE, StyleType::Paragraph)
            .name("Heading 2")
            .size(28)
            .bold(),
    );
    for line in &lines {
        let para = match line {
            DocLine::Heading(text) => Paragraph::new()
                .style(HEADING_STYLE)
                .add_run(Run::new().add_text(text.as_str())),
            DocLine::Bold(text) => Paragraph::new().add_run(Run::new().add_text(text.as_str()).bold()),
            DocLine::Plain(text) => Paragraph::new().add_run(Run::new().add_text(text.as_str())),
        };
        docx = docx.add_paragraph(para);
    }
    docx = docx.add_paragraph(
        Paragraph::new()
            .align(AlignmentType::Right)
            .add_run(Run::new().add_text(attribution).italic().size(18)),
    );

    let mut buf = Cursor::new(Vec::new());
    docx.build().pack(&mut buf).map_err(|e| RenderError::Document {
        detail: e.to_string(),
    })?;
    let bytes = buf.into_inner();
    debug!("Document: {} paragraphs, {} bytes", lines.len() + 1, bytes.len());
    Ok(RenderedArtifact::new(ArtifactKind::Document, DOCX_MIME, bytes))
}
