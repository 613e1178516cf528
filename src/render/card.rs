//! Feedback card: the feedback as a single tall PNG for sharing.
//!
//! Layout is fixed by [`CardLayout`]: a header band with the title and a
//! separator, one body line every `line_height` pixels, and a footer band with
//! a right-aligned watermark. The canvas height is computed from the wrapped
//! line count, so nothing is ever clipped.

use crate::config::CardLayout;
use crate::error::RenderError;
use crate::output::{ArtifactKind, RenderedArtifact};
use crate::pipeline::encode::encode_png;
use crate::pipeline::postprocess::strip_line;
use crate::render::font::CardFont;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

const MARGIN: i32 = 40;
const TITLE_SIZE: f32 = 36.0;
const BODY_SIZE: f32 = 22.0;
const FOOTER_SIZE: f32 = 16.0;

const BACKGROUND: Rgba<u8> = Rgba([255, 253, 246, 255]);
const TITLE_COLOR: Rgba<u8> = Rgba([40, 70, 120, 255]);
const RULE_COLOR: Rgba<u8> = Rgba([200, 200, 200, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([30, 30, 30, 255]);
const FOOTER_COLOR: Rgba<u8> = Rgba([150, 150, 150, 255]);

/// Soft-wrap one line to at most `width` characters.
///
/// Breaks at the last whitespace inside the budget; a run with no whitespace
/// (CJK text, long words) is hard-broken at exactly `width` characters.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    let mut rest: Vec<char> = line.trim_end().chars().collect();

    while rest.len() > width {
        let cut = match rest[..=width].iter().rposition(|c| c.is_whitespace()) {
            Some(pos) if pos > 0 => pos,
            _ => width,
        };
        let head: String = rest[..cut].iter().collect();
        if !head.trim().is_empty() {
            out.push(head.trim_end().to_string());
        }
        let next = rest[cut..]
            .iter()
            .position(|c| !c.is_whitespace())
            .map_or(rest.len(), |p| cut + p);
        rest.drain(..next);
    }
    if !rest.is_empty() {
        out.push(rest.into_iter().collect());
    }
    out
}

/// Body lines of the card: heading and bold markers stripped, wrapped, blank
/// lines dropped. Horizontal rules are kept as text and count as lines.
pub fn card_lines(feedback: &str, chars_per_line: usize) -> Vec<String> {
    feedback
        .lines()
        .map(strip_line)
        .filter(|l| !l.trim().is_empty())
        .flat_map(|l| wrap_line(&l, chars_per_line))
        .collect()
}

/// `header + lines × line_height + footer`.
pub fn card_height(layout: &CardLayout, lines: usize) -> u32 {
    layout.header_height + lines as u32 * layout.line_height + layout.footer_height
}

/// Render the feedback card as PNG.
pub fn render_card(
    feedback: &str,
    layout: &CardLayout,
    font: &CardFont,
) -> Result<RenderedArtifact, RenderError> {
    let lines = card_lines(feedback, layout.chars_per_line);
    let height = card_height(layout, lines.len());
    let mut img = RgbaImage::from_pixel(layout.width, height, BACKGROUND);

    font.draw(&mut img, TITLE_COLOR, MARGIN, 36, TITLE_SIZE, &layout.title);
    let rule_y = layout.header_height.saturating_sub(20) as i32;
    let rule_w = layout.width.saturating_sub(2 * MARGIN as u32).max(1);
    draw_filled_rect_mut(&mut img, Rect::at(MARGIN, rule_y).of_size(rule_w, 2), RULE_COLOR);

    for (i, line) in lines.iter().enumerate() {
        let y = layout.header_height + i as u32 * layout.line_height;
        font.draw(&mut img, TEXT_COLOR, MARGIN, y as i32, BODY_SIZE, line);
    }

    let footer_top = height - layout.footer_height;
    let mark_w = font.text_width(FOOTER_SIZE, &layout.watermark) as i32;
    let mark_x = (layout.width as i32 - MARGIN - mark_w).max(MARGIN);
    let mark_y = footer_top as i32 + (layout.footer_height as i32 - FOOTER_SIZE as i32) / 2;
    font.draw(&mut img, FOOTER_COLOR, mark_x, mark_y, FOOTER_SIZE, &layout.watermark);

    let png = encode_png(&DynamicImage::ImageRgba8(img)).map_err(|e| RenderError::Encode {
        detail: e.to_string(),
    })?;
    debug!(
        "Card: {} lines, {}x{} px, {} bytes (builtin font: {})",
        lines.len(),
        layout.width,
        height,
        png.len(),
        font.is_builtin()
    );
    Ok(RenderedArtifact::new(ArtifactKind::Card, "image/png", png))
}
