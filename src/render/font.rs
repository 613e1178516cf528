//! Card font: fetched once per process, with a built-in fallback.
//!
//! [`FontCache`] wraps a `tokio::sync::OnceCell`: the first card render makes
//! the single acquisition attempt (download or file read) and every later
//! render reuses the outcome. When the attempt fails the cache settles on
//! [`CardFont::Builtin`], a 5×7 bitmap glyph set covering ASCII letters,
//! digits and common punctuation. Characters outside that set are drawn as
//! hollow boxes. Legibility degrades; rendering never fails.
//!
//! [`FontCache::shared`] hands out one cache per [`FontSource`] for the whole
//! process, so several reviewers never fetch the same font twice.

use crate::config::FontSource;
use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// A loaded font, or the built-in bitmap glyphs.
#[derive(Clone)]
pub enum CardFont {
    Vector(FontArc),
    Builtin,
}

impl std::fmt::Debug for CardFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardFont::Vector(_) => f.write_str("CardFont::Vector"),
            CardFont::Builtin => f.write_str("CardFont::Builtin"),
        }
    }
}

impl CardFont {
    pub fn is_builtin(&self) -> bool {
        matches!(self, CardFont::Builtin)
    }

    /// Draw `text` with its top-left corner at `(x, y)`.
    pub fn draw(&self, img: &mut RgbaImage, color: Rgba<u8>, x: i32, y: i32, size: f32, text: &str) {
        match self {
            CardFont::Vector(font) => draw_text_mut(img, color, x, y, PxScale::from(size), font, text),
            CardFont::Builtin => draw_builtin(img, color, x, y, builtin_scale(size), text),
        }
    }

    /// Rendered width of `text` in pixels.
    pub fn text_width(&self, size: f32, text: &str) -> u32 {
        match self {
            CardFont::Vector(font) => text_size(PxScale::from(size), font, text).0,
            CardFont::Builtin => {
                let advance = (GLYPH_WIDTH + 1) * builtin_scale(size);
                advance * text.chars().count() as u32
            }
        }
    }
}

static SHARED: Lazy<Mutex<HashMap<FontSource, Arc<FontCache>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Lazily loaded, shared font resource with a single acquisition attempt.
pub struct FontCache {
    source: FontSource,
    timeout_secs: Option<u64>,
    cell: OnceCell<CardFont>,
}

impl FontCache {
    pub fn new(source: FontSource, timeout_secs: Option<u64>) -> Self {
        Self {
            source,
            timeout_secs,
            cell: OnceCell::new(),
        }
    }

    /// The process-wide cache for `source`, created on first request.
    ///
    /// The timeout of the first caller applies to the one fetch.
    pub fn shared(source: &FontSource, timeout_secs: Option<u64>) -> Arc<FontCache> {
        let mut caches = SHARED.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            caches
                .entry(source.clone())
                .or_insert_with(|| Arc::new(FontCache::new(source.clone(), timeout_secs))),
        )
    }

    /// The font, loading it on first use. Never fails.
    pub async fn get(&self) -> &CardFont {
        self.cell
            .get_or_init(|| async {
                match load(&self.source, self.timeout_secs).await {
                    Ok(font) => font,
                    Err(reason) => {
                        warn!("Card font unavailable ({reason}); using built-in glyphs");
                        CardFont::Builtin
                    }
                }
            })
            .await
    }

    /// `true` once the acquisition attempt has been made.
    pub fn attempted(&self) -> bool {
        self.cell.initialized()
    }
}

async fn load(source: &FontSource, timeout_secs: Option<u64>) -> Result<CardFont, String> {
    let bytes = match source {
        FontSource::Builtin => return Ok(CardFont::Builtin),
        FontSource::File(path) => tokio::fs::read(path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?,
        FontSource::Url(url) => {
            info!("Downloading card font from {}", url);
            let mut builder = reqwest::Client::builder();
            if let Some(secs) = timeout_secs {
                builder = builder.timeout(Duration::from_secs(secs));
            }
            let client = builder.build().map_err(|e| e.to_string())?;
            let response = client.get(url).send().await.map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("HTTP {}", response.status()));
            }
            response.bytes().await.map_err(|e| e.to_string())?.to_vec()
        }
    };

    let font = FontArc::try_from_vec(bytes).map_err(|e| format!("invalid font data: {e}"))?;
    Ok(CardFont::Vector(font))
}

// ── Built-in glyphs ──────────────────────────────────────────────────────

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Rows top to bottom; bit 4 is the leftmost pixel.
type Glyph = [u8; GLYPH_HEIGHT as usize];

const MISSING: Glyph = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

fn builtin_scale(size: f32) -> u32 {
    ((size / 8.0).round() as u32).max(1)
}

fn glyph(c: char) -> Glyph {
    match c.to_ascii_uppercase() {
        ' ' => [0; 7],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ';' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '"' => [0x0A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '<' => [0x02, 0x04, 0x08, 0x10, 0x08, 0x04, 0x02],
        '>' => [0x08, 0x04, 0x02, 0x01, 0x02, 0x04, 0x08],
        '=' => [0x00, 0x00, 0x1F, 0x00, 0x1F, 0x00, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '*' => [0x00, 0x04, 0x15, 0x0E, 0x15, 0x04, 0x00],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        _ => MISSING,
    }
}

fn draw_builtin(img: &mut RgbaImage, color: Rgba<u8>, x: i32, y: i32, scale: u32, text: &str) {
    let advance = ((GLYPH_WIDTH + 1) * scale) as i32;
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as i32 * advance;
        if gx >= img.width() as i32 {
            break;
        }
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) != 0 {
                    let px = gx + (col * scale) as i32;
                    let py = y + (row as u32 * scale) as i32;
                    // draw_filled_rect_mut clips to the canvas.
                    draw_filled_rect_mut(img, Rect::at(px, py).of_size(scale, scale), color);
                }
            }
        }
    }
}
