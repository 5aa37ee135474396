//! Font metrics and layout configuration.
//!
//! The engine never talks to a real font backend. It measures text through
//! the [`FontMetrics`] trait, which the host widget implements on top of its
//! painting stack, and receives all layout tuning through an explicit
//! [`LayoutConfig`] passed at construction.

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

/// Reference char used to derive the standard (fullwidth) char width.
pub const SAMPLE_CHAR: char = '\u{3000}';

/// Glyph measurement seam between the engine and the host's font backend.
///
/// Advances are in pixels. Implementations must be cheap per call; the
/// reflow loop measures one char at a time.
pub trait FontMetrics: Send + Sync {
    /// Horizontal advance of a single char.
    fn advance(&self, c: char) -> f64;

    /// Height of one text line (ascent + descent + leading).
    fn line_height(&self) -> f64;

    /// Advance of the fullwidth sample char; the first-line indent and the
    /// vertical-move reference x are both derived from this.
    fn standard_char_width(&self) -> f64 {
        self.advance(SAMPLE_CHAR)
    }

    /// Total advance of a char slice.
    fn text_width(&self, text: &[char]) -> f64 {
        text.iter().map(|&c| self.advance(c)).sum()
    }
}

/// Fixed-pitch metrics backed by unicode-width cell counts.
///
/// Halfwidth chars advance `cell_width` pixels, fullwidth chars twice that.
/// Good enough for headless use and tests; a GUI host supplies real glyph
/// advances instead.
#[derive(Debug, Clone)]
pub struct MonospaceMetrics {
    cell_width: f64,
    line_height: f64,
}

impl MonospaceMetrics {
    pub fn new(cell_width: f64, line_height: f64) -> Self {
        Self {
            cell_width,
            line_height,
        }
    }
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self::new(8.0, 18.0)
    }
}

impl FontMetrics for MonospaceMetrics {
    fn advance(&self, c: char) -> f64 {
        // Zero-width chars still occupy one offset but no pixels
        let cells = c.width().unwrap_or(0);
        cells as f64 * self.cell_width
    }

    fn line_height(&self) -> f64 {
        self.line_height
    }
}

/// Layout tuning threaded through constructors instead of global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Vertical gap between blocks in pixels.
    pub block_spacing: f64,

    /// Line stride as a multiple of the font's line height.
    pub line_spacing_ratio: f64,

    /// First-line indent in units of the standard (fullwidth) char width.
    pub indent_chars: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            block_spacing: 6.0,
            line_spacing_ratio: 1.0,
            indent_chars: 2,
        }
    }
}
