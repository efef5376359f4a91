//! The metrics oracle.
//!
//! A [`Sizer`] turns an opaque font handle and a scaled size into glyph
//! indices, advances, kerning and line metrics. The layout engine never
//! inspects font data itself; every metric flows through this trait, which
//! makes the bundled [`FaceSizer`] replaceable by bitmap-font tables,
//! padded or rounded variants, or test fixtures.

mod face;

pub use face::{FaceSizer, MalformedFont};

use crate::fract::Fract;

slotmap::new_key_type! {
    /// Handle to a font registered with a [`Sizer`]. The null key means
    /// "no font set".
    pub struct FontId;
}

/// Index of a glyph within a font. Zero means "no mapping".
pub type GlyphIndex = u16;

/// Provider of glyph indices and scalable metrics for a font.
///
/// All sizes are the renderer's *scaled* size (logical size times display
/// scale) in fractional units. Implementations may cache per-(font, size)
/// state; [`Sizer::notify_change`] tells them when the renderer's active
/// font or size changes.
pub trait Sizer {
    /// Glyph index for a code point, or 0 if the font has no mapping.
    fn glyph_index(&mut self, font: FontId, code_point: char) -> GlyphIndex;

    /// Horizontal advance of a glyph.
    fn advance(&mut self, font: FontId, size: Fract, glyph: GlyphIndex) -> Fract;

    /// Kerning between two glyphs adjacent in visual left-to-right order.
    fn kern(&mut self, font: FontId, size: Fract, left: GlyphIndex, right: GlyphIndex) -> Fract;

    /// Vertical advance for a line break.
    ///
    /// `nth_consecutive_break` is 1-based: it is 1 for a break directly
    /// after printable content and grows by one for each consecutive blank
    /// line, so a sizer may implement "extra spacing after the Nth blank
    /// line" policies. The default policy is `line_height` regardless.
    fn line_advance(&mut self, font: FontId, size: Fract, nth_consecutive_break: u32) -> Fract {
        let _ = nth_consecutive_break;
        self.line_height(font, size)
    }

    /// Height of a single line.
    fn line_height(&mut self, font: FontId, size: Fract) -> Fract;

    fn ascent(&mut self, font: FontId, size: Fract) -> Fract;

    fn descent(&mut self, font: FontId, size: Fract) -> Fract;

    /// Height of lowercase letters above the baseline. Implementations
    /// without the metric should derive an approximation.
    fn x_height(&mut self, font: FontId, size: Fract) -> Fract;

    /// Height of uppercase letters above the baseline.
    fn cap_height(&mut self, font: FontId, size: Fract) -> Fract;

    /// Called by the renderer whenever the active font or scaled size
    /// changes, before the next metric query.
    fn notify_change(&mut self, font: FontId, size: Fract) {
        let _ = (font, size);
    }
}
