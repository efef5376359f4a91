//! Rasterization and compositing boundary.
//!
//! The engine computes *where* glyphs go; turning outlines into coverage
//! and coverage into pixels happens behind the [`Rasterizer`] and
//! [`Target`] contracts.

use glam::{IVec2, UVec2};
use palette::Srgba;
use serde::{Deserialize, Serialize};

use crate::fract::{Fract, Point};
use crate::sizer::{FontId, GlyphIndex};

/// An alpha coverage bitmap for one glyph at one sub-pixel offset.
///
/// `left`/`top` offset the bitmap from the pen position: `left` grows
/// rightward, `top` is the distance the bitmap extends *above* the
/// baseline, matching the usual raster placement convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    /// Row-major coverage, `width * height` bytes.
    pub coverage: Vec<u8>,
}

impl Mask {
    /// Whether the mask covers no pixels. Whitespace glyphs rasterize to
    /// empty masks and are skipped at composite time.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes occupied by the coverage data, for cache budgeting.
    pub fn byte_size(&self) -> usize {
        self.coverage.len()
    }
}

/// Turns a glyph outline into an alpha mask at a sub-pixel offset.
///
/// `offset` carries only the sub-pixel parts of the pen position (both
/// components in `0..1` px); whole-pixel placement is the engine's job.
pub trait Rasterizer {
    fn rasterize(&mut self, font: FontId, glyph: GlyphIndex, size: Fract, offset: Point) -> Mask;
}

/// How composited glyphs combine with existing target content.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Over,
    Add,
    Multiply,
}

/// An opaque drawing surface.
///
/// The engine only positions masks; the target owns the compositing
/// algorithm (out of scope here).
pub trait Target {
    /// Pixel bounds of the surface.
    fn size(&self) -> UVec2;

    /// Draws a mask with its top-left corner at `origin` (whole pixels).
    fn composite(&mut self, mask: &Mask, origin: IVec2, color: Srgba<u8>, blend: BlendMode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_masks() {
        assert!(Mask::default().is_empty());
        let mask = Mask {
            width: 2,
            height: 2,
            left: 0,
            top: 2,
            coverage: vec![0; 4],
        };
        assert!(!mask.is_empty());
        assert_eq!(mask.byte_size(), 4);
    }
}
