//! Manual glyph-by-glyph layout.
//!
//! A [`Feed`] is the escape hatch for callers that want full control over
//! the pen: no lookahead, no wrapping, no effects. It applies exactly the
//! same single-glyph kerning/advance/quantization rule as batch layout,
//! so feeding a string glyph by glyph reproduces [`Renderer::draw`] for a
//! left-aligned single line.

use crate::align::{baseline_offset, ContentHeight};
use crate::error::Result;
use crate::fract::{Fract, Point};
use crate::raster::Target;
use crate::renderer::measure::Pen;
use crate::renderer::Renderer;
use crate::sizer::GlyphIndex;

/// A user-driven layout cursor borrowed from a renderer.
pub struct Feed<'r> {
    renderer: &'r mut Renderer,
    /// Current pen position (baseline).
    pub position: Point,
    /// X the pen returns to after a line break.
    pub line_break_x: Fract,
    /// Consecutive line breaks so far; -1 suppresses break accounting
    /// after a forced reposition.
    nth_break: i32,
    prev_glyph: Option<GlyphIndex>,
}

impl Renderer {
    /// Starts a feed at the origin. Seed it with [`Feed::at`].
    pub fn feed(&mut self) -> Feed<'_> {
        Feed {
            renderer: self,
            position: Point::ZERO,
            line_break_x: Fract::ZERO,
            nth_break: 0,
            prev_glyph: None,
        }
    }
}

impl Feed<'_> {
    /// Repositions the pen at an anchor, honoring the renderer's vertical
    /// align for a single assumed line. Kerning and consecutive-break
    /// accounting are suppressed until content flows again.
    pub fn at(&mut self, x: impl Into<Fract>, y: impl Into<Fract>) {
        let x = x.into();
        let vert = self.renderer.state.align.vert();
        let vert_metrics = self.renderer.vert_metrics();
        let line_height = self.renderer.metrics().line_height();
        let content = ContentHeight {
            height: line_height,
            advances: Fract::ZERO,
        };
        let vert_quant = self.renderer.state.vert_quant;
        let baseline =
            (y.into() + baseline_offset(vert, vert_metrics, || content)).quantize_up(vert_quant);

        self.position = Point { x, y: baseline };
        self.line_break_x = x;
        self.nth_break = -1;
        self.prev_glyph = None;
    }

    /// Restores the zero state for reuse.
    pub fn reset(&mut self) {
        self.position = Point::ZERO;
        self.line_break_x = Fract::ZERO;
        self.nth_break = 0;
        self.prev_glyph = None;
    }

    fn step_glyph(&mut self, glyph: GlyphIndex) -> Point {
        let mut pen = Pen {
            x: self.position.x,
            raw_x: self.position.x,
            prev: self.prev_glyph,
            placed: 0,
        };
        let placed = self.renderer.step(&mut pen, glyph);
        self.position.x = pen.x;
        self.prev_glyph = Some(glyph);
        self.nth_break = 0;
        Point {
            x: placed,
            y: self.position.y,
        }
    }

    /// Advances the pen over a code point without drawing.
    pub fn advance(&mut self, code_point: char) -> Result<()> {
        if code_point == '\n' {
            self.line_break();
            return Ok(());
        }
        if let Some(glyph) = self.renderer.resolve_glyph(code_point)? {
            self.step_glyph(glyph);
        }
        Ok(())
    }

    /// Draws a code point at the pen and advances.
    pub fn draw(&mut self, target: &mut dyn Target, code_point: char) -> Result<()> {
        if code_point == '\n' {
            self.line_break();
            return Ok(());
        }
        if let Some(glyph) = self.renderer.resolve_glyph(code_point)? {
            let pos = self.step_glyph(glyph);
            self.renderer.emit_glyph(target, glyph, pos);
        }
        Ok(())
    }

    /// Advances over a raw glyph index, bypassing resolution.
    pub fn advance_glyph(&mut self, glyph: GlyphIndex) {
        self.step_glyph(glyph);
    }

    pub fn draw_glyph(&mut self, target: &mut dyn Target, glyph: GlyphIndex) {
        let pos = self.step_glyph(glyph);
        self.renderer.emit_glyph(target, glyph, pos);
    }

    /// Moves the pen to the start of the next line.
    pub fn line_break(&mut self) {
        let nth = (self.nth_break.max(0) + 1) as u32;
        self.nth_break = nth as i32;
        let advance = self.renderer.metrics().line_advance(nth);
        let vert_quant = self.renderer.state.vert_quant;
        self.position.y = (self.position.y + advance).quantize_up(vert_quant);
        self.position.x = self.line_break_x;
        self.prev_glyph = None;
    }
}
