//! Plain-text traversal and measurement.
//!
//! One per-glyph stepping rule is shared by every operation in the crate
//! (measure, draw, wrap, feed, twine) so that a measuring pass always
//! predicts drawing exactly:
//!
//! - left-to-right: add kerning, quantize the pen up, place, add advance;
//! - right-to-left: subtract visual-order kerning, subtract advance,
//!   quantize the pen down, place.
//!
//! An unquantized shadow pen is carried alongside for the line wrapper's
//! limit check.

use crate::error::Result;
use crate::fract::Fract;
use crate::renderer::{Direction, Measurement, Renderer};
use crate::sizer::GlyphIndex;

/// Pen state for one line of traversal. Positions are absolute: the pen
/// starts at the line origin.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Pen {
    /// Quantized pen position.
    pub x: Fract,
    /// Unquantized counterpart, for limit checks.
    pub raw_x: Fract,
    /// Previous glyph, for kerning. Cleared wherever kerning must not
    /// apply (line starts, forced repositions, effect boundaries).
    pub prev: Option<GlyphIndex>,
    /// Glyphs placed so far.
    pub placed: usize,
}

impl Pen {
    pub fn new(origin: Fract) -> Pen {
        Pen {
            x: origin,
            raw_x: origin,
            prev: None,
            placed: 0,
        }
    }
}

/// Per-line measurement result.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct LineMeasure {
    pub width: Fract,
    pub placed: usize,
    pub chars: usize,
}

/// Splits off the first line; the second element is the text after the
/// line break, if one was found.
pub(crate) fn split_line(text: &str) -> (&str, Option<&str>) {
    match text.find('\n') {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    }
}

impl Renderer {
    /// Advances the pen over one glyph and reports where it was placed.
    pub(crate) fn step(&mut self, pen: &mut Pen, glyph: GlyphIndex) -> Fract {
        match self.state.direction {
            Direction::LeftToRight => self.step_forward(pen, glyph),
            Direction::RightToLeft => self.step_reverse(pen, glyph),
        }
    }

    fn step_forward(&mut self, pen: &mut Pen, glyph: GlyphIndex) -> Fract {
        let horz = self.state.horz_quant;
        let mut metrics = self.metrics();
        if let Some(prev) = pen.prev {
            let kern = metrics.kern(prev, glyph);
            pen.x += kern;
            pen.raw_x += kern;
        }
        pen.x = pen.x.quantize_up(horz);
        let placed = pen.x;
        let advance = metrics.advance(glyph);
        pen.x += advance;
        pen.raw_x += advance;
        pen.prev = Some(glyph);
        pen.placed += 1;
        placed
    }

    fn step_reverse(&mut self, pen: &mut Pen, glyph: GlyphIndex) -> Fract {
        let horz = self.state.horz_quant;
        let mut metrics = self.metrics();
        if let Some(prev) = pen.prev {
            // The previous glyph sits to the right; kerning is queried in
            // visual left-to-right order.
            let kern = metrics.kern(glyph, prev);
            pen.x -= kern;
            pen.raw_x -= kern;
        }
        let advance = metrics.advance(glyph);
        pen.x -= advance;
        pen.raw_x -= advance;
        pen.x = pen.x.quantize_down(horz);
        let placed = pen.x;
        pen.prev = Some(glyph);
        pen.placed += 1;
        placed
    }

    /// Measures a single line (no `\n` expected in `line`).
    pub(crate) fn measure_line(&mut self, line: &str) -> Result<LineMeasure> {
        let mut pen = Pen::new(Fract::ZERO);
        let mut chars = 0;
        for code_point in line.chars() {
            chars += 1;
            let Some(glyph) = self.resolve_glyph(code_point)? else {
                continue;
            };
            self.step(&mut pen, glyph);
        }
        Ok(LineMeasure {
            width: pen.x.abs(),
            placed: pen.placed,
            chars,
        })
    }

    /// Measures the size the text would occupy if drawn.
    pub fn measure(&mut self, text: &str) -> Result<Measurement> {
        self.measure_body(text).map(|(measurement, _)| measurement)
    }

    /// The measuring pass proper. Also returns the sum of line advances
    /// (the first-to-last baseline distance) for last-baseline alignment.
    pub(crate) fn measure_body(&mut self, text: &str) -> Result<(Measurement, Fract)> {
        let vert = self.state.vert_quant;
        let mut width = Fract::ZERO;
        let mut chars = 0;
        let mut height = Fract::ZERO;
        let mut nth_break = 0u32;
        let mut any_content = false;

        let mut rest = text;
        loop {
            let (line, after) = split_line(rest);
            let line_measure = self.measure_line(line)?;
            chars += line_measure.chars;
            if line_measure.placed > 0 {
                any_content = true;
                nth_break = 0;
            }
            width = width.max(line_measure.width);

            match after {
                Some(after) => {
                    chars += 1; // the line break itself
                    nth_break += 1;
                    let advance = self.metrics().line_advance(nth_break);
                    height = (height + advance).quantize_up(vert);
                    rest = after;
                }
                None => break,
            }
        }

        let advances = height;
        // Text consisting solely of line breaks takes exactly the advances
        // already counted; anything else (including empty text) occupies
        // one more line.
        let solely_breaks = !any_content && text.contains('\n');
        if !solely_breaks {
            let line_height = self.metrics().line_height();
            height = (height + line_height).quantize_up(vert);
        }

        Ok((Measurement { width, height, chars }, advances))
    }
}
