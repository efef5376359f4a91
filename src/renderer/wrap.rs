//! Greedy line wrapping.
//!
//! Wrapping walks code points with the shared stepping rule, remembering
//! the last space as a safe break. The limit check uses the unquantized
//! shadow pen: a glyph whose pen only exceeds the limit after quantization
//! is still accepted, which keeps [`Renderer::measure`] and
//! [`Renderer::measure_with_wrap`] consistent for text with no wrap point.

use crate::align::{baseline_offset, ContentHeight};
use crate::error::{Error, Result};
use crate::fract::{Fract, Point};
use crate::raster::Target;
use crate::renderer::draw::{line_origin, quantize_origin};
use crate::renderer::measure::Pen;
use crate::renderer::{Measurement, Renderer, NO_RASTERIZER};
use crate::Align;

/// How a wrapped line ended.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LineChange {
    /// The line ended at the width limit rather than a `\n` or the end of
    /// the text.
    pub wrapped: bool,
    /// A trailing space was consumed without being placed.
    pub elided_space: bool,
}

struct WrappedLine<'a> {
    line: &'a str,
    /// Text after this line; `None` at end of text.
    next: Option<&'a str>,
    /// Code points consumed beyond `line` (an elided space or the break).
    extra_chars: usize,
    change: LineChange,
}

impl Renderer {
    /// Scans the next line under the width limit. Guarantees progress: a
    /// line holds at least one code point unless the text starts with a
    /// break or an overflowing space.
    fn next_wrapped_line<'a>(&mut self, text: &'a str, limit: Fract) -> Result<WrappedLine<'a>> {
        let mut pen = Pen::new(Fract::ZERO);
        let mut last_safe: Option<usize> = None;

        for (i, code_point) in text.char_indices() {
            if code_point == '\n' {
                return Ok(WrappedLine {
                    line: &text[..i],
                    next: Some(&text[i + 1..]),
                    extra_chars: 1,
                    change: LineChange::default(),
                });
            }
            let Some(glyph) = self.resolve_glyph(code_point)? else {
                continue;
            };
            let mut probe = pen;
            self.step(&mut probe, glyph);
            if probe.raw_x > limit {
                if code_point == ' ' {
                    // An overflowing space wraps and elides itself.
                    return Ok(WrappedLine {
                        line: &text[..i],
                        next: Some(&text[i + 1..]),
                        extra_chars: 1,
                        change: LineChange {
                            wrapped: true,
                            elided_space: true,
                        },
                    });
                }
                if let Some(space) = last_safe {
                    return Ok(WrappedLine {
                        line: &text[..space],
                        next: Some(&text[space + 1..]),
                        extra_chars: 1,
                        change: LineChange {
                            wrapped: true,
                            elided_space: true,
                        },
                    });
                }
                if pen.placed > 0 {
                    return Ok(WrappedLine {
                        line: &text[..i],
                        next: Some(&text[i..]),
                        extra_chars: 0,
                        change: LineChange {
                            wrapped: true,
                            elided_space: false,
                        },
                    });
                }
                // Nothing on the line yet: force-place this code point so
                // a single character is never refused.
            }
            pen = probe;
            if code_point == ' ' {
                last_safe = Some(i);
            }
        }

        Ok(WrappedLine {
            line: text,
            next: None,
            extra_chars: 0,
            change: LineChange::default(),
        })
    }

    /// Like [`Renderer::measure`], but wrapping lines at the width limit
    /// (absolute fractional units, unaffected by scale).
    pub fn measure_with_wrap(
        &mut self,
        text: &str,
        limit: impl Into<Fract>,
    ) -> Result<Measurement> {
        self.measure_with_wrap_body(text, limit.into())
            .map(|(measurement, _)| measurement)
    }

    pub(crate) fn measure_with_wrap_body(
        &mut self,
        text: &str,
        limit: Fract,
    ) -> Result<(Measurement, Fract)> {
        if self.state.direction.is_rtl() {
            return Err(Error::Unimplemented("right-to-left line wrapping"));
        }
        let vert_quant = self.state.vert_quant;
        let mut width = Fract::ZERO;
        let mut chars = 0;
        let mut height = Fract::ZERO;
        let mut nth_break = 0u32;
        let mut any_content = false;

        let mut rest = text;
        loop {
            let wrapped = self.next_wrapped_line(rest, limit)?;
            let line_measure = self.measure_line(wrapped.line)?;
            chars += line_measure.chars + wrapped.extra_chars;
            if line_measure.placed > 0 {
                any_content = true;
                nth_break = 0;
            }
            width = width.max(line_measure.width);

            match wrapped.next {
                Some(next) => {
                    nth_break += 1;
                    let advance = self.metrics().line_advance(nth_break);
                    height = (height + advance).quantize_up(vert_quant);
                    rest = next;
                }
                None => break,
            }
        }

        let advances = height;
        let solely_breaks = !any_content && text.contains('\n');
        if !solely_breaks {
            let line_height = self.metrics().line_height();
            height = (height + line_height).quantize_up(vert_quant);
        }

        Ok((Measurement { width, height, chars }, advances))
    }

    /// Like [`Renderer::draw`], but wrapping lines at the width limit.
    pub fn draw_with_wrap(
        &mut self,
        target: &mut dyn Target,
        text: &str,
        x: impl Into<Fract>,
        y: impl Into<Fract>,
        limit: impl Into<Fract>,
    ) -> Result<Point> {
        if self.state.direction.is_rtl() {
            return Err(Error::Unimplemented("right-to-left line wrapping"));
        }
        assert!(self.rasterizer.is_some(), "{}", NO_RASTERIZER);
        let align = self.state.align;
        assert!(
            align.is_valid(),
            "align must carry exactly one flag per axis: {:?}",
            align
        );
        let anchor = Point::new(x.into(), y.into());
        let limit = limit.into();
        let direction = self.state.direction;
        let (horz_quant, vert_quant) = (self.state.horz_quant, self.state.vert_quant);

        let vert = align.vert();
        let vert_metrics = self.vert_metrics();
        let content = if vert == Align::VERT_CENTER
            || vert == Align::BOTTOM
            || vert == Align::LAST_BASELINE
        {
            let (measurement, advances) = self.measure_with_wrap_body(text, limit)?;
            ContentHeight {
                height: measurement.height,
                advances,
            }
        } else {
            ContentHeight::default()
        };
        let mut y =
            (anchor.y + baseline_offset(vert, vert_metrics, || content)).quantize_up(vert_quant);

        let needs_line_width = self.needs_line_width();
        let mut nth_break = 0u32;
        let mut rest = text;
        let mut final_pen;
        loop {
            let wrapped = self.next_wrapped_line(rest, limit)?;
            let line_width = if needs_line_width {
                self.measure_line(wrapped.line)?.width
            } else {
                Fract::ZERO
            };
            let origin = quantize_origin(
                line_origin(anchor.x, line_width, direction, align.horz()),
                direction,
                horz_quant,
            );

            let mut pen = Pen::new(origin);
            for code_point in wrapped.line.chars() {
                let Some(glyph) = self.resolve_glyph(code_point)? else {
                    continue;
                };
                let placed = self.step(&mut pen, glyph);
                self.emit_glyph(target, glyph, Point { x: placed, y });
            }
            final_pen = Point { x: pen.x, y };

            if pen.placed > 0 {
                nth_break = 0;
            }
            match wrapped.next {
                Some(next) => {
                    nth_break += 1;
                    let advance = self.metrics().line_advance(nth_break);
                    y = (y + advance).quantize_up(vert_quant);
                    rest = next;
                }
                None => break,
            }
        }

        Ok(final_pen)
    }
}
