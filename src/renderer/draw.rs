//! Drawing traversal.
//!
//! Drawing runs the same stepping as measurement; alignment variants that
//! need a line's width pre-measure it with the identical routine, so glyphs
//! land exactly where a measuring pass predicted.

use crate::align::{baseline_offset, ContentHeight, VertMetrics};
use crate::error::Result;
use crate::fract::{Fract, Point, Quantization};
use crate::raster::Target;
use crate::renderer::measure::{split_line, Pen};
use crate::renderer::{Direction, Renderer, NO_RASTERIZER};
use crate::Align;

/// X where a line starts so that it honors the horizontal align relative
/// to the anchor.
pub(crate) fn line_origin(anchor_x: Fract, width: Fract, direction: Direction, horz: Align) -> Fract {
    match direction {
        Direction::LeftToRight => {
            if horz == Align::LEFT {
                anchor_x
            } else if horz == Align::HORZ_CENTER {
                anchor_x - width.half()
            } else {
                anchor_x - width
            }
        }
        Direction::RightToLeft => {
            if horz == Align::RIGHT {
                anchor_x
            } else if horz == Align::HORZ_CENTER {
                anchor_x + width.half()
            } else {
                anchor_x + width
            }
        }
    }
}

/// Snaps a line origin onto the quantization grid, toward text flow, so
/// that pen offsets within the line stay grid-aligned in absolute
/// coordinates.
pub(crate) fn quantize_origin(x: Fract, direction: Direction, horz: Quantization) -> Fract {
    match direction {
        Direction::LeftToRight => x.quantize_up(horz),
        Direction::RightToLeft => x.quantize_down(horz),
    }
}

impl Renderer {
    /// Whether the horizontal align requires each line's width up front.
    pub(crate) fn needs_line_width(&self) -> bool {
        let horz = self.state.align.horz();
        horz == Align::HORZ_CENTER
            || (self.state.direction == Direction::LeftToRight && horz == Align::RIGHT)
            || (self.state.direction == Direction::RightToLeft && horz == Align::LEFT)
    }

    pub(crate) fn vert_metrics(&mut self) -> VertMetrics {
        let mut metrics = self.metrics();
        VertMetrics {
            ascent: metrics.ascent(),
            cap_height: metrics.cap_height(),
            x_height: metrics.x_height(),
        }
    }

    /// Draws text with its anchor at (x, y), honoring the current align,
    /// direction and quantization. Returns the final pen position.
    pub fn draw(
        &mut self,
        target: &mut dyn Target,
        text: &str,
        x: impl Into<Fract>,
        y: impl Into<Fract>,
    ) -> Result<Point> {
        let anchor = Point::new(x.into(), y.into());
        assert!(self.rasterizer.is_some(), "{}", NO_RASTERIZER);
        let align = self.state.align;
        assert!(
            align.is_valid(),
            "align must carry exactly one flag per axis: {:?}",
            align
        );
        let direction = self.state.direction;
        let (horz_quant, vert_quant) = (self.state.horz_quant, self.state.vert_quant);

        // Vertical resolution; height-dependent variants measure once.
        let vert = align.vert();
        let vert_metrics = self.vert_metrics();
        let content = if vert == Align::VERT_CENTER
            || vert == Align::BOTTOM
            || vert == Align::LAST_BASELINE
        {
            let (measurement, advances) = self.measure_body(text)?;
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
            let (line, after) = split_line(rest);
            let line_width = if needs_line_width {
                self.measure_line(line)?.width
            } else {
                Fract::ZERO
            };
            let origin = quantize_origin(
                line_origin(anchor.x, line_width, direction, align.horz()),
                direction,
                horz_quant,
            );

            let mut pen = Pen::new(origin);
            for code_point in line.chars() {
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
            match after {
                Some(after) => {
                    nth_break += 1;
                    let advance = self.metrics().line_advance(nth_break);
                    y = (y + advance).quantize_up(vert_quant);
                    rest = after;
                }
                None => break,
            }
        }

        Ok(final_pen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fract::Quantization;
    use crate::testutil::{renderer_for_drawing, RecordingTarget, TestSizer};
    use crate::{Align, Direction};

    #[test]
    fn pen_advances_by_quantized_advance() {
        // Baseline|Left at whole-pixel quantization: after drawing 'A',
        // the next glyph starts exactly at advance('A') snapped up.
        let mut renderer = renderer_for_drawing();
        let mut target = RecordingTarget::new();

        let end = renderer.draw(&mut target, "A", 0, 0).unwrap();
        assert_eq!(
            end.x,
            TestSizer::ADVANCE.quantize_up(Quantization::Full)
        );

        let positions = target.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].x, 0);
    }

    #[test]
    fn drawing_matches_measurement_offsets() {
        let mut renderer = renderer_for_drawing();
        renderer.set_quantization(Quantization::None, Quantization::None);
        let mut target = RecordingTarget::new();

        renderer.draw(&mut target, "AVa", 0, 0).unwrap();
        let positions = target.positions();
        assert_eq!(positions.len(), 3);

        // Prefix measurements predict each pen position: a glyph is placed
        // at the width of the text before it minus nothing, kerning
        // included (the AV pair kerns by -2 px).
        let av = renderer.measure("AV").unwrap().width;
        assert_eq!(positions[0].x, 0);
        assert_eq!(positions[1].x, (av - TestSizer::ADVANCE).floor_pixels());
        assert_eq!(positions[2].x, av.floor_pixels());
    }

    #[test]
    fn centered_line_lands_where_measured() {
        let mut renderer = renderer_for_drawing();
        renderer.set_align(Align::HORZ_CENTER);
        let mut target = RecordingTarget::new();

        let width = renderer.measure("hey").unwrap().width;
        renderer.draw(&mut target, "hey", 100, 0).unwrap();

        let expected_origin = (Fract::from_pixels(100) - width.half())
            .quantize_up(Quantization::Full);
        assert_eq!(target.positions()[0].x, expected_origin.floor_pixels());
    }

    #[test]
    fn right_aligned_line_ends_at_anchor() {
        let mut renderer = renderer_for_drawing();
        renderer.set_align(Align::RIGHT);
        let mut target = RecordingTarget::new();

        let width = renderer.measure("hey").unwrap().width;
        let end = renderer.draw(&mut target, "hey", 200, 0).unwrap();
        assert_eq!(end.x, Fract::from_pixels(200));
        assert_eq!(
            target.positions()[0].x,
            (Fract::from_pixels(200) - width).floor_pixels()
        );
    }

    #[test]
    fn rtl_right_aligned_extends_leftward() {
        let mut renderer = renderer_for_drawing();
        renderer.set_direction(Direction::RightToLeft);
        renderer.set_align(Align::RIGHT);
        let mut target = RecordingTarget::new();

        renderer.draw(&mut target, "ab", 100, 0).unwrap();
        let positions = target.positions();
        // 'a' is placed rightmost, 'b' to its left.
        assert_eq!(positions.len(), 2);
        assert!(positions[1].x < positions[0].x);
        assert!(positions[0].x < 100);
    }

    #[test]
    fn vertical_align_shifts_the_baseline() {
        let mut renderer = renderer_for_drawing();
        let mut target = RecordingTarget::new();
        renderer.set_align(Align::TOP);
        renderer.draw(&mut target, "a", 0, 0).unwrap();
        let top = target.positions()[0];

        let mut target = RecordingTarget::new();
        renderer.set_align(Align::BASELINE);
        renderer.draw(&mut target, "a", 0, 0).unwrap();
        let baseline = target.positions()[0];

        assert_eq!(
            top.y - baseline.y,
            TestSizer::ASCENT.floor_pixels()
        );
    }

    #[test]
    fn multiline_advances_the_baseline() {
        let mut renderer = renderer_for_drawing();
        let mut target = RecordingTarget::new();
        renderer.draw(&mut target, "a\nb", 0, 0).unwrap();
        let positions = target.positions();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].x, positions[1].x);
        assert_eq!(
            positions[1].y - positions[0].y,
            TestSizer::LINE_HEIGHT.floor_pixels()
        );
    }

    #[test]
    fn subpixel_buckets_notify_the_cache() {
        use crate::testutil::{test_font, Notification, RecordingCache, StubRasterizer};
        let mut renderer = crate::Renderer::new();
        renderer.set_sizer(TestSizer::new());
        renderer.set_font(test_font());
        renderer.set_rasterizer(StubRasterizer::default());
        let (cache, log) = RecordingCache::new();
        renderer.set_cache_handler(cache);
        renderer.set_quantization(Quantization::Quarter, Quantization::Full);

        let mut target = RecordingTarget::new();
        // Advances are 10 px and 5.5 px, so the second '.' pen lands on a
        // different quarter-pixel bucket.
        renderer.draw(&mut target, ".a.", 0, 0).unwrap();
        let fract_changes: Vec<_> = log
            .borrow()
            .iter()
            .filter(|n| matches!(n, Notification::Fract(_)))
            .cloned()
            .collect();
        assert!(fract_changes.len() >= 2, "got {:?}", fract_changes);
    }
}
