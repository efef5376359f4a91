//! Twine interpretation: control-code decoding and the two-pass
//! measure/draw protocol.
//!
//! Each drawn line runs twice. The measuring sub-pass walks the line with
//! soft pops (the stack is restored afterwards) and records every effect
//! event's advance in a journal; its width feeds horizontal alignment.
//! The drawing pass replays the same control codes from a snapshot of the
//! cursor, stack and render state, consuming the journal so that geometry
//! is bit-identical, and its pops are hard. The stack active at the start
//! of drawing a line is therefore always identical to the stack at the
//! start of measuring it; a divergence panics.

use smallvec::SmallVec;

use crate::align::{baseline_offset, ContentHeight};
use crate::error::{Error, Result};
use crate::fract::{Fract, Point};
use crate::raster::Target;
use crate::renderer::draw::{line_origin, quantize_origin};
use crate::renderer::measure::Pen;
use crate::renderer::{Direction, EffectTable, Measurement, Renderer, NO_RASTERIZER};
use crate::sizer::GlyphIndex;
use crate::twine::effect::{
    EffectArgs, EffectKey, EffectOp, EffectSpacing, EffectTrigger, Journal, JournalEntry, PassMode,
};
use crate::twine::{Opcode, Twine, CC_BEGIN, LINE_BREAK};
use crate::Align;

/// Decode position within a twine buffer.
#[derive(Copy, Clone, Debug)]
struct Cursor {
    pos: usize,
    glyph_mode: bool,
}

enum Atom {
    Char(char),
    Glyph(GlyphIndex),
    LineBreak,
    Control(Control),
    End,
}

enum Control {
    RefreshLineMetrics,
    PushLineRestartMarker,
    ClearLineRestartMarker,
    PushEffect {
        key: EffectKey,
        payload: std::ops::Range<usize>,
        mode: PassMode,
        spacing: Option<EffectSpacing>,
    },
    Pop,
    PopAll,
}

fn utf8_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

fn decode_effect_push(
    buf: &[u8],
    cursor: &mut Cursor,
    mode: PassMode,
    spacing: Option<EffectSpacing>,
) -> Result<Control> {
    let key = *buf
        .get(cursor.pos)
        .ok_or(Error::MalformedTwine("truncated effect push"))?;
    let len = *buf
        .get(cursor.pos + 1)
        .ok_or(Error::MalformedTwine("truncated effect push"))? as usize;
    let start = cursor.pos + 2;
    let end = start + len;
    if buf.len() < end {
        return Err(Error::MalformedTwine("truncated effect payload"));
    }
    cursor.pos = end;
    Ok(Control::PushEffect {
        key,
        payload: start..end,
        mode,
        spacing,
    })
}

fn next_atom(buf: &[u8], cursor: &mut Cursor) -> Result<Atom> {
    loop {
        let Some(&byte) = buf.get(cursor.pos) else {
            return Ok(Atom::End);
        };
        if byte == LINE_BREAK {
            cursor.pos += 1;
            return Ok(Atom::LineBreak);
        }
        if byte == CC_BEGIN {
            let opcode = buf
                .get(cursor.pos + 1)
                .copied()
                .and_then(Opcode::from_byte)
                .ok_or(Error::MalformedTwine("bad control code byte"))?;
            cursor.pos += 2;
            match opcode {
                Opcode::SwitchGlyphMode => {
                    cursor.glyph_mode = true;
                    continue;
                }
                Opcode::SwitchStringMode => {
                    cursor.glyph_mode = false;
                    continue;
                }
                Opcode::RefreshLineMetrics => {
                    return Ok(Atom::Control(Control::RefreshLineMetrics))
                }
                Opcode::PushLineRestartMarker => {
                    return Ok(Atom::Control(Control::PushLineRestartMarker))
                }
                Opcode::ClearLineRestartMarker => {
                    return Ok(Atom::Control(Control::ClearLineRestartMarker))
                }
                Opcode::PushEffectWithSpacing => {
                    let spacing = EffectSpacing::decode(&buf[cursor.pos.min(buf.len())..])
                        .ok_or(Error::MalformedTwine("truncated effect spacing"))?;
                    cursor.pos += EffectSpacing::ENCODED_LEN;
                    // Spacing binds to the push that must follow directly.
                    let followed_by_push = buf.get(cursor.pos) == Some(&CC_BEGIN)
                        && matches!(
                            buf.get(cursor.pos + 1).copied().and_then(Opcode::from_byte),
                            Some(Opcode::PushSinglePassEffect | Opcode::PushDoublePassEffect)
                        );
                    if !followed_by_push {
                        return Err(Error::MalformedTwine("effect spacing without a push"));
                    }
                    let mode = match Opcode::from_byte(buf[cursor.pos + 1]) {
                        Some(Opcode::PushSinglePassEffect) => PassMode::Single,
                        _ => PassMode::Double,
                    };
                    cursor.pos += 2;
                    return decode_effect_push(buf, cursor, mode, Some(spacing))
                        .map(Atom::Control);
                }
                Opcode::PushSinglePassEffect => {
                    return decode_effect_push(buf, cursor, PassMode::Single, None)
                        .map(Atom::Control)
                }
                Opcode::PushDoublePassEffect => {
                    return decode_effect_push(buf, cursor, PassMode::Double, None)
                        .map(Atom::Control)
                }
                Opcode::Pop => return Ok(Atom::Control(Control::Pop)),
                Opcode::PopAll => return Ok(Atom::Control(Control::PopAll)),
                Opcode::PushMotion => return Err(Error::Unimplemented("twine motion effects")),
            }
        }
        if cursor.glyph_mode {
            let triple = buf
                .get(cursor.pos..cursor.pos + 3)
                .ok_or(Error::MalformedTwine("truncated glyph triple"))?;
            if triple[0] >= 0x04 || triple[1] >= 0x80 || triple[2] >= 0x80 {
                return Err(Error::MalformedTwine("invalid glyph triple"));
            }
            cursor.pos += 3;
            let glyph =
                ((triple[0] as u16) << 14) | ((triple[1] as u16) << 7) | triple[2] as u16;
            return Ok(Atom::Glyph(glyph));
        }
        let len = utf8_len(byte).ok_or(Error::MalformedTwine("invalid UTF-8 lead byte"))?;
        let bytes = buf
            .get(cursor.pos..cursor.pos + len)
            .ok_or(Error::MalformedTwine("truncated UTF-8 sequence"))?;
        let text =
            std::str::from_utf8(bytes).map_err(|_| Error::MalformedTwine("invalid UTF-8 sequence"))?;
        let code_point = text
            .chars()
            .next()
            .ok_or(Error::MalformedTwine("invalid UTF-8 sequence"))?;
        cursor.pos += len;
        return Ok(Atom::Char(code_point));
    }
}

/// Adds an effect-injected advance in the direction of text flow and
/// interrupts kerning across it.
fn inject(pen: &mut Pen, amount: Fract, direction: Direction) {
    match direction {
        Direction::LeftToRight => {
            pen.x += amount;
            pen.raw_x += amount;
        }
        Direction::RightToLeft => {
            pen.x -= amount;
            pen.raw_x -= amount;
        }
    }
}

#[derive(Copy, Clone)]
struct PassCfg {
    /// Glyphs are emitted and pops are hard.
    drawing: bool,
    /// Whether RefreshLineMetrics commits. True for the drawing pass and
    /// for a standalone measure; false for provisional sub-passes.
    authoritative: bool,
    /// Fire LineStart triggers for already-active effects.
    fire_line_start: bool,
}

/// Line metrics captured at pass start and re-queried only by an
/// authoritative RefreshLineMetrics.
#[derive(Copy, Clone, Debug)]
struct LineMetricsCache {
    line_height: Fract,
}

struct Frame {
    stack: SmallVec<[EffectOp; 4]>,
    journal: Journal,
    restart_x: Option<Fract>,
    metrics: LineMetricsCache,
}

struct LineOutcome {
    end_of_text: bool,
    pen_end: Fract,
    placed: usize,
    chars: usize,
}

impl Renderer {
    fn line_metrics_cache(&mut self) -> LineMetricsCache {
        LineMetricsCache {
            line_height: self.metrics().line_height(),
        }
    }

    fn fire_effect(
        &mut self,
        effects: &mut EffectTable,
        journal: &mut Journal,
        buf: &[u8],
        op: &EffectOp,
        trigger: EffectTrigger,
        origin: Point,
        cfg: PassCfg,
    ) -> Result<Fract> {
        if cfg.drawing {
            let advance = journal.replay(op.key, trigger);
            if op.mode == PassMode::Double {
                let callback = effects
                    .get_mut(&op.key)
                    .ok_or(Error::MalformedTwine("unregistered effect key"))?;
                // Geometry comes from the journal; the drawing-pass
                // invocation exists for state side effects only.
                let _ = callback(
                    EffectArgs {
                        key: op.key,
                        payload: &buf[op.payload.clone()],
                        trigger,
                        measuring: false,
                        origin,
                    },
                    &mut self.state,
                );
            }
            Ok(advance)
        } else {
            let callback = effects
                .get_mut(&op.key)
                .ok_or(Error::MalformedTwine("unregistered effect key"))?;
            let advance = callback(
                EffectArgs {
                    key: op.key,
                    payload: &buf[op.payload.clone()],
                    trigger,
                    measuring: true,
                    origin,
                },
                &mut self.state,
            );
            journal.record(JournalEntry {
                key: op.key,
                trigger,
                advance,
            });
            Ok(advance)
        }
    }

    fn pop_effect(
        &mut self,
        effects: &mut EffectTable,
        journal: &mut Journal,
        buf: &[u8],
        op: EffectOp,
        pen: &mut Pen,
        y: Fract,
        cfg: PassCfg,
    ) -> Result<()> {
        let direction = self.state.direction;
        let size = self.state.scaled_size;
        if let Some(spacing) = op.spacing {
            let consumed = match direction {
                Direction::LeftToRight => pen.x - op.span_start_x,
                Direction::RightToLeft => op.span_start_x - pen.x,
            };
            let min_width = spacing.min_width_at(size);
            if consumed < min_width {
                inject(pen, min_width - consumed, direction);
            }
        }
        let advance = self.fire_effect(
            effects,
            journal,
            buf,
            &op,
            EffectTrigger::Pop,
            Point { x: pen.x, y },
            cfg,
        )?;
        inject(pen, advance, direction);
        if let Some(spacing) = op.spacing {
            inject(pen, spacing.post_pad_at(size), direction);
        }
        pen.prev = None;
        Ok(())
    }

    /// Interprets one line of the twine in a single pass.
    #[allow(clippy::too_many_arguments)]
    fn run_twine_line(
        &mut self,
        effects: &mut EffectTable,
        mut target: Option<&mut dyn Target>,
        buf: &[u8],
        cursor: &mut Cursor,
        frame: &mut Frame,
        origin_x: Fract,
        y: Fract,
        cfg: PassCfg,
    ) -> Result<LineOutcome> {
        let direction = self.state.direction;
        let mut pen = Pen::new(origin_x);
        let mut chars = 0;

        if cfg.fire_line_start {
            for i in 0..frame.stack.len() {
                let op = frame.stack[i].clone();
                let size = self.state.scaled_size;
                if let Some(spacing) = op.spacing {
                    inject(&mut pen, spacing.line_start_pad_at(size), direction);
                }
                let advance = self.fire_effect(
                    effects,
                    &mut frame.journal,
                    buf,
                    &op,
                    EffectTrigger::LineStart,
                    Point { x: pen.x, y },
                    cfg,
                )?;
                inject(&mut pen, advance, direction);
                pen.prev = None;
                // Min-width tracking restarts on every line.
                frame.stack[i].span_start_x = pen.x;
            }
        }

        loop {
            match next_atom(buf, cursor)? {
                Atom::Char(code_point) => {
                    chars += 1;
                    let Some(glyph) = self.resolve_glyph(code_point)? else {
                        continue;
                    };
                    let placed = self.step(&mut pen, glyph);
                    if let Some(target) = target.as_mut() {
                        self.emit_glyph(&mut **target, glyph, Point { x: placed, y });
                    }
                }
                Atom::Glyph(glyph) => {
                    chars += 1;
                    let placed = self.step(&mut pen, glyph);
                    if let Some(target) = target.as_mut() {
                        self.emit_glyph(&mut **target, glyph, Point { x: placed, y });
                    }
                }
                Atom::LineBreak => {
                    chars += 1;
                    for i in (0..frame.stack.len()).rev() {
                        let op = frame.stack[i].clone();
                        let size = self.state.scaled_size;
                        if let Some(spacing) = op.spacing {
                            inject(&mut pen, spacing.line_break_pad_at(size), direction);
                        }
                        let advance = self.fire_effect(
                            effects,
                            &mut frame.journal,
                            buf,
                            &op,
                            EffectTrigger::LineBreak,
                            Point { x: pen.x, y },
                            cfg,
                        )?;
                        inject(&mut pen, advance, direction);
                    }
                    pen.prev = None;
                    return Ok(LineOutcome {
                        end_of_text: false,
                        pen_end: pen.x,
                        placed: pen.placed,
                        chars,
                    });
                }
                Atom::End => {
                    // Implicit end-of-text pop of every active effect.
                    while let Some(op) = frame.stack.pop() {
                        self.pop_effect(effects, &mut frame.journal, buf, op, &mut pen, y, cfg)?;
                    }
                    return Ok(LineOutcome {
                        end_of_text: true,
                        pen_end: pen.x,
                        placed: pen.placed,
                        chars,
                    });
                }
                Atom::Control(control) => match control {
                    Control::RefreshLineMetrics => {
                        if cfg.authoritative {
                            frame.metrics = self.line_metrics_cache();
                        }
                    }
                    Control::PushLineRestartMarker => frame.restart_x = Some(pen.x),
                    Control::ClearLineRestartMarker => frame.restart_x = None,
                    Control::Pop => {
                        let op = frame
                            .stack
                            .pop()
                            .ok_or(Error::MalformedTwine("unbalanced effect pop"))?;
                        self.pop_effect(effects, &mut frame.journal, buf, op, &mut pen, y, cfg)?;
                    }
                    Control::PopAll => {
                        while let Some(op) = frame.stack.pop() {
                            self.pop_effect(
                                effects,
                                &mut frame.journal,
                                buf,
                                op,
                                &mut pen,
                                y,
                                cfg,
                            )?;
                        }
                    }
                    Control::PushEffect {
                        key,
                        payload,
                        mode,
                        spacing,
                    } => {
                        let size = self.state.scaled_size;
                        let mut op = EffectOp {
                            key,
                            payload,
                            mode,
                            spacing,
                            span_start_x: pen.x,
                        };
                        if let Some(spacing) = spacing {
                            inject(&mut pen, spacing.pre_pad_at(size), direction);
                        }
                        let advance = self.fire_effect(
                            effects,
                            &mut frame.journal,
                            buf,
                            &op,
                            EffectTrigger::Push,
                            Point { x: pen.x, y },
                            cfg,
                        )?;
                        inject(&mut pen, advance, direction);
                        pen.prev = None;
                        op.span_start_x = pen.x;
                        frame.stack.push(op);
                    }
                },
            }
        }
    }

    /// Measures the size a twine would occupy if drawn. A single
    /// authoritative measuring pass; effect callbacks fire once per event.
    pub fn measure_twine(&mut self, twine: &Twine) -> Result<Measurement> {
        let mut effects = std::mem::take(&mut self.effects);
        let result = self.measure_twine_body(&mut effects, twine, true);
        self.effects = effects;
        result.map(|(measurement, _)| measurement)
    }

    fn measure_twine_body(
        &mut self,
        effects: &mut EffectTable,
        twine: &Twine,
        authoritative: bool,
    ) -> Result<(Measurement, Fract)> {
        let vert_quant = self.state.vert_quant;
        let buf = twine.bytes();
        let mut cursor = Cursor {
            pos: 0,
            glyph_mode: false,
        };
        let mut frame = Frame {
            stack: SmallVec::new(),
            journal: Journal::default(),
            restart_x: None,
            metrics: self.line_metrics_cache(),
        };

        let mut width = Fract::ZERO;
        let mut chars = 0;
        let mut height = Fract::ZERO;
        let mut nth_break = 0u32;
        let mut any_content = false;
        let mut any_break = false;
        let mut fire_line_start = false;

        loop {
            frame.journal.clear();
            let cfg = PassCfg {
                drawing: false,
                authoritative,
                fire_line_start,
            };
            let outcome = self.run_twine_line(
                effects,
                None,
                buf,
                &mut cursor,
                &mut frame,
                Fract::ZERO,
                Fract::ZERO,
                cfg,
            )?;
            chars += outcome.chars;
            if outcome.placed > 0 {
                any_content = true;
                nth_break = 0;
            }
            width = width.max(outcome.pen_end.abs());

            if outcome.end_of_text {
                break;
            }
            any_break = true;
            nth_break += 1;
            let advance = self.metrics().line_advance(nth_break);
            height = (height + advance).quantize_up(vert_quant);
            fire_line_start = true;
        }

        let advances = height;
        let solely_breaks = !any_content && any_break;
        if !solely_breaks {
            height = (height + frame.metrics.line_height).quantize_up(vert_quant);
        }

        Ok((Measurement { width, height, chars }, advances))
    }

    /// Twine counterpart of [`Renderer::measure_with_wrap`]. Wrapping
    /// rich text is deliberately unimplemented: effects that inject
    /// spacing can move the wrap point in both directions, and no
    /// consistent policy has been settled, so this fails loudly instead
    /// of mis-wrapping.
    pub fn measure_twine_with_wrap(
        &mut self,
        _twine: &Twine,
        _limit: impl Into<Fract>,
    ) -> Result<Measurement> {
        Err(Error::Unimplemented("twine line wrapping"))
    }

    /// Twine counterpart of [`Renderer::draw_with_wrap`]; unimplemented
    /// for the same reason as [`Renderer::measure_twine_with_wrap`].
    pub fn draw_twine_with_wrap(
        &mut self,
        _target: &mut dyn Target,
        _twine: &Twine,
        _x: impl Into<Fract>,
        _y: impl Into<Fract>,
        _limit: impl Into<Fract>,
    ) -> Result<Point> {
        Err(Error::Unimplemented("twine line wrapping"))
    }

    /// Draws a twine with its anchor at (x, y). Each line is measured,
    /// placed, then replayed in drawing mode; see the module docs.
    pub fn draw_twine(
        &mut self,
        target: &mut dyn Target,
        twine: &Twine,
        x: impl Into<Fract>,
        y: impl Into<Fract>,
    ) -> Result<Point> {
        assert!(self.rasterizer.is_some(), "{}", NO_RASTERIZER);
        let align = self.state.align;
        assert!(
            align.is_valid(),
            "align must carry exactly one flag per axis: {:?}",
            align
        );
        let anchor = Point::new(x.into(), y.into());
        let mut effects = std::mem::take(&mut self.effects);
        let result = self.draw_twine_inner(&mut effects, target, twine, anchor);
        self.effects = effects;
        result
    }

    fn draw_twine_inner(
        &mut self,
        effects: &mut EffectTable,
        target: &mut dyn Target,
        twine: &Twine,
        anchor: Point,
    ) -> Result<Point> {
        let align = self.state.align;
        let direction = self.state.direction;
        let (horz_quant, vert_quant) = (self.state.horz_quant, self.state.vert_quant);
        let buf = twine.bytes();

        let vert = align.vert();
        let vert_metrics = self.vert_metrics();
        let content = if vert == Align::VERT_CENTER
            || vert == Align::BOTTOM
            || vert == Align::LAST_BASELINE
        {
            // Provisional pass for the height; the render state is
            // restored afterwards so effect mutations do not leak into
            // the real passes.
            let saved = self.state;
            let measured = self.measure_twine_body(effects, twine, false);
            self.state = saved;
            self.sync_collaborators();
            let (measurement, advances) = measured?;
            ContentHeight {
                height: measurement.height,
                advances,
            }
        } else {
            ContentHeight::default()
        };
        let mut y =
            (anchor.y + baseline_offset(vert, vert_metrics, || content)).quantize_up(vert_quant);

        let mut cursor = Cursor {
            pos: 0,
            glyph_mode: false,
        };
        let mut frame = Frame {
            stack: SmallVec::new(),
            journal: Journal::default(),
            restart_x: None,
            metrics: self.line_metrics_cache(),
        };
        let mut nth_break = 0u32;
        let mut fire_line_start = false;
        let mut final_pen;

        loop {
            // Snapshot for the per-line replay: cursor, stack, state, line
            // metrics and restart marker, all by value.
            let snap_stack = frame.stack.clone();
            let snap_state = self.state;
            let snap_metrics = frame.metrics;
            let snap_restart = frame.restart_x;
            frame.journal.clear();

            // Measuring sub-pass over a cursor copy, origin 0.
            let mut measure_cursor = cursor;
            let outcome = self.run_twine_line(
                effects,
                None,
                buf,
                &mut measure_cursor,
                &mut frame,
                Fract::ZERO,
                y,
                PassCfg {
                    drawing: false,
                    authoritative: false,
                    fire_line_start,
                },
            )?;
            let line_width = outcome.pen_end.abs();

            // Reconcile: soft-popped effects are recalled and
            // mid-measurement pushes discarded by restoring the snapshot.
            frame.stack = snap_stack;
            self.state = snap_state;
            frame.metrics = snap_metrics;
            frame.restart_x = snap_restart;
            frame.journal.rewind();

            let origin = quantize_origin(
                frame
                    .restart_x
                    .unwrap_or_else(|| line_origin(anchor.x, line_width, direction, align.horz())),
                direction,
                horz_quant,
            );

            let outcome = self.run_twine_line(
                effects,
                Some(&mut *target),
                buf,
                &mut cursor,
                &mut frame,
                origin,
                y,
                PassCfg {
                    drawing: true,
                    authoritative: true,
                    fire_line_start,
                },
            )?;
            frame.journal.finish_replay();

            final_pen = Point {
                x: outcome.pen_end,
                y,
            };
            if outcome.placed > 0 {
                nth_break = 0;
            }
            if outcome.end_of_text {
                break;
            }
            nth_break += 1;
            let advance = self.metrics().line_advance(nth_break);
            y = (y + advance).quantize_up(vert_quant);
            fire_line_start = true;
        }

        Ok(final_pen)
    }
}
