//! Twine effects: user callbacks attached to spans of rich text.
//!
//! An effect is registered on the renderer under a one-byte key and
//! triggered by push/pop control codes in a twine. Its callback can inject
//! extra horizontal advance and, for double-pass effects, mutate the
//! render state (color, font, size) while the span is active.

use std::ops::Range;

use crate::fract::{Fract, Point};
use crate::renderer::RenderState;

/// Key an effect callback is registered under.
pub type EffectKey = u8;

/// How often an effect callback fires per triggering event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PassMode {
    /// The callback fires once, on the measuring pass; the drawing replay
    /// reuses the recorded advance without calling back.
    Single,
    /// The callback fires on both the measuring and the drawing pass.
    /// Geometry still comes from the measuring pass, so stateful effects
    /// cannot desynchronize the two.
    Double,
}

/// Why an effect callback is being invoked.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EffectTrigger {
    /// The effect's push control code was decoded.
    Push,
    /// A new line started while the effect was active.
    LineStart,
    /// The current line ended while the effect was active.
    LineBreak,
    /// The effect was popped, explicitly or at end of text.
    Pop,
}

/// Everything an effect callback sees about its invocation.
#[derive(Debug)]
pub struct EffectArgs<'a> {
    pub key: EffectKey,
    /// Payload bytes attached by the twine builder.
    pub payload: &'a [u8],
    pub trigger: EffectTrigger,
    /// True on the measuring pass, false on the drawing pass.
    pub measuring: bool,
    /// Pen position at the trigger point.
    pub origin: Point,
}

pub(crate) type EffectFn = Box<dyn FnMut(EffectArgs<'_>, &mut RenderState) -> Fract>;

/// Horizontal spacing attached to an effect span.
///
/// Values marked logical are expressed relative to a 16 px reference size
/// and rescale with the renderer's scaled size; absolute values pass
/// through unchanged. By convention `line_start_pad <= pre_pad` and
/// `line_break_pad <= post_pad` for coherent wrapping, though nothing
/// enforces it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectSpacing {
    /// Injected when the effect is pushed.
    pub pre_pad: Fract,
    /// Injected when the effect is popped.
    pub post_pad: Fract,
    /// Minimum span width; the pop fills up the difference.
    pub min_width: Fract,
    /// Injected at the start of each continuation line.
    pub line_start_pad: Fract,
    /// Injected before each line break inside the span.
    pub line_break_pad: Fract,
    /// Rescale the pads with the scaled size.
    pub logical_pads: bool,
    /// Rescale the minimum width with the scaled size.
    pub logical_min_width: bool,
}

impl EffectSpacing {
    fn pad(&self, value: Fract, size: Fract) -> Fract {
        if self.logical_pads {
            value.rescale(size)
        } else {
            value
        }
    }

    pub(crate) fn pre_pad_at(&self, size: Fract) -> Fract {
        self.pad(self.pre_pad, size)
    }

    pub(crate) fn post_pad_at(&self, size: Fract) -> Fract {
        self.pad(self.post_pad, size)
    }

    pub(crate) fn line_start_pad_at(&self, size: Fract) -> Fract {
        self.pad(self.line_start_pad, size)
    }

    pub(crate) fn line_break_pad_at(&self, size: Fract) -> Fract {
        self.pad(self.line_break_pad, size)
    }

    pub(crate) fn min_width_at(&self, size: Fract) -> Fract {
        if self.logical_min_width {
            self.min_width.rescale(size)
        } else {
            self.min_width
        }
    }

    pub(crate) const ENCODED_LEN: usize = 21;

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        for value in [
            self.pre_pad,
            self.post_pad,
            self.min_width,
            self.line_start_pad,
            self.line_break_pad,
        ] {
            out.extend_from_slice(&value.raw().to_le_bytes());
        }
        out.push(self.logical_pads as u8 | (self.logical_min_width as u8) << 1);
    }

    pub(crate) fn decode(buf: &[u8]) -> Option<EffectSpacing> {
        if buf.len() < Self::ENCODED_LEN {
            return None;
        }
        let mut values = [Fract::ZERO; 5];
        for (i, value) in values.iter_mut().enumerate() {
            let bytes: [u8; 4] = buf[i * 4..i * 4 + 4].try_into().ok()?;
            *value = Fract::from_raw(i32::from_le_bytes(bytes));
        }
        let flags = buf[20];
        Some(EffectSpacing {
            pre_pad: values[0],
            post_pad: values[1],
            min_width: values[2],
            line_start_pad: values[3],
            line_break_pad: values[4],
            logical_pads: flags & 1 != 0,
            logical_min_width: flags & 2 != 0,
        })
    }
}

/// One active effect on the interpreter's stack.
#[derive(Clone, Debug)]
pub(crate) struct EffectOp {
    pub key: EffectKey,
    /// Payload byte range into the twine buffer.
    pub payload: Range<usize>,
    pub mode: PassMode,
    pub spacing: Option<EffectSpacing>,
    /// Pen X where min-width tracking started (the push, or the start of
    /// the current line).
    pub span_start_x: Fract,
}

/// Advance recorded for one effect event during the measuring pass, to be
/// replayed verbatim by the drawing pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct JournalEntry {
    pub key: EffectKey,
    pub trigger: EffectTrigger,
    pub advance: Fract,
}

/// Per-line record of effect events. The measuring sub-pass appends; the
/// drawing replay consumes in order. Any divergence between the two is a
/// defect in the two-pass protocol and panics.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<JournalEntry>,
    next: usize,
}

impl Journal {
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
    }

    /// Rewinds consumption to the start, keeping the recorded entries.
    pub fn rewind(&mut self) {
        self.next = 0;
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn replay(&mut self, key: EffectKey, trigger: EffectTrigger) -> Fract {
        let entry = match self.entries.get(self.next) {
            Some(entry) => *entry,
            None => panic!(
                "twine effect replay diverged: drawing pass fired ({key}, {trigger:?}) \
                 beyond the measured event list"
            ),
        };
        assert!(
            entry.key == key && entry.trigger == trigger,
            "twine effect replay diverged: measured ({}, {:?}), drawing fired ({}, {:?})",
            entry.key,
            entry.trigger,
            key,
            trigger,
        );
        self.next += 1;
        entry.advance
    }

    /// Asserts the drawing pass consumed every measured event.
    pub fn finish_replay(&self) {
        assert!(
            self.next == self.entries.len(),
            "twine effect replay diverged: {} measured events were not replayed",
            self.entries.len() - self.next,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_round_trips_through_encoding() {
        let spacing = EffectSpacing {
            pre_pad: Fract::from_pixels(2),
            post_pad: Fract::from_pixels(-1),
            min_width: Fract::from_pixels(30),
            line_start_pad: Fract::from_pixels(1),
            line_break_pad: Fract::ZERO,
            logical_pads: true,
            logical_min_width: false,
        };
        let mut buf = Vec::new();
        spacing.encode(&mut buf);
        assert_eq!(buf.len(), EffectSpacing::ENCODED_LEN);
        assert_eq!(EffectSpacing::decode(&buf), Some(spacing));
    }

    #[test]
    fn logical_spacing_rescales() {
        let spacing = EffectSpacing {
            pre_pad: Fract::from_pixels(4),
            logical_pads: true,
            ..Default::default()
        };
        assert_eq!(
            spacing.pre_pad_at(Fract::from_pixels(32)),
            Fract::from_pixels(8)
        );
        let absolute = EffectSpacing {
            pre_pad: Fract::from_pixels(4),
            logical_pads: false,
            ..Default::default()
        };
        assert_eq!(
            absolute.pre_pad_at(Fract::from_pixels(32)),
            Fract::from_pixels(4)
        );
    }

    #[test]
    fn journal_replays_in_order() {
        let mut journal = Journal::default();
        journal.record(JournalEntry {
            key: 1,
            trigger: EffectTrigger::Push,
            advance: Fract::from_pixels(3),
        });
        journal.record(JournalEntry {
            key: 1,
            trigger: EffectTrigger::Pop,
            advance: Fract::ZERO,
        });
        journal.rewind();
        assert_eq!(
            journal.replay(1, EffectTrigger::Push),
            Fract::from_pixels(3)
        );
        assert_eq!(journal.replay(1, EffectTrigger::Pop), Fract::ZERO);
        journal.finish_replay();
    }

    #[test]
    #[should_panic(expected = "replay diverged")]
    fn journal_panics_on_divergence() {
        let mut journal = Journal::default();
        journal.record(JournalEntry {
            key: 1,
            trigger: EffectTrigger::Push,
            advance: Fract::ZERO,
        });
        journal.rewind();
        let _ = journal.replay(2, EffectTrigger::Push);
    }
}
