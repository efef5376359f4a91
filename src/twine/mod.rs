//! Rich-text buffers ("twines").
//!
//! A [`Twine`] is an append-only byte buffer mixing UTF-8 text spans,
//! raw glyph-index spans and control codes. It is built once through the
//! builder methods and then interpreted read-only by
//! [`Renderer::measure_twine`](crate::Renderer::measure_twine) and
//! [`Renderer::draw_twine`](crate::Renderer::draw_twine); interpretation
//! never mutates the twine, only its own cursor.
//!
//! Control codes start with a sentinel byte that cannot occur in valid
//! UTF-8, so text spans need no escaping. Glyph spans encode each index in
//! three 7-bit bytes for the same reason.

pub(crate) mod effect;
pub(crate) mod interp;

use std::fmt;

pub use effect::{EffectArgs, EffectKey, EffectSpacing, EffectTrigger, PassMode};

use crate::sizer::GlyphIndex;

/// Begins a control code; 0xFF never appears in valid UTF-8.
pub(crate) const CC_BEGIN: u8 = 0xFF;

/// A line break in either decode mode.
pub(crate) const LINE_BREAK: u8 = b'\n';

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Opcode {
    SwitchGlyphMode = 0x01,
    SwitchStringMode = 0x02,
    RefreshLineMetrics = 0x03,
    PushLineRestartMarker = 0x04,
    ClearLineRestartMarker = 0x05,
    PushEffectWithSpacing = 0x06,
    PushSinglePassEffect = 0x07,
    PushDoublePassEffect = 0x08,
    Pop = 0x09,
    PopAll = 0x0A,
    PushMotion = 0x0B,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Some(match byte {
            0x01 => Opcode::SwitchGlyphMode,
            0x02 => Opcode::SwitchStringMode,
            0x03 => Opcode::RefreshLineMetrics,
            0x04 => Opcode::PushLineRestartMarker,
            0x05 => Opcode::ClearLineRestartMarker,
            0x06 => Opcode::PushEffectWithSpacing,
            0x07 => Opcode::PushSinglePassEffect,
            0x08 => Opcode::PushDoublePassEffect,
            0x09 => Opcode::Pop,
            0x0A => Opcode::PopAll,
            0x0B => Opcode::PushMotion,
            _ => return None,
        })
    }
}

/// A rich-text buffer. See the module docs.
#[derive(Clone, Default)]
pub struct Twine {
    buffer: Vec<u8>,
    /// Builder-side decode mode, used to insert switch codes lazily.
    glyph_mode: bool,
}

impl Twine {
    pub fn new() -> Twine {
        Twine::default()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn control(&mut self, opcode: Opcode) -> &mut Twine {
        self.buffer.push(CC_BEGIN);
        self.buffer.push(opcode as u8);
        self
    }

    fn ensure_string_mode(&mut self) {
        if self.glyph_mode {
            self.control(Opcode::SwitchStringMode);
            self.glyph_mode = false;
        }
    }

    fn ensure_glyph_mode(&mut self) {
        if !self.glyph_mode {
            self.control(Opcode::SwitchGlyphMode);
            self.glyph_mode = true;
        }
    }

    pub fn push_text(&mut self, text: &str) -> &mut Twine {
        self.ensure_string_mode();
        self.buffer.extend_from_slice(text.as_bytes());
        self
    }

    pub fn push_char(&mut self, code_point: char) -> &mut Twine {
        let mut utf8 = [0u8; 4];
        self.push_text(code_point.encode_utf8(&mut utf8))
    }

    /// A line break, valid in both decode modes.
    pub fn push_line_break(&mut self) -> &mut Twine {
        self.buffer.push(LINE_BREAK);
        self
    }

    /// Appends a raw glyph index, bypassing code-point resolution and the
    /// miss handler.
    pub fn push_glyph(&mut self, glyph: GlyphIndex) -> &mut Twine {
        self.ensure_glyph_mode();
        self.buffer.push((glyph >> 14) as u8);
        self.buffer.push(((glyph >> 7) & 0x7F) as u8);
        self.buffer.push((glyph & 0x7F) as u8);
        self
    }

    pub fn push_glyphs(&mut self, glyphs: &[GlyphIndex]) -> &mut Twine {
        for &glyph in glyphs {
            self.push_glyph(glyph);
        }
        self
    }

    /// Pushes an effect span. The callback registered under `key` on the
    /// renderer fires at push/line/pop events until the matching
    /// [`Twine::pop`].
    pub fn push_effect(&mut self, key: EffectKey, payload: &[u8], mode: PassMode) -> &mut Twine {
        assert!(
            payload.len() <= u8::MAX as usize,
            "effect payload exceeds 255 bytes"
        );
        self.control(match mode {
            PassMode::Single => Opcode::PushSinglePassEffect,
            PassMode::Double => Opcode::PushDoublePassEffect,
        });
        self.buffer.push(key);
        self.buffer.push(payload.len() as u8);
        self.buffer.extend_from_slice(payload);
        self
    }

    /// Like [`Twine::push_effect`], with spacing attached to the span.
    pub fn push_effect_with_spacing(
        &mut self,
        key: EffectKey,
        payload: &[u8],
        mode: PassMode,
        spacing: EffectSpacing,
    ) -> &mut Twine {
        self.control(Opcode::PushEffectWithSpacing);
        spacing.encode(&mut self.buffer);
        self.push_effect(key, payload, mode)
    }

    /// Pops the most recent effect. Unbalanced pops fail interpretation.
    pub fn pop(&mut self) -> &mut Twine {
        self.control(Opcode::Pop)
    }

    /// Pops every active effect.
    pub fn pop_all(&mut self) -> &mut Twine {
        self.control(Opcode::PopAll)
    }

    /// Re-queries line metrics at this point, for spans that change font
    /// or size. Applied only on the authoritative pass.
    pub fn refresh_line_metrics(&mut self) -> &mut Twine {
        self.control(Opcode::RefreshLineMetrics)
    }

    /// Records the pen X at this point as where subsequent lines start,
    /// until cleared.
    pub fn push_line_restart_marker(&mut self) -> &mut Twine {
        self.control(Opcode::PushLineRestartMarker)
    }

    pub fn clear_line_restart_marker(&mut self) -> &mut Twine {
        self.control(Opcode::ClearLineRestartMarker)
    }

    /// Reserved; interpretation fails with
    /// [`Error::Unimplemented`](crate::Error::Unimplemented).
    pub fn push_motion(&mut self) -> &mut Twine {
        self.control(Opcode::PushMotion)
    }
}

impl From<&str> for Twine {
    fn from(text: &str) -> Twine {
        let mut twine = Twine::new();
        twine.push_text(text);
        twine
    }
}

impl fmt::Debug for Twine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Twine")
            .field("bytes", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_spans_are_plain_utf8() {
        let twine = Twine::from("héllo");
        assert_eq!(twine.bytes(), "héllo".as_bytes());
    }

    #[test]
    fn mode_switches_are_inserted_lazily() {
        let mut twine = Twine::new();
        twine.push_text("a").push_glyph(300).push_glyph(301);
        twine.push_text("b");

        let bytes = twine.bytes();
        assert_eq!(bytes[0], b'a');
        assert_eq!(bytes[1], CC_BEGIN);
        assert_eq!(bytes[2], Opcode::SwitchGlyphMode as u8);
        // Two glyph triples, one switch back, then 'b'.
        assert_eq!(bytes.len(), 3 + 6 + 2 + 1);
        assert_eq!(bytes[bytes.len() - 1], b'b');
    }

    #[test]
    fn glyph_triples_avoid_the_sentinel() {
        let mut twine = Twine::new();
        twine.push_glyph(u16::MAX);
        // Skip the mode switch, inspect the triple.
        let triple = &twine.bytes()[2..];
        assert_eq!(triple.len(), 3);
        assert!(triple.iter().all(|&b| b < 0x80));
        let decoded =
            ((triple[0] as u16) << 14) | ((triple[1] as u16) << 7) | triple[2] as u16;
        assert_eq!(decoded, u16::MAX);
    }

    #[test]
    #[should_panic(expected = "payload exceeds")]
    fn oversized_payload_is_builder_misuse() {
        let mut twine = Twine::new();
        twine.push_effect(1, &[0; 300], PassMode::Single);
    }
}
