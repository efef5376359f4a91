//! The renderer: layout state plus the collaborators it drives.
//!
//! A `Renderer` owns a [`RenderState`] and slots for the external
//! collaborators (sizer, rasterizer, cache handler, miss handler, twine
//! effects). It is single-threaded and non-reentrant: one logical caller
//! mutates it at a time, and sharing one across threads requires external
//! serialization.

pub(crate) mod draw;
pub(crate) mod measure;
pub(crate) mod wrap;

use std::sync::Arc;

use ahash::AHashMap;
use glam::IVec2;
use palette::Srgba;
use serde::{Deserialize, Serialize};
use slotmap::Key;

use crate::cache::{CacheHandler, SubpixelBin};
use crate::error::{Error, Result};
use crate::fract::{Fract, Point, Quantization};
use crate::raster::{BlendMode, Rasterizer, Target};
use crate::sizer::{FontId, GlyphIndex, Sizer};
use crate::twine::effect::{EffectFn, EffectKey};
use crate::Align;

pub(crate) const NO_FONT: &str = "no font set: call Renderer::set_font first";
pub(crate) const NO_SIZER: &str = "no sizer installed: call Renderer::set_sizer first";
pub(crate) const NO_RASTERIZER: &str =
    "no rasterizer installed: call Renderer::set_rasterizer first";

/// Order glyphs advance along a line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl Direction {
    pub fn is_rtl(self) -> bool {
        self == Direction::RightToLeft
    }
}

/// Result of a measuring operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Measurement {
    pub width: Fract,
    pub height: Fract,
    /// Code points consumed, line breaks included.
    pub chars: usize,
}

/// What to do about a code point the font has no glyph for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MissPolicy {
    /// Lay out this replacement glyph instead.
    Substitute(GlyphIndex),
    /// Drop the code point entirely.
    Skip,
}

pub(crate) type MissHandler = Box<dyn FnMut(char) -> MissPolicy>;
pub(crate) type EffectTable = AHashMap<EffectKey, EffectFn>;

/// The full layout configuration of a renderer.
///
/// Twine effect callbacks receive `&mut RenderState` and may retarget the
/// font, size, color or blend mode mid-text; the renderer resynchronizes
/// its collaborators before the next glyph is emitted.
#[derive(Copy, Clone, Debug)]
pub struct RenderState {
    pub(crate) font: FontId,
    pub(crate) logical_size: Fract,
    pub(crate) scale: Fract,
    pub(crate) scaled_size: Fract,
    pub(crate) horz_quant: Quantization,
    pub(crate) vert_quant: Quantization,
    pub(crate) align: Align,
    pub(crate) direction: Direction,
    pub(crate) color: Srgba<u8>,
    pub(crate) blend: BlendMode,
}

impl Default for RenderState {
    fn default() -> Self {
        RenderState {
            font: FontId::default(),
            logical_size: Fract::from_pixels(16),
            scale: Fract::ONE,
            scaled_size: Fract::from_pixels(16),
            horz_quant: Quantization::Full,
            vert_quant: Quantization::Full,
            align: Align::LEFT | Align::BASELINE,
            direction: Direction::LeftToRight,
            color: Srgba::new(0, 0, 0, u8::MAX),
            blend: BlendMode::Over,
        }
    }
}

impl RenderState {
    pub fn font(&self) -> FontId {
        self.font
    }

    pub fn set_font(&mut self, font: FontId) {
        self.font = font;
    }

    /// Logical size in pixels, before display scaling.
    pub fn size(&self) -> f32 {
        self.logical_size.to_f32()
    }

    pub fn set_size(&mut self, size: f32) {
        self.logical_size = Fract::from_f32(size);
        self.scaled_size = self.logical_size.mul(self.scale);
    }

    pub fn scale(&self) -> f32 {
        self.scale.to_f32()
    }

    /// Logical size times display scale, the size every metric is queried
    /// at.
    pub fn scaled_size(&self) -> Fract {
        self.scaled_size
    }

    pub fn align(&self) -> Align {
        self.align
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantization(&self) -> (Quantization, Quantization) {
        (self.horz_quant, self.vert_quant)
    }

    pub fn color(&self) -> Srgba<u8> {
        self.color
    }

    pub fn set_color(&mut self, color: Srgba<u8>) {
        self.color = color;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.blend = blend;
    }
}

/// The text layout engine.
///
/// Configure it with a [`Sizer`] (and a [`Rasterizer`] plus optionally a
/// [`CacheHandler`] for drawing), then measure or draw strings, wrapped
/// strings and twines. All positions are fractional units; see
/// [`crate::fract`].
pub struct Renderer {
    pub(crate) state: RenderState,
    pub(crate) sizer: Option<Box<dyn Sizer>>,
    pub(crate) rasterizer: Option<Box<dyn Rasterizer>>,
    pub(crate) cache: Option<Box<dyn CacheHandler>>,
    pub(crate) effects: EffectTable,
    pub(crate) miss_handler: Option<MissHandler>,

    /// (font, scaled size) the collaborators last heard about.
    synced: (FontId, Fract),
    /// Sub-pixel bucket of the previous emission.
    last_bin: Option<SubpixelBin>,
}

impl Renderer {
    pub fn new() -> Renderer {
        let state = RenderState::default();
        Renderer {
            synced: (state.font, state.scaled_size),
            state,
            sizer: None,
            rasterizer: None,
            cache: None,
            effects: AHashMap::new(),
            miss_handler: None,
            last_bin: None,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn set_sizer(&mut self, sizer: impl Sizer + 'static) {
        self.sizer = Some(Box::new(sizer));
        let (font, size) = (self.state.font, self.state.scaled_size);
        if let Some(sizer) = &mut self.sizer {
            sizer.notify_change(font, size);
        }
    }

    pub fn set_rasterizer(&mut self, rasterizer: impl Rasterizer + 'static) {
        self.rasterizer = Some(Box::new(rasterizer));
        if let Some(cache) = &mut self.cache {
            cache.notify_rasterizer_change();
        }
        self.last_bin = None;
    }

    /// Installs a cache handler and primes it with the current font and
    /// size so its key context is in sync.
    pub fn set_cache_handler(&mut self, cache: impl CacheHandler + 'static) {
        let mut cache = Box::new(cache);
        cache.notify_font_change(self.state.font);
        cache.notify_size_change(self.state.scaled_size);
        self.cache = Some(cache);
        self.last_bin = None;
    }

    /// Installs the policy for code points the font has no glyph for.
    /// Without one, layout fails with [`Error::MissingGlyph`].
    pub fn set_miss_handler(&mut self, handler: impl FnMut(char) -> MissPolicy + 'static) {
        self.miss_handler = Some(Box::new(handler));
    }

    /// Registers a twine effect callback under a key. Replaces any
    /// previous callback with the same key.
    pub fn register_effect(
        &mut self,
        key: EffectKey,
        callback: impl FnMut(crate::EffectArgs<'_>, &mut RenderState) -> Fract + 'static,
    ) {
        self.effects.insert(key, Box::new(callback));
    }

    pub fn set_font(&mut self, font: FontId) {
        let mut new = self.state;
        new.set_font(font);
        self.apply_state(new);
    }

    /// Sets the logical size in pixels.
    pub fn set_size(&mut self, size: f32) {
        let mut new = self.state;
        new.set_size(size);
        self.apply_state(new);
    }

    /// Sets the display scale. The scaled size every metric is queried at
    /// is the logical size times this.
    pub fn set_scale(&mut self, scale: f32) {
        let mut new = self.state;
        new.scale = Fract::from_f32(scale);
        new.scaled_size = new.logical_size.mul(new.scale);
        self.apply_state(new);
    }

    /// Adjusts the align: each axis present in `align` replaces the
    /// current one, absent axes are kept. An empty align is a no-op.
    pub fn set_align(&mut self, align: Align) {
        self.state.align = self.state.align.adjusted(align);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.state.direction = direction;
    }

    /// Sets the sub-pixel quantization granularity per axis.
    pub fn set_quantization(&mut self, horz: Quantization, vert: Quantization) {
        self.state.horz_quant = horz;
        self.state.vert_quant = vert;
        self.last_bin = None;
    }

    pub fn set_color(&mut self, color: Srgba<u8>) {
        self.state.color = color;
    }

    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.state.blend = blend;
    }

    fn apply_state(&mut self, new: RenderState) {
        self.state = new;
        self.sync_collaborators();
    }

    /// Pushes font/size change notifications to the cache handler and the
    /// sizer if the state drifted since they last heard. Setters call this
    /// directly; the draw path calls it per emission so that state changes
    /// made by twine effect callbacks are picked up too.
    pub(crate) fn sync_collaborators(&mut self) {
        let current = (self.state.font, self.state.scaled_size);
        if current == self.synced {
            return;
        }
        log::debug!(
            "render state changed: font {:?}, scaled size {}",
            current.0,
            current.1
        );
        if let Some(cache) = &mut self.cache {
            if current.0 != self.synced.0 {
                cache.notify_font_change(current.0);
            }
            if current.1 != self.synced.1 {
                cache.notify_size_change(current.1);
            }
        }
        if let Some(sizer) = &mut self.sizer {
            sizer.notify_change(current.0, current.1);
        }
        self.synced = current;
        self.last_bin = None;
    }

    /// Borrows the metrics oracle together with the active font and size.
    /// Panics if either is missing: layout with an unconfigured renderer
    /// is a programmer error.
    pub(crate) fn metrics(&mut self) -> Metrics<'_> {
        let font = self.state.font;
        assert!(!font.is_null(), "{}", NO_FONT);
        Metrics {
            sizer: self.sizer.as_deref_mut().expect(NO_SIZER),
            font,
            size: self.state.scaled_size,
        }
    }

    /// Resolves a code point to a glyph, applying the miss policy.
    /// `Ok(None)` means the miss handler chose to skip.
    pub(crate) fn resolve_glyph(&mut self, code_point: char) -> Result<Option<GlyphIndex>> {
        let font = self.state.font;
        assert!(!font.is_null(), "{}", NO_FONT);
        let sizer = self.sizer.as_deref_mut().expect(NO_SIZER);
        let glyph = sizer.glyph_index(font, code_point);
        if glyph != 0 {
            return Ok(Some(glyph));
        }
        match &mut self.miss_handler {
            Some(handler) => Ok(match handler(code_point) {
                MissPolicy::Substitute(replacement) => Some(replacement),
                MissPolicy::Skip => None,
            }),
            None => Err(Error::MissingGlyph(code_point)),
        }
    }

    /// Height of a single line at the current font and size.
    pub fn line_height(&mut self) -> Fract {
        self.metrics().line_height()
    }

    /// Vertical advance for the nth consecutive line break (1-based).
    pub fn line_advance(&mut self, nth_consecutive_break: u32) -> Fract {
        self.metrics().line_advance(nth_consecutive_break)
    }

    pub fn ascent(&mut self) -> Fract {
        self.metrics().ascent()
    }

    /// Draws one positioned glyph: cache lookup, rasterization on miss,
    /// whole-pixel placement on the target.
    pub(crate) fn emit_glyph(&mut self, target: &mut dyn Target, glyph: GlyphIndex, pos: Point) {
        self.sync_collaborators();

        let (horz, vert) = (self.state.horz_quant, self.state.vert_quant);
        let bin = SubpixelBin::new(pos, horz, vert);
        if self.last_bin != Some(bin) {
            if let Some(cache) = &mut self.cache {
                cache.notify_fract_change(bin);
            }
            self.last_bin = Some(bin);
        }

        let mask = match self.cache.as_mut().and_then(|cache| cache.get_mask(glyph)) {
            Some(mask) => mask,
            None => {
                let rasterizer = self.rasterizer.as_deref_mut().expect(NO_RASTERIZER);
                let offset = Point {
                    x: Fract::from_raw(pos.x.fract_subunits()),
                    y: Fract::from_raw(pos.y.fract_subunits()),
                };
                let mask = Arc::new(rasterizer.rasterize(
                    self.state.font,
                    glyph,
                    self.state.scaled_size,
                    offset,
                ));
                if let Some(cache) = &mut self.cache {
                    cache.pass_mask(glyph, Arc::clone(&mask));
                }
                mask
            }
        };

        if mask.is_empty() {
            return;
        }
        let origin = IVec2::new(
            pos.x.floor_pixels() + mask.left,
            pos.y.floor_pixels() - mask.top,
        );
        let bounds = target.size();
        let off_surface = origin.x + mask.width as i32 <= 0
            || origin.y + mask.height as i32 <= 0
            || origin.x >= bounds.x as i32
            || origin.y >= bounds.y as i32;
        if off_surface {
            return;
        }
        target.composite(&mask, origin, self.state.color, self.state.blend);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer::new()
    }
}

/// Borrowed view over the sizer with the active font and size applied:
/// the metrics façade every traversal queries through.
pub(crate) struct Metrics<'a> {
    sizer: &'a mut dyn Sizer,
    font: FontId,
    size: Fract,
}

impl Metrics<'_> {
    pub fn advance(&mut self, glyph: GlyphIndex) -> Fract {
        self.sizer.advance(self.font, self.size, glyph)
    }

    pub fn kern(&mut self, left: GlyphIndex, right: GlyphIndex) -> Fract {
        self.sizer.kern(self.font, self.size, left, right)
    }

    pub fn line_advance(&mut self, nth_consecutive_break: u32) -> Fract {
        self.sizer
            .line_advance(self.font, self.size, nth_consecutive_break)
    }

    pub fn line_height(&mut self) -> Fract {
        self.sizer.line_height(self.font, self.size)
    }

    pub fn ascent(&mut self) -> Fract {
        self.sizer.ascent(self.font, self.size)
    }

    pub fn x_height(&mut self) -> Fract {
        self.sizer.x_height(self.font, self.size)
    }

    pub fn cap_height(&mut self) -> Fract {
        self.sizer.cap_height(self.font, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MaskCache;
    use crate::testutil::{test_font, Notification, RecordingCache, StubRasterizer, TestSizer};

    #[test]
    fn setters_push_notifications_once() {
        let mut renderer = Renderer::new();
        renderer.set_sizer(TestSizer::new());
        let (cache, log) = RecordingCache::new();
        renderer.set_cache_handler(cache);

        let font = test_font();
        renderer.set_font(font);
        renderer.set_size(24.0);
        renderer.set_size(24.0); // no change, no notification

        let seen = log.borrow().clone();
        assert_eq!(
            seen,
            vec![
                // priming on install
                Notification::Font(FontId::default()),
                Notification::Size(Fract::from_pixels(16)),
                Notification::Font(font),
                Notification::Size(Fract::from_pixels(24)),
            ]
        );
    }

    #[test]
    fn scale_changes_scaled_size() {
        let mut renderer = Renderer::new();
        renderer.set_size(16.0);
        renderer.set_scale(1.5);
        assert_eq!(renderer.state().scaled_size(), Fract::from_pixels(24));
        renderer.set_size(32.0);
        assert_eq!(renderer.state().scaled_size(), Fract::from_pixels(48));
    }

    #[test]
    fn rasterizer_change_clears_mask_cache() {
        let mut renderer = Renderer::new();
        renderer.set_sizer(TestSizer::new());
        renderer.set_font(test_font());
        renderer.set_cache_handler(MaskCache::new());
        renderer.set_rasterizer(StubRasterizer::default());

        let mut target = crate::testutil::RecordingTarget::new();
        renderer
            .draw(&mut target, "a", 10, 10)
            .expect("draw failed");

        // Swapping the rasterizer must drop cached masks.
        renderer.set_rasterizer(StubRasterizer::default());
        let cache = renderer.cache.as_mut().unwrap();
        assert!(cache.get_mask('a' as GlyphIndex).is_none());
    }

    #[test]
    #[should_panic(expected = "no font set")]
    fn measuring_without_font_panics() {
        let mut renderer = Renderer::new();
        renderer.set_sizer(TestSizer::new());
        let _ = renderer.measure("hello");
    }

    #[test]
    #[should_panic(expected = "no sizer installed")]
    fn measuring_without_sizer_panics() {
        let mut renderer = Renderer::new();
        renderer.set_font(test_font());
        let _ = renderer.measure("hello");
    }
}
