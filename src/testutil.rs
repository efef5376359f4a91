//! Deterministic collaborators for unit tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use glam::{IVec2, UVec2};
use palette::Srgba;
use slotmap::SlotMap;

use crate::cache::{CacheHandler, SubpixelBin};
use crate::fract::{Fract, Point};
use crate::raster::{BlendMode, Mask, Rasterizer, Target};
use crate::sizer::{FontId, GlyphIndex, Sizer};
use crate::Renderer;

/// A non-null font handle for sizers that ignore the font.
pub fn test_font() -> FontId {
    let mut fonts: SlotMap<FontId, ()> = SlotMap::with_key();
    fonts.insert(())
}

/// Fixed-metrics oracle: every glyph advances 10 px except '.', which
/// advances 5.5 px to exercise sub-pixel quantization; the AV pair kerns
/// by -2 px; blank lines gain 4 px per extra consecutive break. All
/// metrics scale linearly with size from the 16 px baseline.
#[derive(Default)]
pub struct TestSizer;

impl TestSizer {
    pub const ADVANCE: Fract = Fract::from_pixels(10);
    pub const PERIOD_ADVANCE: Fract = Fract::from_raw(5 * 64 + 32);
    pub const KERN_AV: Fract = Fract::from_pixels(-2);
    pub const LINE_HEIGHT: Fract = Fract::from_pixels(20);
    pub const BLANK_EXTRA: Fract = Fract::from_pixels(4);
    pub const ASCENT: Fract = Fract::from_pixels(15);
    pub const DESCENT: Fract = Fract::from_pixels(5);
    pub const X_HEIGHT: Fract = Fract::from_pixels(8);
    pub const CAP_HEIGHT: Fract = Fract::from_pixels(12);

    pub fn new() -> TestSizer {
        TestSizer
    }
}

impl Sizer for TestSizer {
    fn glyph_index(&mut self, _font: FontId, code_point: char) -> GlyphIndex {
        if code_point == '\u{3000}' {
            0
        } else {
            code_point as GlyphIndex
        }
    }

    fn advance(&mut self, _font: FontId, size: Fract, glyph: GlyphIndex) -> Fract {
        let base = if glyph == '.' as GlyphIndex {
            Self::PERIOD_ADVANCE
        } else {
            Self::ADVANCE
        };
        base.rescale(size)
    }

    fn kern(&mut self, _font: FontId, size: Fract, left: GlyphIndex, right: GlyphIndex) -> Fract {
        if left == 'A' as GlyphIndex && right == 'V' as GlyphIndex {
            Self::KERN_AV.rescale(size)
        } else {
            Fract::ZERO
        }
    }

    fn line_advance(&mut self, _font: FontId, size: Fract, nth_consecutive_break: u32) -> Fract {
        let extra = Fract::from_raw(
            Self::BLANK_EXTRA.raw() * (nth_consecutive_break.saturating_sub(1) as i32),
        );
        (Self::LINE_HEIGHT + extra).rescale(size)
    }

    fn line_height(&mut self, _font: FontId, size: Fract) -> Fract {
        Self::LINE_HEIGHT.rescale(size)
    }

    fn ascent(&mut self, _font: FontId, size: Fract) -> Fract {
        Self::ASCENT.rescale(size)
    }

    fn descent(&mut self, _font: FontId, size: Fract) -> Fract {
        Self::DESCENT.rescale(size)
    }

    fn x_height(&mut self, _font: FontId, size: Fract) -> Fract {
        Self::X_HEIGHT.rescale(size)
    }

    fn cap_height(&mut self, _font: FontId, size: Fract) -> Fract {
        Self::CAP_HEIGHT.rescale(size)
    }
}

/// Rasterizer stub producing a 1x1 opaque mask for every glyph.
#[derive(Default)]
pub struct StubRasterizer;

impl Rasterizer for StubRasterizer {
    fn rasterize(&mut self, _font: FontId, _glyph: GlyphIndex, _size: Fract, _offset: Point) -> Mask {
        Mask {
            width: 1,
            height: 1,
            left: 0,
            top: 0,
            coverage: vec![0xff],
        }
    }
}

/// Target recording every composited mask position and color.
pub struct RecordingTarget {
    events: Vec<(IVec2, Srgba<u8>, BlendMode)>,
}

impl RecordingTarget {
    pub fn new() -> RecordingTarget {
        RecordingTarget { events: Vec::new() }
    }

    pub fn positions(&self) -> Vec<IVec2> {
        self.events.iter().map(|(pos, _, _)| *pos).collect()
    }

    pub fn colors(&self) -> Vec<Srgba<u8>> {
        self.events.iter().map(|(_, color, _)| *color).collect()
    }
}

impl Target for RecordingTarget {
    fn size(&self) -> UVec2 {
        UVec2::new(4096, 4096)
    }

    fn composite(&mut self, _mask: &Mask, origin: IVec2, color: Srgba<u8>, blend: BlendMode) {
        self.events.push((origin, color, blend));
    }
}

/// Cache handler that stores nothing and records every notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Font(FontId),
    Size(Fract),
    Rasterizer,
    Fract(SubpixelBin),
}

pub struct RecordingCache {
    log: Rc<RefCell<Vec<Notification>>>,
}

impl RecordingCache {
    pub fn new() -> (RecordingCache, Rc<RefCell<Vec<Notification>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (RecordingCache { log: Rc::clone(&log) }, log)
    }
}

impl CacheHandler for RecordingCache {
    fn get_mask(&mut self, _glyph: GlyphIndex) -> Option<Arc<Mask>> {
        None
    }

    fn pass_mask(&mut self, _glyph: GlyphIndex, _mask: Arc<Mask>) {}

    fn notify_font_change(&mut self, font: FontId) {
        self.log.borrow_mut().push(Notification::Font(font));
    }

    fn notify_size_change(&mut self, size: Fract) {
        self.log.borrow_mut().push(Notification::Size(size));
    }

    fn notify_rasterizer_change(&mut self) {
        self.log.borrow_mut().push(Notification::Rasterizer);
    }

    fn notify_fract_change(&mut self, bin: SubpixelBin) {
        self.log.borrow_mut().push(Notification::Fract(bin));
    }
}

/// Renderer with the test sizer and font, ready for measuring.
pub fn renderer_with_test_sizer() -> Renderer {
    let mut renderer = Renderer::new();
    renderer.set_sizer(TestSizer::new());
    renderer.set_font(test_font());
    renderer
}

/// Renderer additionally equipped for drawing.
pub fn renderer_for_drawing() -> Renderer {
    let mut renderer = renderer_with_test_sizer();
    renderer.set_rasterizer(StubRasterizer);
    renderer.set_cache_handler(crate::cache::MaskCache::new());
    renderer
}
