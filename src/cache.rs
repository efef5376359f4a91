//! Glyph mask caching.
//!
//! The engine talks to a [`CacheHandler`] through a narrow contract: mask
//! lookup/insertion plus change notifications for everything a cache key
//! depends on. [`MaskCache`] is the bundled byte-budgeted LRU handler;
//! callers with their own atlas machinery implement the trait instead.

use std::sync::Arc;

use lru::LruCache;

use crate::fract::{Fract, Point, Quantization};
use crate::raster::Mask;
use crate::sizer::{FontId, GlyphIndex};

/// The sub-pixel bucket of a pen position, one bucket per quantization
/// step on each axis. Masks rasterized at different buckets differ, so
/// caches key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpixelBin {
    pub x: u8,
    pub y: u8,
}

impl SubpixelBin {
    pub fn new(pos: Point, horz: Quantization, vert: Quantization) -> SubpixelBin {
        SubpixelBin {
            x: (pos.x.fract_subunits() / horz.step()) as u8,
            y: (pos.y.fract_subunits() / vert.step()) as u8,
        }
    }

    /// The sub-pixel offset this bucket stands for.
    pub fn offset(self, horz: Quantization, vert: Quantization) -> Point {
        Point {
            x: Fract::from_raw(self.x as i32 * horz.step()),
            y: Fract::from_raw(self.y as i32 * vert.step()),
        }
    }
}

/// Mask store notified of every state change that affects cache keys.
///
/// A handler is attached to one renderer at a time; the renderer keeps it
/// synchronized through the four notifications, so `get_mask`/`pass_mask`
/// only need the glyph index.
pub trait CacheHandler {
    fn get_mask(&mut self, glyph: GlyphIndex) -> Option<Arc<Mask>>;

    fn pass_mask(&mut self, glyph: GlyphIndex, mask: Arc<Mask>);

    fn notify_font_change(&mut self, font: FontId);

    fn notify_size_change(&mut self, size: Fract);

    /// The rasterizer identity changed; previously produced masks are
    /// stale.
    fn notify_rasterizer_change(&mut self);

    /// The sub-pixel bucket of the next draw differs from the previous
    /// one.
    fn notify_fract_change(&mut self, bin: SubpixelBin);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MaskKey {
    font: FontId,
    size: i32,
    glyph: GlyphIndex,
    bin: SubpixelBin,
}

const DEFAULT_BUDGET: usize = 8 * 1024 * 1024;

/// The bundled [`CacheHandler`]: an LRU keyed by
/// (font, size, glyph, sub-pixel bucket) with a byte budget.
pub struct MaskCache {
    masks: LruCache<MaskKey, Arc<Mask>, ahash::RandomState>,
    budget: usize,
    used: usize,

    // Current key context, kept in sync by the notifications.
    font: FontId,
    size: Fract,
    bin: SubpixelBin,
}

impl MaskCache {
    /// Creates a cache with the default byte budget (8 MiB of coverage).
    pub fn new() -> MaskCache {
        MaskCache::with_budget(DEFAULT_BUDGET)
    }

    pub fn with_budget(budget: usize) -> MaskCache {
        MaskCache {
            masks: LruCache::unbounded_with_hasher(ahash::RandomState::new()),
            budget,
            used: 0,
            font: FontId::default(),
            size: Fract::ZERO,
            bin: SubpixelBin { x: 0, y: 0 },
        }
    }

    /// Bytes of coverage currently retained.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn clear(&mut self) {
        self.masks.clear();
        self.used = 0;
    }

    fn key(&self, glyph: GlyphIndex) -> MaskKey {
        MaskKey {
            font: self.font,
            size: self.size.raw(),
            glyph,
            bin: self.bin,
        }
    }

    fn evict_over_budget(&mut self) {
        while self.used > self.budget {
            match self.masks.pop_lru() {
                Some((key, mask)) => {
                    self.used -= mask.byte_size();
                    log::debug!("evicted mask for glyph {} ({:?})", key.glyph, key.bin);
                }
                None => break,
            }
        }
    }
}

impl Default for MaskCache {
    fn default() -> Self {
        MaskCache::new()
    }
}

impl CacheHandler for MaskCache {
    fn get_mask(&mut self, glyph: GlyphIndex) -> Option<Arc<Mask>> {
        let key = self.key(glyph);
        self.masks.get(&key).cloned()
    }

    fn pass_mask(&mut self, glyph: GlyphIndex, mask: Arc<Mask>) {
        let key = self.key(glyph);
        let bytes = mask.byte_size();
        if bytes > self.budget {
            log::warn!(
                "mask for glyph {} ({} bytes) exceeds the whole cache budget, it will thrash",
                glyph,
                bytes
            );
        }
        self.used += bytes;
        if let Some(old) = self.masks.put(key, mask) {
            self.used -= old.byte_size();
        }
        self.evict_over_budget();
    }

    fn notify_font_change(&mut self, font: FontId) {
        self.font = font;
    }

    fn notify_size_change(&mut self, size: Fract) {
        self.size = size;
    }

    fn notify_rasterizer_change(&mut self) {
        self.clear();
    }

    fn notify_fract_change(&mut self, bin: SubpixelBin) {
        self.bin = bin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(bytes: usize) -> Arc<Mask> {
        Arc::new(Mask {
            width: bytes as u32,
            height: 1,
            left: 0,
            top: 0,
            coverage: vec![0xff; bytes],
        })
    }

    #[test]
    fn bins_follow_quantization() {
        let pos = Point::new(Fract::from_raw(64 + 48), Fract::from_raw(16));
        let bin = SubpixelBin::new(pos, Quantization::Quarter, Quantization::Full);
        assert_eq!(bin, SubpixelBin { x: 3, y: 0 });
        assert_eq!(
            bin.offset(Quantization::Quarter, Quantization::Full),
            Point::new(Fract::from_raw(48), Fract::ZERO)
        );

        // Whole-pixel snapping only ever produces one bucket.
        let bin = SubpixelBin::new(pos, Quantization::Full, Quantization::Full);
        assert_eq!(bin, SubpixelBin { x: 0, y: 0 });
    }

    #[test]
    fn cache_round_trip_and_context() {
        let mut cache = MaskCache::new();
        cache.pass_mask(7, mask(4));
        assert!(cache.get_mask(7).is_some());
        assert!(cache.get_mask(8).is_none());

        // A size change addresses a different key space.
        cache.notify_size_change(Fract::from_pixels(20));
        assert!(cache.get_mask(7).is_none());
        cache.notify_size_change(Fract::ZERO);
        assert!(cache.get_mask(7).is_some());

        // Rasterizer changes drop everything.
        cache.notify_rasterizer_change();
        assert!(cache.get_mask(7).is_none());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn byte_budget_evicts_least_recent() {
        let mut cache = MaskCache::with_budget(8);
        cache.pass_mask(1, mask(4));
        cache.pass_mask(2, mask(4));
        cache.pass_mask(3, mask(4));
        assert!(cache.used_bytes() <= 8);
        assert!(cache.get_mask(1).is_none());
        assert!(cache.get_mask(3).is_some());
    }
}
