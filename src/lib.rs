//! A sub-pixel text layout engine. Computes the exact fractional
//! positions at which glyphs must be drawn, measures the box a text would
//! occupy, and interprets rich-text ("twine") control codes with a
//! two-pass effect stack. It does not parse fonts, rasterize outlines or
//! composite pixels itself; those jobs live behind the [`Sizer`],
//! [`Rasterizer`], [`CacheHandler`] and [`Target`] contracts.
//!
//! Measurement and drawing share one traversal, so centered and
//! right-aligned text lands exactly where a measuring pass predicted.

mod align;
mod cache;
mod error;
mod feed;
pub mod fract;
mod raster;
mod renderer;
mod sizer;
mod twine;

#[cfg(test)]
mod testutil;

pub use align::Align;
pub use cache::{CacheHandler, MaskCache, SubpixelBin};
pub use error::{Error, Result};
pub use feed::Feed;
pub use fract::{Fract, Point, Quantization};
pub use raster::{BlendMode, Mask, Rasterizer, Target};
pub use renderer::{Direction, Measurement, MissPolicy, RenderState, Renderer};
pub use sizer::{FaceSizer, FontId, GlyphIndex, MalformedFont, Sizer};
pub use twine::{EffectArgs, EffectKey, EffectSpacing, EffectTrigger, PassMode, Twine};

pub use palette::Srgba;
