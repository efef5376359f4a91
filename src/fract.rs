//! Fixed-point units for sub-pixel positioning.
//!
//! All positions and advances in the engine are [`Fract`] values: signed
//! fixed-point integers with 64 subunits per pixel. Quantization rounds a
//! pen position to a coarser sub-pixel grid, trading positioning fidelity
//! for fewer rasterized variants of each glyph.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Number of subunits in one pixel.
pub const SUBUNITS_PER_PIXEL: i32 = 64;

/// The reference size, in pixels, that "logical" twine-effect spacing
/// values are expressed against.
pub(crate) const LOGICAL_REFERENCE_PIXELS: i64 = 16;

/// A fixed-point length or coordinate, 1/64ths of a pixel.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fract(i32);

impl Fract {
    pub const ZERO: Fract = Fract(0);
    pub const ONE: Fract = Fract(SUBUNITS_PER_PIXEL);

    /// Builds a value directly from subunits.
    pub const fn from_raw(subunits: i32) -> Self {
        Fract(subunits)
    }

    pub const fn from_pixels(pixels: i32) -> Self {
        Fract(pixels * SUBUNITS_PER_PIXEL)
    }

    /// Converts from pixels, rounding to the nearest subunit.
    pub fn from_f32(pixels: f32) -> Self {
        Fract((pixels * SUBUNITS_PER_PIXEL as f32).round() as i32)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / SUBUNITS_PER_PIXEL as f32
    }

    /// The whole-pixel part, rounding toward negative infinity.
    pub const fn floor_pixels(self) -> i32 {
        self.0 >> 6
    }

    /// The sub-pixel part, always in `0..64`.
    pub const fn fract_subunits(self) -> i32 {
        self.0 & (SUBUNITS_PER_PIXEL - 1)
    }

    /// Fixed-point product, rounded to the nearest subunit.
    pub fn mul(self, other: Fract) -> Fract {
        let wide = self.0 as i64 * other.0 as i64;
        Fract(((wide + SUBUNITS_PER_PIXEL as i64 / 2) >> 6) as i32)
    }

    pub fn half(self) -> Fract {
        Fract(self.0 / 2)
    }

    pub fn abs(self) -> Fract {
        Fract(self.0.abs())
    }

    /// Rescales a logical value, expressed relative to a 16 px reference
    /// size, to the given actual size.
    pub fn rescale(self, size: Fract) -> Fract {
        let wide = self.0 as i64 * size.0 as i64;
        Fract((wide / (LOGICAL_REFERENCE_PIXELS * SUBUNITS_PER_PIXEL as i64)) as i32)
    }

    /// Rounds toward positive infinity to a multiple of the granularity.
    ///
    /// Used in the direction of forward text flow so that positions never
    /// recede into already-placed content.
    pub fn quantize_up(self, quant: Quantization) -> Fract {
        let step = quant.step();
        let rem = self.0.rem_euclid(step);
        if rem == 0 {
            self
        } else {
            Fract(self.0 + step - rem)
        }
    }

    /// Rounds toward negative infinity to a multiple of the granularity.
    ///
    /// The mirrored rule for right-to-left pen movement.
    pub fn quantize_down(self, quant: Quantization) -> Fract {
        Fract(self.0 - self.0.rem_euclid(quant.step()))
    }
}

impl Add for Fract {
    type Output = Fract;

    fn add(self, rhs: Fract) -> Fract {
        Fract(self.0 + rhs.0)
    }
}

impl Sub for Fract {
    type Output = Fract;

    fn sub(self, rhs: Fract) -> Fract {
        Fract(self.0 - rhs.0)
    }
}

impl Neg for Fract {
    type Output = Fract;

    fn neg(self) -> Fract {
        Fract(-self.0)
    }
}

impl AddAssign for Fract {
    fn add_assign(&mut self, rhs: Fract) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Fract {
    fn sub_assign(&mut self, rhs: Fract) {
        self.0 -= rhs.0;
    }
}

impl From<i32> for Fract {
    fn from(pixels: i32) -> Fract {
        Fract::from_pixels(pixels)
    }
}

impl From<f32> for Fract {
    fn from(pixels: f32) -> Fract {
        Fract::from_f32(pixels)
    }
}

impl fmt::Debug for Fract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}

impl fmt::Display for Fract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}

/// Sub-pixel quantization granularity for one axis.
///
/// `None` keeps full 1/64 px precision; `Full` snaps to whole pixels.
/// Coarser granularities generate fewer rasterized variants per glyph at
/// the cost of positioning fidelity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantization {
    None,
    ThirtySecond,
    Sixteenth,
    Eighth,
    Quarter,
    Half,
    #[default]
    Full,
}

impl Quantization {
    /// Grid step in subunits.
    pub const fn step(self) -> i32 {
        match self {
            Quantization::None => 1,
            Quantization::ThirtySecond => 2,
            Quantization::Sixteenth => 4,
            Quantization::Eighth => 8,
            Quantization::Quarter => 16,
            Quantization::Half => 32,
            Quantization::Full => 64,
        }
    }

    /// Number of distinct sub-pixel buckets this granularity produces.
    pub const fn buckets(self) -> u8 {
        (SUBUNITS_PER_PIXEL / self.step()) as u8
    }
}

/// A fixed-point position.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: Fract,
    pub y: Fract,
}

impl Point {
    pub const ZERO: Point = Point {
        x: Fract::ZERO,
        y: Fract::ZERO,
    };

    pub fn new(x: impl Into<Fract>, y: impl Into<Fract>) -> Point {
        Point {
            x: x.into(),
            y: y.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_QUANTS: [Quantization; 7] = [
        Quantization::None,
        Quantization::ThirtySecond,
        Quantization::Sixteenth,
        Quantization::Eighth,
        Quantization::Quarter,
        Quantization::Half,
        Quantization::Full,
    ];

    #[test]
    fn quantize_up_monotonic() {
        for _ in 0..1000 {
            let v = Fract::from_raw(fastrand::i32(-10_000..10_000));
            for quant in ALL_QUANTS {
                let q = v.quantize_up(quant);
                assert!(q >= v, "{:?} quantized down to {:?}", v, q);
                assert_eq!(q.raw().rem_euclid(quant.step()), 0);
                assert!((q - v).raw() < quant.step());
            }
        }
    }

    #[test]
    fn quantize_down_mirrors_up() {
        for _ in 0..1000 {
            let v = Fract::from_raw(fastrand::i32(-10_000..10_000));
            for quant in ALL_QUANTS {
                assert_eq!(v.quantize_down(quant), -(-v).quantize_up(quant));
            }
        }
    }

    #[test]
    fn quantize_none_is_identity() {
        let v = Fract::from_raw(37);
        assert_eq!(v.quantize_up(Quantization::None), v);
        assert_eq!(v.quantize_down(Quantization::None), v);
    }

    #[test]
    fn floor_and_fract_of_negative_values() {
        let v = Fract::from_raw(-1);
        assert_eq!(v.floor_pixels(), -1);
        assert_eq!(v.fract_subunits(), 63);
    }

    #[test]
    fn rescale_is_proportional_to_reference() {
        // A logical pad of 4 px at the 16 px reference is 8 px at 32 px.
        let pad = Fract::from_pixels(4);
        assert_eq!(pad.rescale(Fract::from_pixels(32)), Fract::from_pixels(8));
        assert_eq!(pad.rescale(Fract::from_pixels(16)), pad);
        assert_eq!(pad.rescale(Fract::from_pixels(8)), Fract::from_pixels(2));
    }

    #[test]
    fn fixed_point_product() {
        let a = Fract::from_f32(1.5);
        let b = Fract::from_pixels(4);
        assert_eq!(a.mul(b), Fract::from_pixels(6));
    }
}
