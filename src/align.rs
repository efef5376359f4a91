//! Two-axis text alignment.

use bitflags::bitflags;

use crate::fract::Fract;

bitflags! {
    /// Where drawn text sits relative to the anchor position.
    ///
    /// The horizontal and vertical components occupy disjoint bits and can
    /// be combined freely (e.g. `Align::RIGHT | Align::TOP`). An empty
    /// `Align` is only meaningful as "no override" when passed to
    /// [`Renderer::set_align`](crate::Renderer::set_align).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Align: u16 {
        const LEFT = 1 << 0;
        const HORZ_CENTER = 1 << 1;
        const RIGHT = 1 << 2;

        /// The anchor is the top of the first line.
        const TOP = 1 << 3;
        /// The anchor is the cap-height line of the first line.
        const CAP_LINE = 1 << 4;
        /// The anchor is the x-height line of the first line.
        const MIDLINE = 1 << 5;
        /// The anchor is the vertical center of the whole text.
        const VERT_CENTER = 1 << 6;
        /// The anchor is the baseline of the first line.
        const BASELINE = 1 << 7;
        /// The anchor is the bottom of the whole text.
        const BOTTOM = 1 << 8;
        /// The anchor is the baseline of the last line.
        const LAST_BASELINE = 1 << 9;
    }
}

impl Align {
    const HORZ_MASK: Align = Align::LEFT
        .union(Align::HORZ_CENTER)
        .union(Align::RIGHT);
    const VERT_MASK: Align = Align::TOP
        .union(Align::CAP_LINE)
        .union(Align::MIDLINE)
        .union(Align::VERT_CENTER)
        .union(Align::BASELINE)
        .union(Align::BOTTOM)
        .union(Align::LAST_BASELINE);

    /// The horizontal component, possibly empty.
    pub fn horz(self) -> Align {
        self & Align::HORZ_MASK
    }

    /// The vertical component, possibly empty.
    pub fn vert(self) -> Align {
        self & Align::VERT_MASK
    }

    /// Combines with `new`, keeping each axis from `new` when it carries
    /// one and falling back to `self` otherwise.
    pub fn adjusted(self, new: Align) -> Align {
        let horz = if new.horz().is_empty() {
            self.horz()
        } else {
            new.horz()
        };
        let vert = if new.vert().is_empty() {
            self.vert()
        } else {
            new.vert()
        };
        horz | vert
    }

    /// Whether each axis holds exactly one flag.
    pub fn is_valid(self) -> bool {
        self.horz().bits().count_ones() == 1 && self.vert().bits().count_ones() == 1
    }
}

/// Vertical line metrics needed to resolve an anchor into a baseline.
#[derive(Copy, Clone, Debug)]
pub(crate) struct VertMetrics {
    pub ascent: Fract,
    pub cap_height: Fract,
    pub x_height: Fract,
}

/// Height of a whole text, as computed by a measuring pass.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct ContentHeight {
    /// Total height, including the final line-height term when counted.
    pub height: Fract,
    /// Sum of the line advances alone (the distance from the first to the
    /// last baseline).
    pub advances: Fract,
}

/// Offset from the anchor Y to the baseline of the first line.
///
/// `content` is only invoked for the variants that need the text's height,
/// at most once per call.
pub(crate) fn baseline_offset(
    vert: Align,
    metrics: VertMetrics,
    content: impl FnOnce() -> ContentHeight,
) -> Fract {
    let a = metrics.ascent;
    if vert == Align::TOP {
        a
    } else if vert == Align::CAP_LINE {
        a - metrics.cap_height
    } else if vert == Align::MIDLINE {
        a - metrics.x_height
    } else if vert == Align::BASELINE {
        Fract::ZERO
    } else if vert == Align::VERT_CENTER {
        a - content().height.half()
    } else if vert == Align::BOTTOM {
        a - content().height
    } else if vert == Align::LAST_BASELINE {
        -content().advances
    } else {
        panic!("invalid vertical align {:?}", vert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_are_disjoint() {
        assert_eq!(Align::HORZ_MASK & Align::VERT_MASK, Align::empty());
    }

    #[test]
    fn adjusted_keeps_missing_axis() {
        let base = Align::LEFT | Align::BASELINE;
        assert_eq!(base.adjusted(Align::RIGHT), Align::RIGHT | Align::BASELINE);
        assert_eq!(base.adjusted(Align::TOP), Align::LEFT | Align::TOP);
        assert_eq!(
            base.adjusted(Align::HORZ_CENTER | Align::BOTTOM),
            Align::HORZ_CENTER | Align::BOTTOM
        );
        assert_eq!(base.adjusted(Align::empty()), base);
    }

    #[test]
    fn validity() {
        assert!((Align::LEFT | Align::BASELINE).is_valid());
        assert!(!(Align::LEFT | Align::RIGHT | Align::BASELINE).is_valid());
        assert!(!Align::LEFT.is_valid());
        assert!(!Align::empty().is_valid());
    }

    #[test]
    fn baseline_offsets() {
        let metrics = VertMetrics {
            ascent: Fract::from_pixels(12),
            cap_height: Fract::from_pixels(10),
            x_height: Fract::from_pixels(7),
        };
        let content = ContentHeight {
            height: Fract::from_pixels(40),
            advances: Fract::from_pixels(20),
        };

        let offset = |vert| baseline_offset(vert, metrics, || content);
        assert_eq!(offset(Align::TOP), Fract::from_pixels(12));
        assert_eq!(offset(Align::CAP_LINE), Fract::from_pixels(2));
        assert_eq!(offset(Align::MIDLINE), Fract::from_pixels(5));
        assert_eq!(offset(Align::BASELINE), Fract::ZERO);
        assert_eq!(offset(Align::VERT_CENTER), Fract::from_pixels(-8));
        assert_eq!(offset(Align::BOTTOM), Fract::from_pixels(-28));
        assert_eq!(offset(Align::LAST_BASELINE), Fract::from_pixels(-20));
    }
}
