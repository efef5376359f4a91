//! A [`Sizer`] backed by parsed TTF/OTF faces.

use slotmap::SlotMap;
use ttf_parser::GlyphId;

use crate::fract::Fract;
use crate::sizer::{FontId, GlyphIndex, Sizer};

#[derive(Debug, thiserror::Error)]
#[error("failed to parse font as TTF/OTF font data")]
pub struct MalformedFont;

type FaceRef<'a> = ttf_parser::Face<'a>;

self_cell::self_cell!(
    struct OwnedFace {
        owner: Vec<u8>,

        #[covariant]
        dependent: FaceRef,
    }
);

/// Metrics oracle deriving everything from font tables via `ttf-parser`.
///
/// Kerning comes from the `kern` table when present. Faces are registered
/// with [`FaceSizer::insert`] and addressed through the returned [`FontId`].
pub struct FaceSizer {
    faces: SlotMap<FontId, OwnedFace>,
}

impl FaceSizer {
    pub fn new() -> FaceSizer {
        FaceSizer {
            faces: SlotMap::with_key(),
        }
    }

    /// Parses a face and registers it, taking ownership of the data.
    pub fn insert(&mut self, data: Vec<u8>) -> Result<FontId, MalformedFont> {
        let face = OwnedFace::try_new(data, |data| ttf_parser::Face::parse(data, 0))
            .map_err(|_| MalformedFont)?;
        let id = self.faces.insert(face);
        log::debug!(
            "registered face {:?} ({} glyphs)",
            id,
            self.faces[id].borrow_dependent().number_of_glyphs()
        );
        Ok(id)
    }

    pub fn remove(&mut self, font: FontId) {
        self.faces.remove(font);
    }

    fn face(&self, font: FontId) -> &ttf_parser::Face<'_> {
        self.faces
            .get(font)
            .expect("font not registered with this FaceSizer")
            .borrow_dependent()
    }
}

impl Default for FaceSizer {
    fn default() -> Self {
        FaceSizer::new()
    }
}

/// Scales a value in font units to fractional units at the given size.
fn scaled(units: i32, units_per_em: u16, size: Fract) -> Fract {
    let wide = units as i64 * size.raw() as i64;
    Fract::from_raw((wide / units_per_em.max(1) as i64) as i32)
}

impl Sizer for FaceSizer {
    fn glyph_index(&mut self, font: FontId, code_point: char) -> GlyphIndex {
        self.face(font)
            .glyph_index(code_point)
            .map(|id| id.0)
            .unwrap_or(0)
    }

    fn advance(&mut self, font: FontId, size: Fract, glyph: GlyphIndex) -> Fract {
        let face = self.face(font);
        let advance = face.glyph_hor_advance(GlyphId(glyph)).unwrap_or(0);
        scaled(advance as i32, face.units_per_em(), size)
    }

    fn kern(&mut self, font: FontId, size: Fract, left: GlyphIndex, right: GlyphIndex) -> Fract {
        let face = self.face(font);
        let Some(kern) = face.tables().kern else {
            return Fract::ZERO;
        };
        for subtable in kern.subtables {
            if !subtable.horizontal || subtable.variable {
                continue;
            }
            if let Some(value) = subtable.glyphs_kerning(GlyphId(left), GlyphId(right)) {
                return scaled(value as i32, face.units_per_em(), size);
            }
        }
        Fract::ZERO
    }

    fn line_height(&mut self, font: FontId, size: Fract) -> Fract {
        let face = self.face(font);
        let units = face.ascender() as i32 - face.descender() as i32 + face.line_gap() as i32;
        scaled(units, face.units_per_em(), size)
    }

    fn ascent(&mut self, font: FontId, size: Fract) -> Fract {
        let face = self.face(font);
        scaled(face.ascender() as i32, face.units_per_em(), size)
    }

    fn descent(&mut self, font: FontId, size: Fract) -> Fract {
        // Positive distance below the baseline.
        let face = self.face(font);
        scaled(-(face.descender() as i32), face.units_per_em(), size)
    }

    fn x_height(&mut self, font: FontId, size: Fract) -> Fract {
        let face = self.face(font);
        match face.x_height() {
            Some(height) => scaled(height as i32, face.units_per_em(), size),
            // Common approximation for faces without the metric.
            None => scaled(face.ascender() as i32, face.units_per_em(), size).half(),
        }
    }

    fn cap_height(&mut self, font: FontId, size: Fract) -> Fract {
        let face = self.face(font);
        match face.capital_height() {
            Some(height) => scaled(height as i32, face.units_per_em(), size),
            None => scaled(face.ascender() as i32, face.units_per_em(), size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_is_linear_in_size() {
        // 500 font units at 1000 upem is half the size.
        assert_eq!(
            scaled(500, 1000, Fract::from_pixels(16)),
            Fract::from_pixels(8)
        );
        assert_eq!(scaled(0, 1000, Fract::from_pixels(16)), Fract::ZERO);
        assert_eq!(
            scaled(-200, 1000, Fract::from_pixels(20)),
            Fract::from_pixels(-4)
        );
    }

    #[test]
    fn malformed_data_is_rejected() {
        let mut sizer = FaceSizer::new();
        assert!(sizer.insert(vec![0, 1, 2, 3]).is_err());
    }
}
