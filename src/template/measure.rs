//! Text measurement capability for autosizing.
//!
//! The autosize binary search in [`render`](super::render) never talks to a
//! font stack directly; it goes through the [`TextMeasurer`] trait so tests
//! can substitute a deterministic fake with a known width function.
//!
//! [`SystemFontMeasurer`] is the production implementation: it resolves the
//! requested family through the same font database the compositor
//! rasterizes with, then sums glyph advances with `ab_glyph`.

use std::sync::Arc;

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use usvg::fontdb;

/// Measures the advance width of a single line of text.
pub trait TextMeasurer {
    /// Width of `text` at `font_size` (in user units / px) for the given
    /// CSS-style family list and weight, or `None` when measurement is not
    /// possible (missing font, unreadable face).
    fn measure(&self, text: &str, font_size: f32, family: &str, weight: u16) -> Option<f32>;
}

/// Production measurer backed by the system font database.
pub struct SystemFontMeasurer {
    db: Arc<fontdb::Database>,
}

impl SystemFontMeasurer {
    /// Wrap an already-loaded font database (shared with the compositor).
    pub fn new(db: Arc<fontdb::Database>) -> Self {
        SystemFontMeasurer { db }
    }

    /// Load system fonts into a fresh database.
    pub fn from_system_fonts() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        SystemFontMeasurer { db: Arc::new(db) }
    }
}

/// Map a CSS font-family list onto fontdb families, always ending in a
/// sans-serif fallback.
fn families(list: &str) -> Vec<fontdb::Family<'_>> {
    let mut out: Vec<fontdb::Family> = list
        .split(',')
        .map(|f| f.trim().trim_matches(['"', '\'']))
        .filter(|f| !f.is_empty())
        .map(|f| match f {
            "sans-serif" => fontdb::Family::SansSerif,
            "serif" => fontdb::Family::Serif,
            "monospace" => fontdb::Family::Monospace,
            "cursive" => fontdb::Family::Cursive,
            "fantasy" => fontdb::Family::Fantasy,
            name => fontdb::Family::Name(name),
        })
        .collect();
    if !out.contains(&fontdb::Family::SansSerif) {
        out.push(fontdb::Family::SansSerif);
    }
    out
}

impl TextMeasurer for SystemFontMeasurer {
    fn measure(&self, text: &str, font_size: f32, family: &str, weight: u16) -> Option<f32> {
        let families = families(family);
        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight(weight),
            ..fontdb::Query::default()
        };
        let face = self.db.query(&query)?;
        self.db
            .with_face_data(face, |data, index| {
                let font = FontRef::try_from_slice_and_index(data, index).ok()?;
                let scaled = font.as_scaled(PxScale::from(font_size));
                let mut width = 0.0;
                for ch in text.chars() {
                    width += scaled.h_advance(font.glyph_id(ch));
                }
                Some(width)
            })
            .flatten()
    }
}

/// Deterministic measurer for tests: every glyph advances
/// `font_size * advance_em`.
pub struct FixedWidthMeasurer {
    pub advance_em: f32,
}

impl Default for FixedWidthMeasurer {
    fn default() -> Self {
        // Roughly the average advance of a sans-serif face
        FixedWidthMeasurer { advance_em: 0.6 }
    }
}

impl TextMeasurer for FixedWidthMeasurer {
    fn measure(&self, text: &str, font_size: f32, _family: &str, _weight: u16) -> Option<f32> {
        Some(text.chars().count() as f32 * font_size * self.advance_em)
    }
}

/// Measurer that always fails, for exercising the fallback path.
pub struct FailingMeasurer;

impl TextMeasurer for FailingMeasurer {
    fn measure(&self, _text: &str, _font_size: f32, _family: &str, _weight: u16) -> Option<f32> {
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================
