//! # Rendering Module
//!
//! This module turns a rendered template document into printable pixels.
//!
//! ## Modules
//!
//! - [`dither`]: Floyd–Steinberg error diffusion for binary conversion
//! - [`pack`]: 1-bit-per-pixel row packing for the printhead
//!
//! ## Pipeline
//!
//! ```text
//! SVG string ──Compositor──▶ Surface (RGB, device resolution)
//!            ──rotate (landscape only)──▶ Surface
//!            ──dither──▶ Surface (binary)
//!            ──pack──▶ Vec<u8> (row-padded bitmap)
//! ```
//!
//! The compositor rasterizes at the device resolution of 203 dots per inch;
//! paper dimensions are configured in millimeters and converted here.

pub mod dither;
pub mod pack;

use resvg::tiny_skia;

use crate::error::EtiquetaError;

/// Device resolution in dots per inch.
pub const DPI: f32 = 203.0;

/// Convert a physical length in millimeters to device pixels at 203 dpi.
///
/// Always at least one pixel, so degenerate paper sizes cannot produce an
/// empty surface.
#[inline]
pub fn mm_to_px(mm: f32) -> u32 {
    (mm * DPI / 25.4).round().max(1.0) as u32
}

/// An offscreen RGB pixel surface.
///
/// Row-major, three bytes per pixel. Produced per print/preview and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    /// Create a surface filled with white.
    pub fn white(width: u32, height: u32) -> Self {
        Surface {
            width,
            height,
            data: vec![0xFF; width as usize * height as usize * 3],
        }
    }

    /// Wrap an existing RGB buffer. Panics if the length does not match.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width as usize * height as usize * 3);
        Surface { width, height, data }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Whether every pixel is pure black or pure white.
    pub fn is_binary(&self) -> bool {
        self.data.chunks_exact(3).all(|px| {
            px[0] == px[1] && px[1] == px[2] && (px[0] == 0x00 || px[0] == 0xFF)
        })
    }

    /// Rotate 90° clockwise: dimensions swap, pixels remap, no resampling.
    ///
    /// Used for landscape printing so the physical label comes out
    /// right-reading.
    pub fn rotate90_cw(&self) -> Surface {
        let mut out = Surface::white(self.height, self.width);
        for yd in 0..out.height {
            for xd in 0..out.width {
                out.set_pixel(xd, yd, self.pixel(yd, self.height - 1 - xd));
            }
        }
        out
    }

    /// Copy into an [`image::RgbImage`] (preview/PNG export).
    pub fn to_image(&self) -> image::RgbImage {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
            .expect("surface buffer matches its dimensions")
    }
}

/// # Compositor
///
/// Rasterizes a rendered template document onto a white [`Surface`] at the
/// requested pixel resolution, scaled to exactly fill it.
///
/// Holds the parsed font database so system fonts are only enumerated once
/// per process.
pub struct Compositor {
    options: usvg::Options<'static>,
}

impl Compositor {
    /// Create a compositor with system fonts loaded.
    pub fn new() -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        Compositor { options }
    }

    /// Shared font database handle (also consumed by text measurement).
    pub fn fontdb(&self) -> std::sync::Arc<usvg::fontdb::Database> {
        self.options.fontdb.clone()
    }

    /// Rasterize `svg` to an RGB surface of exactly `width_px` × `height_px`.
    ///
    /// The document is scaled (possibly anisotropically) so its viewport fills
    /// the surface. A malformed document aborts with
    /// [`EtiquetaError::TemplateParse`]; no partial surface is returned.
    pub fn composite(
        &self,
        svg: &str,
        width_px: u32,
        height_px: u32,
    ) -> Result<Surface, EtiquetaError> {
        if width_px == 0 || height_px == 0 {
            return Err(EtiquetaError::InvalidConfig(
                "label pixel dimensions must be non-zero".into(),
            ));
        }

        let tree = usvg::Tree::from_str(svg, &self.options)
            .map_err(|e| EtiquetaError::TemplateParse(e.to_string()))?;

        let mut pixmap = tiny_skia::Pixmap::new(width_px, height_px).ok_or_else(|| {
            EtiquetaError::InvalidConfig("label pixel dimensions out of range".into())
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let size = tree.size();
        let transform = tiny_skia::Transform::from_scale(
            width_px as f32 / size.width(),
            height_px as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        // The pixmap is premultiplied RGBA over an opaque white fill; flatten
        // to plain RGB.
        let mut data = Vec::with_capacity(width_px as usize * height_px as usize * 3);
        for px in pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue()]);
        }
        Ok(Surface::from_rgb(width_px, height_px, data))
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
