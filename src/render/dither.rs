//! # Floyd–Steinberg Error Diffusion
//!
//! Converts a continuous-tone RGB surface to binary (black/white) output
//! suitable for a thermal printhead.
//!
//! ## What is Dithering?
//!
//! Dithering simulates grayscale on a device that can only print black or
//! white. By varying the density of black dots, we create the illusion of
//! different gray levels.
//!
//! ```text
//! Grayscale:    White    Light    Medium    Dark    Black
//!               ░░░░░░   ░░▒░░░   ░▒░▒░▒   ▒▓▒▓▒▓   ██████
//! ```
//!
//! ## Error Diffusion
//!
//! Each pixel's luminance (`0.299 R + 0.587 G + 0.114 B`) is quantized to
//! pure black (< 128) or pure white, and the quantization error is pushed
//! onto the unvisited neighbors with the classic Floyd–Steinberg weights:
//!
//! ```text
//!             ┌───────┬───────┐
//!             │   *   │  7/16 │
//!     ┌───────┼───────┼───────┤
//!     │  3/16 │  5/16 │  1/16 │
//!     └───────┴───────┴───────┘
//! ```
//!
//! Writes past the last column or row are silently skipped.
//!
//! ## Idempotence
//!
//! An already-binary surface quantizes with zero error everywhere, so
//! re-dithering reproduces it unchanged. Tests rely on this.

use crate::render::Surface;

/// Quantization threshold on the 0–255 luminance scale.
const THRESHOLD: f32 = 128.0;

/// Rec. 601 luma weights for the RGB → luminance collapse.
#[inline]
fn luminance(rgb: [u8; 3]) -> f32 {
    0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32
}

/// Dither a surface to strictly binary RGB (every channel 0x00 or 0xFF).
///
/// The input surface is consumed; diffusion happens on a separate luminance
/// plane so channel updates cannot skew later luminance reads.
pub fn floyd_steinberg(surface: &Surface) -> Surface {
    let width = surface.width() as usize;
    let height = surface.height() as usize;

    // Working luminance plane; accumulates diffused error.
    let mut plane: Vec<f32> = Vec::with_capacity(width * height);
    for y in 0..surface.height() {
        for x in 0..surface.width() {
            plane.push(luminance(surface.pixel(x, y)));
        }
    }

    let mut out = Surface::white(surface.width(), surface.height());
    for y in 0..height {
        for x in 0..width {
            let old = plane[y * width + x];
            let new = if old < THRESHOLD { 0.0 } else { 255.0 };
            let err = old - new;

            let value = if new == 0.0 { 0x00 } else { 0xFF };
            out.set_pixel(x as u32, y as u32, [value, value, value]);

            // Right 7/16
            if x + 1 < width {
                plane[y * width + x + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < height {
                // Below-left 3/16
                if x > 0 {
                    plane[(y + 1) * width + x - 1] += err * 3.0 / 16.0;
                }
                // Below 5/16
                plane[(y + 1) * width + x] += err * 5.0 / 16.0;
                // Below-right 1/16
                if x + 1 < width {
                    plane[(y + 1) * width + x + 1] += err * 1.0 / 16.0;
                }
            }
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
