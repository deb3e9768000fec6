//! # Phomemo Protocol Implementation
//!
//! Command-frame builders for the byte protocol spoken by Phomemo M-series
//! label printers (M110/M120/M220). A print job is a single frame of four
//! ordered segments:
//!
//! 1. **Header** — speed, darkness and paper-type configuration
//! 2. **Block marker** — announces the bitmap's row byte width and height
//! 3. **Bitmap** — the packed 1-bit raster, unmodified
//! 4. **Footer** — feed/finalize opcodes
//!
//! ## Byte Order
//!
//! The block marker's row-byte-width and height are encoded little-endian as
//! two bytes each.
//!
//! ## Usage Example
//!
//! ```
//! use etiqueta::protocol::{self, PaperType};
//!
//! let header = protocol::header(5, 8, PaperType::LabelWithGaps);
//! assert_eq!(header, [0x1B, 0x4E, 0x0D, 0x05, 0x1B, 0x4E, 0x04, 0x08, 0x1F, 0x11, 0x0A]);
//!
//! let marker = protocol::block_marker(48, 100);
//! assert_eq!(marker, [0x1D, 0x76, 0x30, 0x00, 0x30, 0x00, 0x64, 0x00]);
//! ```

use serde::{Deserialize, Serialize};

/// Paper stock loaded in the printer, as understood by the header command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperType {
    /// Die-cut labels separated by transparent gaps (0x0A)
    #[default]
    LabelWithGaps,
    /// Continuous roll without separators (0x0B)
    Continuous,
    /// Labels separated by printed black marks (0x26)
    LabelWithMarks,
}

impl PaperType {
    /// Wire code sent in the header.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            PaperType::LabelWithGaps => 0x0A,
            PaperType::Continuous => 0x0B,
            PaperType::LabelWithMarks => 0x26,
        }
    }

    /// Parse a wire code back into a paper type.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x0A => Some(PaperType::LabelWithGaps),
            0x0B => Some(PaperType::Continuous),
            0x26 => Some(PaperType::LabelWithMarks),
            _ => None,
        }
    }
}

/// Build the configuration header.
///
/// | Bytes            | Meaning        |
/// |------------------|----------------|
/// | 1B 4E 0D `speed` | print speed    |
/// | 1B 4E 04 `dark`  | darkness       |
/// | 1F 11 `paper`    | paper type     |
///
/// Range checking of `speed` (1–5) and `darkness` (1–15) happens in
/// [`PrinterConfig::validate`](crate::printer::PrinterConfig::validate);
/// this builder emits exactly what it is given.
#[inline]
pub fn header(speed: u8, darkness: u8, paper: PaperType) -> [u8; 11] {
    [
        0x1B, 0x4E, 0x0D, speed,
        0x1B, 0x4E, 0x04, darkness,
        0x1F, 0x11, paper.code(),
    ]
}

/// Build the block marker announcing the bitmap dimensions.
///
/// `row_bytes` is the packed row width in bytes (ceil(pixel width / 8)),
/// `height` the raster height in rows. Both are little-endian u16.
#[inline]
pub fn block_marker(row_bytes: u16, height: u16) -> [u8; 8] {
    let [rl, rh] = row_bytes.to_le_bytes();
    let [hl, hh] = height.to_le_bytes();
    [0x1D, 0x76, 0x30, 0x00, rl, rh, hl, hh]
}

/// Build the feed/finalize footer.
#[inline]
pub fn footer() -> [u8; 8] {
    [0x1F, 0xF0, 0x05, 0x00, 0x1F, 0xF0, 0x03, 0x00]
}

/// A fully assembled outbound command frame.
///
/// The four segments are kept separate because the transport writes them
/// sequentially through one exclusive writer; [`ProtocolFrame::to_bytes`]
/// concatenates them for inspection and tests.
#[derive(Debug, Clone)]
pub struct ProtocolFrame {
    pub header: [u8; 11],
    pub block_marker: [u8; 8],
    pub bitmap: Vec<u8>,
    pub footer: [u8; 8],
}

impl ProtocolFrame {
    /// Assemble a frame from an already-packed bitmap.
    pub fn new(speed: u8, darkness: u8, paper: PaperType, row_bytes: u16, height: u16, bitmap: Vec<u8>) -> Self {
        debug_assert_eq!(bitmap.len(), row_bytes as usize * height as usize);
        ProtocolFrame {
            header: header(speed, darkness, paper),
            block_marker: block_marker(row_bytes, height),
            bitmap,
            footer: footer(),
        }
    }

    /// Concatenate all segments in wire order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(11 + 8 + self.bitmap.len() + 8);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.block_marker);
        out.extend_from_slice(&self.bitmap);
        out.extend_from_slice(&self.footer);
        out
    }
}

// ============================================================================
// TESTS
// ============================================================================
