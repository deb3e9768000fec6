//! # Printer Configuration
//!
//! Per-device print settings for the supported Phomemo label printers.
//!
//! | Model | Print width | Resolution |
//! |-------|-------------|------------|
//! | M110  | 48mm        | 203 DPI    |
//! | M120  | 53mm        | 203 DPI    |
//! | M220  | 80mm        | 203 DPI    |
//!
//! A [`PrinterConfig`] is owned per physical device and persisted under the
//! device identity (see [`crate::store`]). It may embed a template snapshot
//! so a device keeps printing its last label layout without a template
//! library lookup.

use serde::{Deserialize, Serialize};

use crate::error::EtiquetaError;
use crate::protocol::PaperType;
use crate::render::mm_to_px;
use crate::template::Template;

/// Supported printer models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    M110,
    M120,
    M220,
}

/// Label orientation. Landscape swaps the composition axes and rotates the
/// raster 90° clockwise at print time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Print settings for one physical device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub model: Model,
    /// Burn darkness, 1–15
    pub darkness: u8,
    /// Feed speed, 1–5
    pub speed: u8,
    pub paper: PaperType,
    /// Label width in millimeters
    pub paper_width_mm: f32,
    /// Label height in millimeters
    pub paper_height_mm: f32,
    pub orientation: Orientation,
    /// Embedded template snapshot, if the device prints from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
    /// Library id of the template last printed on this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_template_id: Option<String>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        PrinterConfig {
            model: Model::M110,
            darkness: 8,
            speed: 5,
            paper: PaperType::LabelWithGaps,
            paper_width_mm: 30.0,
            paper_height_mm: 20.0,
            orientation: Orientation::Portrait,
            template: None,
            last_used_template_id: None,
        }
    }
}

impl PrinterConfig {
    /// Check parameter ranges before encoding a frame.
    pub fn validate(&self) -> Result<(), EtiquetaError> {
        if !(1..=15).contains(&self.darkness) {
            return Err(EtiquetaError::InvalidConfig(format!(
                "darkness {} out of range 1-15",
                self.darkness
            )));
        }
        if !(1..=5).contains(&self.speed) {
            return Err(EtiquetaError::InvalidConfig(format!(
                "speed {} out of range 1-5",
                self.speed
            )));
        }
        if self.paper_width_mm <= 0.0 || self.paper_height_mm <= 0.0 {
            return Err(EtiquetaError::InvalidConfig(
                "paper dimensions must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Composition resolution in pixels at 203 dpi.
    ///
    /// Landscape swaps width and height here — this is the pre-rotation
    /// coordinate space; the raster itself is rotated at print time.
    pub fn pixel_dimensions(&self) -> (u32, u32) {
        let (w, h) = match self.orientation {
            Orientation::Portrait => (self.paper_width_mm, self.paper_height_mm),
            Orientation::Landscape => (self.paper_height_mm, self.paper_width_mm),
        };
        (mm_to_px(w), mm_to_px(h))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrinterConfig::default();
        assert_eq!(config.model, Model::M110);
        assert_eq!(config.darkness, 8);
        assert_eq!(config.speed, 5);
        assert_eq!(config.paper, PaperType::LabelWithGaps);
        assert_eq!(config.orientation, Orientation::Portrait);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = PrinterConfig::default();
        config.darkness = 0;
        assert!(config.validate().is_err());
        config.darkness = 16;
        assert!(config.validate().is_err());
        config.darkness = 15;
        config.validate().unwrap();

        config.speed = 0;
        assert!(config.validate().is_err());
        config.speed = 6;
        assert!(config.validate().is_err());
        config.speed = 1;
        config.validate().unwrap();

        config.paper_width_mm = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pixel_dimensions_orientation() {
        let mut config = PrinterConfig::default();
        // 30x20mm at 203dpi
        assert_eq!(config.pixel_dimensions(), (240, 160));
        config.orientation = Orientation::Landscape;
        assert_eq!(config.pixel_dimensions(), (160, 240));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = PrinterConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PrinterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.darkness, config.darkness);
        assert_eq!(back.paper, config.paper);
        assert!(json.contains("\"label_with_gaps\""));
    }
}
