//! # Print Pipeline
//!
//! The single serialization point tying the stages together: a render
//! request flows template → compositor → (rotation) → dither → pack →
//! protocol frame. The CLI and any embedding caller drive prints through
//! [`PrintJob`] instead of wiring stages by hand.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::EtiquetaError;
use crate::printer::{Orientation, PrinterConfig};
use crate::protocol::ProtocolFrame;
use crate::render::{dither, pack, Compositor, Surface};
use crate::template::measure::TextMeasurer;
use crate::template::{render::render_document, Template};

/// One label print (or preview) in flight.
pub struct PrintJob<'a> {
    pub template: &'a Template,
    pub config: &'a PrinterConfig,
    /// Field ids suppressed from this render
    pub hidden: BTreeSet<String>,
    /// Value overrides on top of the template's stored values
    pub overrides: BTreeMap<String, String>,
}

impl<'a> PrintJob<'a> {
    pub fn new(template: &'a Template, config: &'a PrinterConfig) -> Self {
        PrintJob {
            template,
            config,
            hidden: BTreeSet::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Effective field values: stored values with overrides applied.
    fn values(&self) -> BTreeMap<String, String> {
        let mut values = self.template.values.clone();
        values.extend(self.overrides.clone());
        values
    }

    /// Render and composite at device resolution (pre-rotation space).
    ///
    /// This is the preview surface: continuous-tone, unrotated.
    pub fn composite(
        &self,
        compositor: &Compositor,
        measurer: &dyn TextMeasurer,
    ) -> Result<Surface, EtiquetaError> {
        self.config.validate()?;
        let svg = render_document(
            &self.template.svg,
            &self.template.fields,
            &self.values(),
            &self.hidden,
            measurer,
        )?;
        let (width_px, height_px) = self.config.pixel_dimensions();
        compositor.composite(&svg, width_px, height_px)
    }

    /// Produce the final binary surface: rotated for landscape, dithered.
    pub fn rasterize(
        &self,
        compositor: &Compositor,
        measurer: &dyn TextMeasurer,
    ) -> Result<Surface, EtiquetaError> {
        let surface = self.composite(compositor, measurer)?;
        let surface = match self.config.orientation {
            Orientation::Portrait => surface,
            Orientation::Landscape => surface.rotate90_cw(),
        };
        Ok(dither::floyd_steinberg(&surface))
    }

    /// Encode the full outbound command frame.
    pub fn encode(
        &self,
        compositor: &Compositor,
        measurer: &dyn TextMeasurer,
    ) -> Result<ProtocolFrame, EtiquetaError> {
        let surface = self.rasterize(compositor, measurer)?;
        Ok(encode_surface(&surface, self.config))
    }
}

/// Pack an already-binary surface into a command frame.
pub fn encode_surface(surface: &Surface, config: &PrinterConfig) -> ProtocolFrame {
    let bitmap = pack::pack_surface(surface);
    ProtocolFrame::new(
        config.speed,
        config.darkness,
        config.paper,
        pack::row_bytes(surface.width()) as u16,
        surface.height() as u16,
        bitmap,
    )
}

// ============================================================================
// TESTS
// ============================================================================
