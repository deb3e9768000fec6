//! # Etiqueta - Thermal Label Printer Library
//!
//! Etiqueta renders parameterized SVG label templates and prints them on
//! Phomemo M-series thermal label printers over serial. It provides:
//!
//! - **Templates**: field extraction and per-field rendering (text
//!   autosizing, date formatting, QR encoding, image embedding)
//! - **Rasterization**: SVG compositing at 203 dpi, Floyd–Steinberg
//!   dithering, 1-bit row packing
//! - **Protocol**: the Phomemo command frame (header, block marker, bitmap,
//!   footer)
//! - **Transport**: serial connect/print/disconnect with timeout handling
//!
//! ## Quick Start
//!
//! ```no_run
//! use etiqueta::{
//!     pipeline::PrintJob,
//!     printer::PrinterConfig,
//!     render::Compositor,
//!     template::{measure::SystemFontMeasurer, Template},
//!     transport::{FirstUsbSelector, TransportSession},
//! };
//!
//! # fn main() -> Result<(), etiqueta::EtiquetaError> {
//! let template = Template::from_svg(
//!     "price_tag",
//!     "Price tag",
//!     std::fs::read_to_string("label.svg")?,
//! )?;
//! let config = PrinterConfig::default();
//!
//! let compositor = Compositor::new();
//! let measurer = SystemFontMeasurer::new(compositor.fontdb());
//!
//! let frame = PrintJob::new(&template, &config).encode(&compositor, &measurer)?;
//!
//! let mut session = TransportSession::new();
//! if session.connect(&FirstUsbSelector)? {
//!     let ok = session.print(&frame);
//!     session.disconnect();
//!     assert!(ok);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Field extraction, field rendering, measurement |
//! | [`render`] | Compositing, dithering, bit packing |
//! | [`protocol`] | Command frame builders |
//! | [`transport`] | Serial session lifecycle |
//! | [`printer`] | Per-device print settings |
//! | [`store`] | Template library and config persistence |
//! | [`pipeline`] | One-call render → frame composition |
//! | [`error`] | Error types |

pub mod error;
pub mod pipeline;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod store;
pub mod template;
pub mod transport;

// Re-exports for convenience
pub use error::EtiquetaError;
pub use printer::PrinterConfig;
pub use template::Template;
pub use transport::TransportSession;
