//! # Printer Transport Layer
//!
//! This module owns the serial channel to the physical printer and its
//! connect/print/disconnect lifecycle.
//!
//! ## Modules
//!
//! - [`serial`]: raw-tty serial channel, port enumeration and the
//!   [`TransportSession`] state machine

pub mod serial;

pub use serial::{
    list_ports, DeviceSelector, FirstUsbSelector, FixedPathSelector, PortInfo, SerialChannel,
    SessionState, TransportSession, BAUD_RATE,
};
