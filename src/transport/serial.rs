//! # Serial Transport
//!
//! Communication with the printer over a raw serial tty at 128000 baud.
//!
//! ## TTY Configuration
//!
//! The device is opened in raw mode so binary raster data passes through
//! unmodified:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR,
//!   ICRNL disabled
//! - **No software flow control**: IXON/IXOFF/IXANY disabled — 0x11 (XON) and
//!   0x13 (XOFF) both appear in the command frame
//! - **No output processing**: OPOST disabled
//! - **8-bit characters**: CS8, no parity
//! - **No echo, non-canonical**: ECHO, ECHONL, ICANON, ISIG, IEXTEN disabled
//!
//! 128000 baud is not a standard POSIX rate; on Linux it is programmed
//! through `termios2` with the `BOTHER` flag.
//!
//! ## Session Lifecycle
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──▶ Connected
//!       ▲                         │ timeout / failure
//!       └────── disconnect() ◀────┴──────────────┘
//! ```
//!
//! `connect()` races the open against a 10-second timer. Printing happens
//! synchronously while Connected; there is no distinct printing state.
//!
//! ## Chunked Writes
//!
//! Large bitmaps are written in chunks with a small delay so the printer's
//! input buffer is never overrun.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::EtiquetaError;
use crate::protocol::ProtocolFrame;

/// Fixed line rate the printer listens at.
pub const BAUD_RATE: u32 = 128_000;

/// Hard ceiling on how long a connect attempt may take.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default chunk size for writes (bytes)
const CHUNK_SIZE: usize = 4096;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

// ============================================================================
// PORT ENUMERATION
// ============================================================================

/// A candidate serial port offered to the device selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device node, e.g. `/dev/ttyACM0`
    pub path: PathBuf,
    /// USB vendor id when the port is USB-backed
    pub vendor_id: Option<u16>,
    /// USB product id when the port is USB-backed
    pub product_id: Option<u16>,
}

impl PortInfo {
    /// Stable device identity: `"{vendor_id}_{product_id}"` in decimal.
    ///
    /// `None` for ports without USB identity (e.g. bound RFCOMM nodes).
    pub fn device_id(&self) -> Option<String> {
        Some(format!("{}_{}", self.vendor_id?, self.product_id?))
    }
}

/// Enumerate candidate serial ports.
///
/// Scans `/sys/class/tty` for nodes backed by real hardware (USB CDC/serial
/// adapters and bound RFCOMM devices) and resolves USB vendor/product ids by
/// walking the sysfs device path.
#[cfg(target_os = "linux")]
pub fn list_ports() -> Result<Vec<PortInfo>, EtiquetaError> {
    const PREFIXES: &[&str] = &["ttyACM", "ttyUSB", "rfcomm"];

    let mut out = Vec::new();
    let entries = match std::fs::read_dir("/sys/class/tty") {
        Ok(entries) => entries,
        Err(_) => return Ok(out),
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        let dev_path = PathBuf::from("/dev").join(&name);
        if !dev_path.exists() {
            continue;
        }
        let (vendor_id, product_id) = usb_ids(&entry.path().join("device"));
        out.push(PortInfo {
            path: dev_path,
            vendor_id,
            product_id,
        });
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

#[cfg(not(target_os = "linux"))]
pub fn list_ports() -> Result<Vec<PortInfo>, EtiquetaError> {
    Ok(Vec::new())
}

/// Walk up the sysfs device hierarchy looking for `idVendor`/`idProduct`.
#[cfg(target_os = "linux")]
fn usb_ids(device_link: &Path) -> (Option<u16>, Option<u16>) {
    let Ok(mut dir) = device_link.canonicalize() else {
        return (None, None);
    };
    for _ in 0..6 {
        let vendor = dir.join("idVendor");
        let product = dir.join("idProduct");
        if vendor.exists() && product.exists() {
            return (read_hex_id(&vendor), read_hex_id(&product));
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }
    (None, None)
}

#[cfg(target_os = "linux")]
fn read_hex_id(path: &Path) -> Option<u16> {
    let raw = std::fs::read_to_string(path).ok()?;
    u16::from_str_radix(raw.trim(), 16).ok()
}

// ============================================================================
// DEVICE SELECTION
// ============================================================================

/// Host-environment capability: pick the device to connect to.
///
/// Returning `None` means the user cancelled the selection — that is a
/// non-error and [`TransportSession::connect`] reports it as `Ok(false)`.
pub trait DeviceSelector {
    fn select(&self, candidates: &[PortInfo]) -> Option<PortInfo>;
}

/// Picks the first USB-backed candidate, falling back to the first port.
pub struct FirstUsbSelector;

impl DeviceSelector for FirstUsbSelector {
    fn select(&self, candidates: &[PortInfo]) -> Option<PortInfo> {
        candidates
            .iter()
            .find(|p| p.vendor_id.is_some())
            .or_else(|| candidates.first())
            .cloned()
    }
}

/// Selects a fixed device path (`--port` on the CLI), with USB identity
/// filled in from the enumerated candidates when available.
pub struct FixedPathSelector {
    pub path: PathBuf,
}

impl DeviceSelector for FixedPathSelector {
    fn select(&self, candidates: &[PortInfo]) -> Option<PortInfo> {
        candidates
            .iter()
            .find(|p| p.path == self.path)
            .cloned()
            .or_else(|| {
                Some(PortInfo {
                    path: self.path.clone(),
                    vendor_id: None,
                    product_id: None,
                })
            })
    }
}

// ============================================================================
// SERIAL CHANNEL
// ============================================================================

/// An open raw serial channel to the printer.
pub struct SerialChannel {
    file: File,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl SerialChannel {
    /// Open a serial device and configure it for raw binary I/O at
    /// [`BAUD_RATE`].
    ///
    /// ## Errors
    ///
    /// Returns a transport error if the device cannot be opened (missing
    /// node, permissions — the user may need the `dialout` group) or the tty
    /// cannot be configured.
    pub fn open<P: AsRef<Path>>(device: P) -> Result<Self, EtiquetaError> {
        let path = device.as_ref();

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NOCTTY);
        }
        let file = options.open(path).map_err(|e| {
            EtiquetaError::Transport(format!("Failed to open {}: {}", path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            configure_tty_raw(file.as_raw_fd(), BAUD_RATE)?;
        }

        Ok(Self {
            file,
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        })
    }

    /// Wrap an arbitrary file without tty configuration. Test seam.
    #[cfg(test)]
    pub(crate) fn from_file(file: File) -> Self {
        Self {
            file,
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
        }
    }

    /// Write one frame segment, chunking large blocks to avoid overrunning
    /// the printer's input buffer.
    fn write_segment(&mut self, data: &[u8]) -> Result<(), EtiquetaError> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() <= self.chunk_size {
            self.file
                .write_all(data)
                .map_err(|e| EtiquetaError::Transport(format!("Write failed: {}", e)))?;
        } else {
            for chunk in data.chunks(self.chunk_size) {
                self.file
                    .write_all(chunk)
                    .map_err(|e| EtiquetaError::Transport(format!("Write failed: {}", e)))?;
                if !self.chunk_delay.is_zero() {
                    thread::sleep(self.chunk_delay);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EtiquetaError> {
        self.file
            .flush()
            .map_err(|e| EtiquetaError::Transport(format!("Flush failed: {}", e)))
    }
}

/// Configure a file descriptor for raw binary serial I/O.
///
/// Baud programming uses the Linux `termios2`/`BOTHER` interface because
/// 128000 baud has no `Bxxx` constant.
#[cfg(all(unix, target_os = "linux"))]
fn configure_tty_raw(fd: i32, baud: u32) -> Result<(), EtiquetaError> {
    use std::io;
    use std::mem::MaybeUninit;

    // Raw mode via standard termios
    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(EtiquetaError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    // Input flags: disable all processing, including XON/XOFF flow control
    // (0x11 and 0x13 appear in the frame bytes)
    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);

    // Output flags: disable post-processing
    termios.c_oflag &= !libc::OPOST;

    // Local flags: disable echo, canonical mode, signals
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

    // Control flags: 8-bit characters, no parity, receiver on
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(EtiquetaError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    // Custom baud via termios2/BOTHER
    let mut termios2: libc::termios2 = unsafe { std::mem::zeroed() };
    if unsafe { libc::ioctl(fd, libc::TCGETS2 as _, &mut termios2) } != 0 {
        return Err(EtiquetaError::Transport(format!(
            "TCGETS2 failed: {}",
            io::Error::last_os_error()
        )));
    }
    termios2.c_cflag &= !(libc::CBAUD as libc::tcflag_t);
    termios2.c_cflag |= libc::BOTHER as libc::tcflag_t;
    termios2.c_ispeed = baud;
    termios2.c_ospeed = baud;
    if unsafe { libc::ioctl(fd, libc::TCSETS2 as _, &termios2) } != 0 {
        return Err(EtiquetaError::Transport(format!(
            "TCSETS2 failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn configure_tty_raw(fd: i32, _baud: u32) -> Result<(), EtiquetaError> {
    // No BOTHER equivalent here; configure raw mode and keep the default
    // rate. cfmakeraw covers the same flag set as the Linux branch.
    use std::io;
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(EtiquetaError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };
    unsafe { libc::cfmakeraw(&mut termios) };
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(EtiquetaError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    log::warn!("custom baud unsupported on this platform, using the tty default");
    Ok(())
}

// ============================================================================
// TRANSPORT SESSION
// ============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the serial channel to one physical device at a time.
///
/// One session per caller — there is no implicit global instance. Printing
/// is synchronous from the caller's perspective and happens while
/// `Connected`; no writes overlap because the channel is exclusively
/// borrowed for the duration of a print.
#[derive(Default)]
pub struct TransportSession {
    state: SessionState,
    channel: Option<SerialChannel>,
    device_id: Option<String>,
}

impl TransportSession {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Stable identity of the connected device, when it has one.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Connect to a device chosen by `selector`.
    ///
    /// The open is raced against a 10-second timeout; on timeout the attempt
    /// is abandoned and the caller should prompt for device selection again.
    ///
    /// Returns `Ok(false)` when the user cancels the selection — that is not
    /// an error. Every other failure propagates.
    ///
    /// Calling `connect` while already connected performs a **disconnect**
    /// instead and returns `Ok(false)`: the connect entry point doubles as a
    /// toggle, so a UI's single connect button can also disconnect. Callers
    /// that do not want toggle semantics must check
    /// [`is_connected`](Self::is_connected) first.
    pub fn connect(&mut self, selector: &dyn DeviceSelector) -> Result<bool, EtiquetaError> {
        if self.channel.is_some() {
            self.disconnect();
            return Ok(false);
        }

        let candidates = list_ports()?;
        let Some(port) = selector.select(&candidates) else {
            log::info!("device selection cancelled");
            return Ok(false);
        };

        self.state = SessionState::Connecting;
        let path = port.path.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // The receiver may be gone after a timeout; the channel (and the
            // half-open device) is dropped either way.
            let _ = tx.send(SerialChannel::open(&path));
        });

        match rx.recv_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS)) {
            Ok(Ok(channel)) => {
                self.device_id = port.device_id();
                self.channel = Some(channel);
                self.state = SessionState::Connected;
                log::info!(
                    "connected to {} ({})",
                    port.path.display(),
                    self.device_id.as_deref().unwrap_or("no usb identity")
                );
                Ok(true)
            }
            Ok(Err(e)) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                Err(EtiquetaError::ConnectionTimeout(CONNECT_TIMEOUT_SECS))
            }
        }
    }

    /// Close the channel if open. Idempotent; always ends Disconnected.
    pub fn disconnect(&mut self) {
        if self.channel.take().is_some() {
            log::info!("disconnected");
        }
        self.device_id = None;
        self.state = SessionState::Disconnected;
    }

    /// Send a frame to the connected device.
    ///
    /// Writes header, block marker, bitmap and footer sequentially through
    /// the exclusively-held channel. Any failure is caught, logged, and
    /// reported as `false` — never propagated.
    pub fn print(&mut self, frame: &ProtocolFrame) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            log::error!("print requested with no device connected");
            return false;
        };

        let result = (|| {
            channel.write_segment(&frame.header)?;
            channel.write_segment(&frame.block_marker)?;
            channel.write_segment(&frame.bitmap)?;
            channel.write_segment(&frame.footer)?;
            channel.flush()
        })();

        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("print failed: {e}");
                false
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PaperType, ProtocolFrame};

    struct CancelSelector;
    impl DeviceSelector for CancelSelector {
        fn select(&self, _candidates: &[PortInfo]) -> Option<PortInfo> {
            None
        }
    }

    fn temp_file_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "etiqueta_serial_test_{tag}_{}",
            std::process::id()
        ))
    }

    fn connected_session(path: &Path) -> TransportSession {
        let file = File::create(path).unwrap();
        TransportSession {
            state: SessionState::Connected,
            channel: Some(SerialChannel::from_file(file)),
            device_id: Some("1155_22336".into()),
        }
    }

    #[test]
    fn test_device_id_format() {
        let port = PortInfo {
            path: PathBuf::from("/dev/ttyACM0"),
            vendor_id: Some(0x0483),
            product_id: Some(0x5740),
        };
        assert_eq!(port.device_id(), Some("1155_22336".to_string()));

        let unknown = PortInfo {
            path: PathBuf::from("/dev/rfcomm0"),
            vendor_id: None,
            product_id: None,
        };
        assert_eq!(unknown.device_id(), None);
    }

    #[test]
    fn test_cancelled_selection_is_not_an_error() {
        let mut session = TransportSession::new();
        let connected = session.connect(&CancelSelector).unwrap();
        assert!(!connected);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut session = TransportSession::new();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.device_id().is_none());
    }

    #[test]
    fn test_print_requires_connection() {
        let mut session = TransportSession::new();
        let frame = ProtocolFrame::new(5, 8, PaperType::LabelWithGaps, 1, 1, vec![0x00]);
        assert!(!session.print(&frame));
    }

    #[test]
    fn test_connect_while_connected_toggles_to_disconnect() {
        let path = temp_file_path("toggle");
        let mut session = connected_session(&path);
        assert!(session.is_connected());

        // Documented quirk: reentrant connect disconnects instead.
        let result = session.connect(&CancelSelector).unwrap();
        assert!(!result);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.device_id().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_print_writes_segments_in_wire_order() {
        let path = temp_file_path("print");
        let mut session = connected_session(&path);

        let bitmap = vec![0xAA; 48 * 100];
        let frame = ProtocolFrame::new(5, 8, PaperType::LabelWithGaps, 48, 100, bitmap);
        assert!(session.print(&frame));
        session.disconnect();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, frame.to_bytes());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_fixed_path_selector_falls_back_to_bare_port() {
        let selector = FixedPathSelector {
            path: PathBuf::from("/dev/ttyACM7"),
        };
        let picked = selector.select(&[]).unwrap();
        assert_eq!(picked.path, PathBuf::from("/dev/ttyACM7"));
        assert_eq!(picked.vendor_id, None);
    }

    #[test]
    fn test_first_usb_selector_prefers_usb_identity() {
        let rfcomm = PortInfo {
            path: PathBuf::from("/dev/rfcomm0"),
            vendor_id: None,
            product_id: None,
        };
        let usb = PortInfo {
            path: PathBuf::from("/dev/ttyACM0"),
            vendor_id: Some(1),
            product_id: Some(2),
        };
        let picked = FirstUsbSelector
            .select(&[rfcomm.clone(), usb.clone()])
            .unwrap();
        assert_eq!(picked, usb);
        assert_eq!(FirstUsbSelector.select(&[rfcomm.clone()]), Some(rfcomm));
        assert_eq!(FirstUsbSelector.select(&[]), None);
    }
}
