//! Serial port access
//!
//! The [`PortOpener`] seam keeps the scan driver independent of real
//! hardware: production opens a `tokio_serial::SerialStream`, tests
//! substitute in-memory streams.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
#[cfg(target_os = "linux")]
use std::fs;
use std::io;
use std::time::Duration;

use serialport::{SerialPortInfo, SerialPortType};
use tokio::io::AsyncRead;
use tokio_serial::{SerialPort, SerialStream};

/// Opens candidate ports for the scan driver
pub trait PortOpener: Send + 'static {
    /// The byte stream a successful open yields
    type Port: AsyncRead + Send + Unpin + 'static;

    /// Try to open the named port
    fn open(&mut self, name: &str) -> impl Future<Output = io::Result<Self::Port>> + Send;
}

/// Production opener backed by tokio-serial
pub struct SerialOpener {
    baud_rate: u32,
}

impl SerialOpener {
    /// Opener for the given baud rate
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl PortOpener for SerialOpener {
    type Port = SerialStream;

    async fn open(&mut self, name: &str) -> io::Result<SerialStream> {
        // Standard 8N1, no flow control
        let builder = tokio_serial::new(name, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(100));

        let mut stream = SerialStream::open(&builder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        // Keep DTR asserted so opening the port does not bounce the Arduino
        // into its bootloader reset
        if let Err(e) = stream.write_data_terminal_ready(true) {
            tracing::debug!(port = name, error = %e, "could not assert DTR, continuing");
        }

        Ok(stream)
    }
}

/// An attached serial port, ordered the way the scan probes candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,
    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,
    /// USB product ID (if USB device)
    pub pid: Option<u16>,
    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }

    /// Whether this port name is one an Arduino plausibly enumerates as
    pub fn is_arduino_candidate(&self) -> bool {
        let base = self.basename();
        base.starts_with("ttyACM") || base.starts_with("ttyUSB") || base.starts_with("COM")
    }

    fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Probe rank: ttyACM* numerically, then ttyUSB*, then the rest.
    /// ACM is where a genuine Arduino CDC device lands first.
    fn rank(&self) -> (u8, usize) {
        let base = self.basename();
        for (class, prefix) in [(0u8, "ttyACM"), (1u8, "ttyUSB")] {
            if let Some(rest) = base.strip_prefix(prefix) {
                return (class, rest.parse().unwrap_or(usize::MAX));
            }
        }
        (2, 0)
    }
}

impl Ord for PortInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for PortInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let mut port = PortInfo::bare(info.port_name);
        if let SerialPortType::UsbPort(usb) = info.port_type {
            port.vid = Some(usb.vid);
            port.pid = Some(usb.pid);
            port.product = usb.product;
        }
        port
    }
}

/// List attached serial ports in probe order, with a /dev fallback for
/// devices the platform enumeration misses.
pub fn list_ports() -> Vec<PortInfo> {
    let mut by_name: BTreeMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .map(|p| (p.name.clone(), p))
        .collect();

    #[cfg(target_os = "linux")]
    for name in dev_tty_fallback() {
        by_name
            .entry(name.clone())
            .or_insert_with(|| PortInfo::bare(name));
    }

    let mut ports: Vec<PortInfo> = by_name.into_values().collect();
    ports.sort();
    ports
}

#[cfg(target_os = "linux")]
fn dev_tty_fallback() -> Vec<String> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.starts_with("ttyACM") || n.starts_with("ttyUSB"))
        .map(|n| format!("/dev/{n}"))
        .collect()
}
