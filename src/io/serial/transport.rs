// src/io/serial/transport.rs
//
// Serial transport: the only component that touches the physical port.
//
// - `Transport` trait: open/close, non-blocking reads, bounded writes and a
//   request/response `exchange` used by the Modbus poller
// - `SerialTransport`: serialport-backed implementation
// - Port claims: a process-wide registry so two sessions never share a port

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::config::PortConfig;
use super::utils::{
    to_serialport_data_bits, to_serialport_flow_control, to_serialport_parity,
    to_serialport_stop_bits,
};
use crate::io::error::TransportError;

/// Sleep between reads while waiting for a response in `exchange`
const EXCHANGE_POLL_INTERVAL: Duration = Duration::from_millis(2);

// ============================================================================
// Transport Trait
// ============================================================================

/// Outcome of a request/response exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exchange {
    /// A complete frame was received (exactly the bytes reported by `frame_len`)
    Complete(Vec<u8>),
    /// The timeout elapsed; holds whatever partial data arrived
    TimedOut(Vec<u8>),
    /// The cancel flag was raised while waiting
    Cancelled,
}

/// Byte-level access to an open serial line.
pub trait Transport: Send {
    /// Open the port. Fails with `AlreadyOpen` if a port is already open.
    fn open(&mut self, cfg: &PortConfig) -> Result<(), TransportError>;

    /// Close the port. Safe to call when nothing is open.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Return the bytes currently buffered by the driver. Never waits for data.
    fn read_available(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Write all bytes. A partial write is a `WriteFailed`.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Write `request`, then collect inbound bytes until `frame_len` reports a
    /// complete frame, `timeout` elapses or `cancel` is raised.
    ///
    /// `frame_len` returns the total frame length once enough of the frame
    /// header has arrived to know it.
    fn exchange(
        &mut self,
        request: &[u8],
        timeout: Duration,
        cancel: &AtomicBool,
        frame_len: &dyn Fn(&[u8]) -> Option<usize>,
    ) -> Result<Exchange, TransportError> {
        self.write(request)?;

        let deadline = Instant::now() + timeout;
        let mut buf: Vec<u8> = Vec::new();

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(Exchange::Cancelled);
            }

            let chunk = self.read_available()?;
            buf.extend_from_slice(&chunk);

            if let Some(len) = frame_len(&buf) {
                if buf.len() >= len {
                    buf.truncate(len);
                    return Ok(Exchange::Complete(buf));
                }
            }

            if Instant::now() >= deadline {
                return Ok(Exchange::TimedOut(buf));
            }

            std::thread::sleep(EXCHANGE_POLL_INTERVAL);
        }
    }
}

// ============================================================================
// Port Claims
// ============================================================================

/// Port names currently open anywhere in this process
static CLAIMED_PORTS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a port name, released on drop.
#[derive(Debug)]
pub(crate) struct PortClaim {
    port: String,
}

impl PortClaim {
    pub(crate) fn acquire(port: &str) -> Result<Self, TransportError> {
        let port = port.trim().to_string();
        let mut claimed = CLAIMED_PORTS
            .lock()
            .map_err(|e| TransportError::unavailable(&port, format!("port registry poisoned: {}", e)))?;

        if !claimed.insert(port.clone()) {
            return Err(TransportError::unavailable(&port, "in use by another session"));
        }
        Ok(Self { port })
    }

    pub(crate) fn is_held(port: &str) -> bool {
        CLAIMED_PORTS
            .lock()
            .map(|claimed| claimed.contains(port.trim()))
            .unwrap_or(false)
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        if let Ok(mut claimed) = CLAIMED_PORTS.lock() {
            claimed.remove(&self.port);
        }
    }
}

// ============================================================================
// Serial Transport
// ============================================================================

/// An open port plus its claim; dropping it closes the device.
struct PortHandle {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    _claim: PortClaim,
}

/// serialport-backed transport
#[derive(Default)]
pub struct SerialTransport {
    handle: Option<PortHandle>,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the open port, if any
    pub fn port_name(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.name.as_str())
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, cfg: &PortConfig) -> Result<(), TransportError> {
        if let Some(handle) = &self.handle {
            return Err(TransportError::AlreadyOpen(handle.name.clone()));
        }

        // Map parameters first so unsupported values never reach the device
        let data_bits = to_serialport_data_bits(cfg.data_bits);
        let parity = to_serialport_parity(cfg.parity)?;
        let stop_bits = to_serialport_stop_bits(cfg.stop_bits)?;
        let flow_control = to_serialport_flow_control(cfg.flow_control);

        let claim = PortClaim::acquire(&cfg.port_name)?;

        let port = serialport::new(cfg.port_name.trim(), cfg.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .timeout(cfg.timeout)
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::InvalidInput => TransportError::InvalidConfig(e.description),
                _ => TransportError::unavailable(&cfg.port_name, e.description),
            })?;

        // Drop anything the driver buffered before we arrived
        let _ = port.clear(serialport::ClearBuffer::Input);

        tlog!("[Serial] Opened {}", cfg.summary());

        self.handle = Some(PortHandle {
            port,
            name: cfg.port_name.trim().to_string(),
            _claim: claim,
        });
        Ok(())
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            tlog!("[Serial] Closed {}", handle.name);
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotOpen)?;

        let available = handle
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::disconnected(&handle.name, e.description))?;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; available as usize];
        match handle.port.read(&mut buf) {
            Ok(0) => Err(TransportError::disconnected(&handle.name, "end of stream")),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(TransportError::disconnected(&handle.name, e.to_string())),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotOpen)?;
        handle
            .port
            .write_all(data)
            .and_then(|_| handle.port.flush())
            .map_err(|e| TransportError::WriteFailed(format!("{}: {}", handle.name, e)))
    }
}

// ============================================================================
// Port Discovery
// ============================================================================

/// What kind of device sits behind a port
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PortKind {
    Usb,
    Bluetooth,
    Pci,
    Other,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            PortKind::Usb => "usb",
            PortKind::Bluetooth => "bluetooth",
            PortKind::Pci => "pci",
            PortKind::Other => "-",
        })
    }
}

/// A port that can be passed to `PortConfig::new`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub kind: PortKind,
    /// USB vendor and product id
    pub usb_id: Option<(u16, u16)>,
    /// Product string, or the manufacturer when the adapter reports no product
    pub description: Option<String>,
    /// Already open by a session in this process
    pub in_use: bool,
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(port: serialport::SerialPortInfo) -> Self {
        let (kind, usb_id, description) = match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => (
                PortKind::Usb,
                Some((usb.vid, usb.pid)),
                usb.product.or(usb.manufacturer),
            ),
            serialport::SerialPortType::BluetoothPort => (PortKind::Bluetooth, None, None),
            serialport::SerialPortType::PciPort => (PortKind::Pci, None, None),
            serialport::SerialPortType::Unknown => (PortKind::Other, None, None),
        };
        let in_use = PortClaim::is_held(&port.port_name);
        Self {
            port_name: port.port_name,
            kind,
            usb_id,
            description,
            in_use,
        }
    }
}

/// One line per port, e.g. `/dev/ttyUSB0  usb 0403:6001 FT232R USB UART`
impl fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24} {:<9}", self.port_name, self.kind)?;
        if let Some((vid, pid)) = self.usb_id {
            write!(f, " {:04x}:{:04x}", vid, pid)?;
        }
        if let Some(description) = &self.description {
            write!(f, " {}", description)?;
        }
        if self.in_use {
            f.write_str(" (in use)")?;
        }
        Ok(())
    }
}

/// macOS lists every device twice; the /dev/tty.* node blocks on open
/// waiting for carrier detect, so only /dev/cu.* is offered.
fn is_openable_node(port_name: &str) -> bool {
    !(cfg!(target_os = "macos") && port_name.starts_with("/dev/tty."))
}

/// Ports present on this machine, sorted by name
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, TransportError> {
    let mut ports: Vec<SerialPortInfo> = serialport::available_ports()
        .map_err(|e| TransportError::unavailable("*", format!("cannot enumerate ports: {}", e)))?
        .into_iter()
        .filter(|p| is_openable_node(&p.port_name))
        .map(SerialPortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    Ok(ports)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::MockTransport;
    use crate::io::serial::utils::{Parity, StopBits};

    #[test]
    fn test_port_claim_is_exclusive_and_released_on_drop() {
        let first = PortClaim::acquire("claim-test-port").unwrap();
        assert!(matches!(
            PortClaim::acquire("claim-test-port"),
            Err(TransportError::PortUnavailable { .. })
        ));
        drop(first);
        assert!(PortClaim::acquire("claim-test-port").is_ok());
    }

    #[test]
    fn test_port_info_from_usb_adapter() {
        let claim = PortClaim::acquire("/dev/ttyUSB7").unwrap();
        let info = SerialPortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyUSB7".to_string(),
            port_type: serialport::SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x0403,
                pid: 0x6001,
                serial_number: Some("A50285BI".to_string()),
                manufacturer: Some("FTDI".to_string()),
                product: None,
            }),
        });

        assert_eq!(info.kind, PortKind::Usb);
        assert_eq!(info.usb_id, Some((0x0403, 0x6001)));
        assert_eq!(info.description.as_deref(), Some("FTDI"));
        assert!(info.in_use);
        assert_eq!(
            info.to_string(),
            "/dev/ttyUSB7             usb       0403:6001 FTDI (in use)"
        );

        drop(claim);
        let info = SerialPortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::Unknown,
        });
        assert!(!info.in_use);
        assert_eq!(info.to_string(), "/dev/ttyS0               -        ");
    }

    #[test]
    fn test_cu_nodes_are_always_listed() {
        assert!(is_openable_node("/dev/cu.usbserial-1410"));
        assert!(is_openable_node("COM3"));
        assert_eq!(is_openable_node("/dev/tty.usbserial-1410"), !cfg!(target_os = "macos"));
    }

    #[test]
    fn test_serial_transport_rejects_unsupported_parity_before_opening() {
        let mut transport = SerialTransport::new();
        let mut cfg = PortConfig::new("transport-test-mark", 9600);
        cfg.parity = Parity::Mark;
        assert!(matches!(
            transport.open(&cfg),
            Err(TransportError::InvalidConfig(_))
        ));
        assert!(!transport.is_open());

        // The failed open must not leave the port claimed
        assert!(PortClaim::acquire("transport-test-mark").is_ok());
    }

    #[test]
    fn test_serial_transport_rejects_one_and_a_half_stop_bits() {
        let mut transport = SerialTransport::new();
        let mut cfg = PortConfig::new("transport-test-15", 9600);
        cfg.stop_bits = StopBits::OnePointFive;
        assert!(matches!(
            transport.open(&cfg),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_serial_transport_closed_operations() {
        let mut transport = SerialTransport::new();
        assert_eq!(transport.read_available(), Err(TransportError::NotOpen));
        assert_eq!(transport.write(b"x"), Err(TransportError::NotOpen));
        transport.close();
        transport.close();
        assert!(transport.port_name().is_none());
    }

    #[test]
    fn test_exchange_collects_until_frame_complete() {
        let mut transport = MockTransport::new();
        let device = transport.device();
        transport.open(&PortConfig::new("exchange-complete", 9600)).unwrap();
        device.set_responder(|_req| Some(vec![0x01, 0x02, 0x03, 0x04, 0xFF]));

        let cancel = AtomicBool::new(false);
        let result = transport
            .exchange(&[0xAA], Duration::from_millis(200), &cancel, &|buf| {
                if buf.is_empty() { None } else { Some(4) }
            })
            .unwrap();

        assert_eq!(result, Exchange::Complete(vec![0x01, 0x02, 0x03, 0x04]));
        assert_eq!(device.written(), vec![vec![0xAA]]);
    }

    #[test]
    fn test_exchange_times_out_with_partial_data() {
        let mut transport = MockTransport::new();
        let device = transport.device();
        transport.open(&PortConfig::new("exchange-timeout", 9600)).unwrap();
        device.set_responder(|_req| Some(vec![0x01]));

        let cancel = AtomicBool::new(false);
        let result = transport
            .exchange(&[0xAA], Duration::from_millis(20), &cancel, &|_| Some(8))
            .unwrap();

        assert_eq!(result, Exchange::TimedOut(vec![0x01]));
    }

    #[test]
    fn test_exchange_honours_cancel_flag() {
        let mut transport = MockTransport::new();
        transport.open(&PortConfig::new("exchange-cancel", 9600)).unwrap();

        let cancel = AtomicBool::new(true);
        let result = transport
            .exchange(&[0xAA], Duration::from_secs(30), &cancel, &|_| None)
            .unwrap();

        assert_eq!(result, Exchange::Cancelled);
    }
}
