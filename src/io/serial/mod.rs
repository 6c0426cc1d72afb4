// io/serial/mod.rs
//
// Serial line access for SeriaLuz.
//
// - Transport: port ownership, raw reads/writes, request/response exchange
// - Framer: bytes <-> display text (ASCII or hexadecimal)
// - Config/utils: line parameters and their validation

mod config;
pub mod framer;
pub mod transport; // pub(crate) PortClaim is shared with the test transport
mod utils;

pub use config::{ConfigError, PortConfig};
pub use framer::{decode, encode, try_decode, DisplayFormat};
pub use transport::{list_serial_ports, Exchange, PortKind, SerialPortInfo, SerialTransport, Transport};
pub use utils::{DataBits, FlowControl, Parity, StopBits};
