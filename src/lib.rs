// src/lib.rs
//
// SeriaLuz: serial port monitor with optional Modbus RTU register polling.

// Must stay first so `tlog!` is visible to every module below
#[macro_use]
mod logging;

pub mod checksums;
pub mod io;
pub mod scheduler;
pub mod sessions;
pub mod settings;

pub use io::serial::{list_serial_ports, PortKind, SerialPortInfo};
pub use io::{DisplayFormat, LogEntry, LogSource, ModbusQuery, PortConfig, SessionState};
pub use logging::{init_file_logging, stop_file_logging};
pub use scheduler::SessionRunner;
pub use sessions::{LogRecorder, Session, SessionConfig, SessionError, SessionMode, SessionObserver};
pub use settings::{PortConfigStore, SessionSettings, SettingsError, SettingsStore};
