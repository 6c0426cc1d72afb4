// io/mod.rs
//
// Device-facing layer of a SeriaLuz session: the serial transport, the
// display framer and the Modbus RTU poller, plus the types the Session
// reports to its observers.

mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod modbus_rtu;
pub mod serial;

pub use error::{FramerError, ModbusError, TransportError};
pub use modbus_rtu::{ExceptionCode, ModbusPoller, ModbusQuery};
pub use serial::{
    ConfigError, DataBits, DisplayFormat, FlowControl, Parity, PortConfig, SerialTransport,
    StopBits, Transport,
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Shared Types
// ============================================================================

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    /// Internal to `start`; never reported to observers
    Connecting,
    Connected,
    Polling,
    Failed,
}

impl SessionState {
    /// Port is open and ticks do work
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Polling)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Polling => "polling",
            SessionState::Failed => "failed",
        };
        f.pad(name)
    }
}

/// Origin of a log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    /// Data written to the device
    Sent,
    /// Data read from the device (raw text or register values)
    Received,
    /// Lifecycle notices
    System,
    Error,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogSource::Sent => "TX",
            LogSource::Received => "RX",
            LogSource::System => "SYS",
            LogSource::Error => "ERR",
        };
        f.pad(name)
    }
}

/// One line of session output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub source: LogSource,
    pub payload: String,
}

impl LogEntry {
    pub fn new(source: LogSource, payload: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            source,
            payload: payload.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<3} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.source,
            self.payload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(SessionState::Connected.is_active());
        assert!(SessionState::Polling.is_active());
        assert!(!SessionState::Disconnected.is_active());
        assert!(!SessionState::Connecting.is_active());
        assert!(!SessionState::Failed.is_active());
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry::new(LogSource::Sent, "Hello");
        let line = entry.to_string();
        assert!(line.ends_with("TX  Hello"), "{}", line);
    }
}
