// src/io/error.rs
//
// Error types for the serial transport, the display framer and the Modbus poller.
// Each component returns its own error; only the Session decides whether an
// error is fatal (stop and fail) or recoverable (log and keep going).

use std::time::Duration;
use thiserror::Error;

use super::modbus_rtu::ExceptionCode;

/// Errors raised by a serial transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device node could not be opened (missing, busy, or claimed by another session)
    #[error("port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// Parameters are out of range for the underlying hardware
    #[error("invalid port configuration: {0}")]
    InvalidConfig(String),

    /// `open` called twice without `close`
    #[error("port {0} is already open")]
    AlreadyOpen(String),

    /// Read or write attempted with no open port
    #[error("port is not open")]
    NotOpen,

    /// I/O error during write (partial writes count as failures)
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The device went away while the port was open
    #[error("port {port} disconnected: {reason}")]
    Disconnected { port: String, reason: String },
}

impl TransportError {
    pub fn unavailable(port: &str, reason: impl Into<String>) -> Self {
        TransportError::PortUnavailable {
            port: port.to_string(),
            reason: reason.into(),
        }
    }

    pub fn disconnected(port: &str, reason: impl Into<String>) -> Self {
        TransportError::Disconnected {
            port: port.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while converting between bytes and display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramerError {
    /// Inbound bytes are not valid UTF-8 (strict decoding only)
    #[error("invalid UTF-8 sequence at byte {valid_up_to}")]
    DecodeError { valid_up_to: usize },

    /// Outbound text is not a sequence of hex pairs
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Errors raised by the Modbus RTU poller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModbusError {
    /// The transport cannot be claimed for Modbus framing
    #[error("Modbus unavailable: {0}")]
    ProtocolUnavailable(String),

    /// The device answered with an exception response
    #[error("device returned exception for function 0x{function:02X}: {code}")]
    ResponseError { function: u8, code: ExceptionCode },

    /// No complete response within the transport timeout
    #[error("no response from unit {unit_id} within {timeout:?}")]
    Timeout { unit_id: u8, timeout: Duration },

    /// A response arrived but could not be decoded (CRC, unit, length)
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request was abandoned because the session is stopping
    #[error("request cancelled")]
    Cancelled,

    /// Transport-level failure underneath the request
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ModbusError {
    /// Fatal errors end the polling session; everything else is logged and
    /// polling continues on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ModbusError::ProtocolUnavailable(_) | ModbusError::Transport(_)
        )
    }
}
