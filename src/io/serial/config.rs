// src/io/serial/config.rs
//
// Serial port configuration and its validation.

use std::time::Duration;
use thiserror::Error;

use super::utils::{DataBits, FlowControl, Parity, StopBits};

/// Longest accepted timeout; anything larger is a typo, not a setting
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Validation failure for port or session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("port name is empty")]
    EmptyPortName,
    #[error("baud rate must be positive")]
    InvalidBaudRate,
    #[error("timeout must be between 0 and 3600 seconds")]
    InvalidTimeout,
    #[error("{stop_bits} stop bits cannot be used with {data_bits} data bits")]
    IncompatibleStopBits { stop_bits: StopBits, data_bits: u8 },
    #[error("invalid Modbus query: {0}")]
    InvalidQuery(String),
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Serial port configuration
#[derive(Clone, Debug, PartialEq)]
pub struct PortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Bound for blocking operations (open, write, Modbus request/response)
    pub timeout: Duration,
}

impl PortConfig {
    /// 8N1 with no flow control and a one second timeout
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
            timeout: Duration::from_secs(1),
        }
    }

    /// Set the timeout from fractional seconds, as stored in settings files.
    pub fn with_timeout_secs(mut self, seconds: f64) -> Result<Self, ConfigError> {
        if seconds <= 0.0 {
            return Err(ConfigError::InvalidTimeout);
        }
        let timeout = Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidTimeout)?;
        if timeout > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeout);
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Reject combinations that can never be opened, before touching hardware.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_name.trim().is_empty() {
            return Err(ConfigError::EmptyPortName);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if self.timeout.is_zero() || self.timeout > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeout);
        }

        // UART rule: 1.5 stop bits only with 5 data bits, 2 stop bits never with 5
        let incompatible = match self.stop_bits {
            StopBits::OnePointFive => self.data_bits != DataBits::Five,
            StopBits::Two => self.data_bits == DataBits::Five,
            StopBits::One => false,
        };
        if incompatible {
            return Err(ConfigError::IncompatibleStopBits {
                stop_bits: self.stop_bits,
                data_bits: self.data_bits.into(),
            });
        }

        Ok(())
    }

    /// Short line summary, e.g. "COM1 @ 9600 (8N1, flow: none)"
    pub fn summary(&self) -> String {
        format!(
            "{} @ {} ({}{}{}, flow: {})",
            self.port_name,
            self.baud_rate,
            u8::from(self.data_bits),
            self.parity.letter(),
            self.stop_bits,
            self.flow_control
        )
    }
}
