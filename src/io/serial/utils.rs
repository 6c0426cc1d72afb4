// src/io/serial/utils.rs
//
// Line-parameter types for serial ports and their conversion to the
// serialport crate. Serde names match the settings file written by the
// desktop prototypes ("None", "RTS/CTS", "1.5", ...).

use serde::{Deserialize, Deserializer, Serialize};
use serialport::{
    DataBits as SpDataBits, FlowControl as SpFlowControl, Parity as SpParity,
    StopBits as SpStopBits,
};
use std::fmt;
use std::str::FromStr;

use crate::io::error::TransportError;

// ============================================================================
// Types
// ============================================================================

/// Number of data bits per character. Written as a number; read from a
/// number or a numeric string ("8"), as the prototypes stored it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl Default for DataBits {
    fn default() -> Self {
        DataBits::Eight
    }
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("data bits must be 5, 6, 7 or 8 (got {})", other)),
        }
    }
}

impl<'de> Deserialize<'de> for DataBits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Bits {
            Number(u8),
            Text(String),
        }

        let parsed = match Bits::deserialize(deserializer)? {
            Bits::Number(n) => DataBits::try_from(n),
            Bits::Text(s) => s.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> u8 {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
    /// Parity bit always 1
    Mark,
    /// Parity bit always 0
    Space,
}

impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

impl Parity {
    /// Single-letter code used in "8N1" style summaries
    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

/// Stop bits per character
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

impl Default for StopBits {
    fn default() -> Self {
        StopBits::One
    }
}

/// Flow control method
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    /// Hardware flow control
    #[serde(rename = "RTS/CTS")]
    RtsCts,
    /// Software flow control
    #[serde(rename = "XON/XOFF")]
    XonXoff,
}

impl Default for FlowControl {
    fn default() -> Self {
        FlowControl::None
    }
}

// ============================================================================
// Parsing and Display (CLI arguments, log lines)
// ============================================================================

impl FromStr for DataBits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid data bits '{}'", s))?;
        DataBits::try_from(bits)
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "even" | "e" => Ok(Parity::Even),
            "odd" | "o" => Ok(Parity::Odd),
            "mark" | "m" => Ok(Parity::Mark),
            "space" | "s" => Ok(Parity::Space),
            _ => Err(format!("invalid parity '{}'", s)),
        }
    }
}

impl FromStr for StopBits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            _ => Err(format!("invalid stop bits '{}' (expected 1, 1.5 or 2)", s)),
        }
    }
}

impl FromStr for FlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['/', '-', '_'], "").as_str() {
            "none" => Ok(FlowControl::None),
            "rtscts" | "hardware" => Ok(FlowControl::RtsCts),
            "xonxoff" | "software" => Ok(FlowControl::XonXoff),
            _ => Err(format!("invalid flow control '{}'", s)),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopBits::One => write!(f, "1"),
            StopBits::OnePointFive => write!(f, "1.5"),
            StopBits::Two => write!(f, "2"),
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowControl::None => write!(f, "none"),
            FlowControl::RtsCts => write!(f, "RTS/CTS"),
            FlowControl::XonXoff => write!(f, "XON/XOFF"),
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert data bits to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: DataBits) -> SpDataBits {
    match bits {
        DataBits::Five => SpDataBits::Five,
        DataBits::Six => SpDataBits::Six,
        DataBits::Seven => SpDataBits::Seven,
        DataBits::Eight => SpDataBits::Eight,
    }
}

/// Convert our Parity enum to serialport crate's Parity type.
/// The serialport crate has no mark/space parity.
pub fn to_serialport_parity(p: Parity) -> Result<SpParity, TransportError> {
    match p {
        Parity::None => Ok(SpParity::None),
        Parity::Odd => Ok(SpParity::Odd),
        Parity::Even => Ok(SpParity::Even),
        Parity::Mark | Parity::Space => Err(TransportError::InvalidConfig(format!(
            "{:?} parity is not supported by this serial backend",
            p
        ))),
    }
}

/// Convert stop bits to serialport crate's StopBits type.
/// 1.5 stop bits cannot be expressed through the serialport crate.
pub fn to_serialport_stop_bits(bits: StopBits) -> Result<SpStopBits, TransportError> {
    match bits {
        StopBits::One => Ok(SpStopBits::One),
        StopBits::Two => Ok(SpStopBits::Two),
        StopBits::OnePointFive => Err(TransportError::InvalidConfig(
            "1.5 stop bits are not supported by this serial backend".to_string(),
        )),
    }
}

/// Convert flow control to serialport crate's FlowControl type
pub fn to_serialport_flow_control(flow: FlowControl) -> SpFlowControl {
    match flow {
        FlowControl::None => SpFlowControl::None,
        FlowControl::RtsCts => SpFlowControl::Hardware,
        FlowControl::XonXoff => SpFlowControl::Software,
    }
}

// ============================================================================
// Tests
// ============================================================================
