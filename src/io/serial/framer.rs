// src/io/serial/framer.rs
//
// Conversion between raw serial bytes and display text.
// The same DisplayFormat governs both directions: what is sent as hex is
// logged as hex, and vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::io::error::FramerError;

/// How bytes are shown in the log and how typed text becomes bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayFormat {
    /// UTF-8 text
    #[serde(rename = "ASCII")]
    Ascii,
    /// Lowercase hex pairs, e.g. "4142"
    #[serde(rename = "Hexadecimal")]
    Hexadecimal,
}

impl Default for DisplayFormat {
    fn default() -> Self {
        DisplayFormat::Ascii
    }
}

impl FromStr for DisplayFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ascii" | "text" => Ok(DisplayFormat::Ascii),
            "hex" | "hexadecimal" => Ok(DisplayFormat::Hexadecimal),
            _ => Err(format!("invalid data format '{}' (expected ascii or hex)", s)),
        }
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayFormat::Ascii => write!(f, "ASCII"),
            DisplayFormat::Hexadecimal => write!(f, "Hexadecimal"),
        }
    }
}

/// Render inbound bytes for display.
///
/// Invalid UTF-8 in ASCII mode is replaced with U+FFFD rather than failing;
/// use [`try_decode`] when the caller needs to know.
pub fn decode(bytes: &[u8], format: DisplayFormat) -> String {
    match format {
        DisplayFormat::Ascii => String::from_utf8_lossy(bytes).into_owned(),
        DisplayFormat::Hexadecimal => hex::encode(bytes),
    }
}

/// Strict variant of [`decode`]: invalid UTF-8 is a `DecodeError`.
pub fn try_decode(bytes: &[u8], format: DisplayFormat) -> Result<String, FramerError> {
    match format {
        DisplayFormat::Ascii => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| FramerError::DecodeError {
                valid_up_to: e.valid_up_to(),
            }),
        DisplayFormat::Hexadecimal => Ok(hex::encode(bytes)),
    }
}

/// Turn typed text into bytes for transmission.
///
/// Hex input may separate pairs with whitespace ("48 65 6c"); anything else
/// that is not a sequence of hex pairs is `InvalidHex`.
pub fn encode(text: &str, format: DisplayFormat) -> Result<Vec<u8>, FramerError> {
    match format {
        DisplayFormat::Ascii => Ok(text.as_bytes().to_vec()),
        DisplayFormat::Hexadecimal => {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            hex::decode(&compact).map_err(|e| match e {
                hex::FromHexError::OddLength => {
                    FramerError::InvalidHex(format!("'{}' has an odd number of digits", text))
                }
                hex::FromHexError::InvalidHexCharacter { c, index } => FramerError::InvalidHex(
                    format!("'{}' contains non-hex character {:?} at {}", text, c, index),
                ),
                other => FramerError::InvalidHex(format!("'{}': {}", text, other)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii() {
        assert_eq!(decode(&[0x41, 0x42], DisplayFormat::Ascii), "AB");
    }

    #[test]
    fn test_decode_hex_is_lowercase() {
        assert_eq!(decode(&[0x41, 0x42], DisplayFormat::Hexadecimal), "4142");
        assert_eq!(decode(&[0xDE, 0xAD], DisplayFormat::Hexadecimal), "dead");
        assert_eq!(decode(&[], DisplayFormat::Hexadecimal), "");
    }

    #[test]
    fn test_decode_invalid_utf8_substitutes_marker() {
        let text = decode(&[0x41, 0xFF, 0x42], DisplayFormat::Ascii);
        assert_eq!(text, "A\u{FFFD}B");
    }

    #[test]
    fn test_try_decode_reports_invalid_utf8() {
        assert_eq!(
            try_decode(&[0x41, 0xFF], DisplayFormat::Ascii),
            Err(FramerError::DecodeError { valid_up_to: 1 })
        );
        assert_eq!(try_decode(&[0xFF], DisplayFormat::Hexadecimal).unwrap(), "ff");
    }

    #[test]
    fn test_encode_ascii() {
        assert_eq!(encode("Hello", DisplayFormat::Ascii).unwrap(), b"Hello".to_vec());
        assert_eq!(encode("", DisplayFormat::Ascii).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_encode_hex() {
        assert_eq!(
            encode("48656c6c6f", DisplayFormat::Hexadecimal).unwrap(),
            b"Hello".to_vec()
        );
        assert_eq!(
            encode("48 65 6C 6c 6F", DisplayFormat::Hexadecimal).unwrap(),
            b"Hello".to_vec()
        );
    }

    #[test]
    fn test_encode_hex_rejects_malformed_input() {
        assert!(matches!(
            encode("48X", DisplayFormat::Hexadecimal),
            Err(FramerError::InvalidHex(_))
        ));
        assert!(matches!(
            encode("486", DisplayFormat::Hexadecimal),
            Err(FramerError::InvalidHex(_))
        ));
        assert!(matches!(
            encode("zz", DisplayFormat::Hexadecimal),
            Err(FramerError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_hex_roundtrip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = decode(&bytes, DisplayFormat::Hexadecimal);
        assert_eq!(encode(&text, DisplayFormat::Hexadecimal).unwrap(), bytes);
    }

    #[test]
    fn test_ascii_roundtrip_for_valid_utf8() {
        let bytes = "Olá, mundo".as_bytes();
        let text = decode(bytes, DisplayFormat::Ascii);
        assert_eq!(encode(&text, DisplayFormat::Ascii).unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_display_format_parsing_and_serde() {
        assert_eq!("hex".parse::<DisplayFormat>().unwrap(), DisplayFormat::Hexadecimal);
        assert_eq!("ASCII".parse::<DisplayFormat>().unwrap(), DisplayFormat::Ascii);
        assert!("binary".parse::<DisplayFormat>().is_err());
        assert_eq!(
            serde_json::to_string(&DisplayFormat::Hexadecimal).unwrap(),
            "\"Hexadecimal\""
        );
    }
}
