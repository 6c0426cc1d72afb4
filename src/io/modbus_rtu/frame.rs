// io/modbus_rtu/frame.rs
//
// RTU framing for Read Holding Registers (function 0x03).
//
// Request:   unit | 0x03 | addr_hi addr_lo | count_hi count_lo | crc_lo crc_hi
// Response:  unit | 0x03 | byte_count | data (2 bytes per register) | crc_lo crc_hi
// Exception: unit | 0x83 | code | crc_lo crc_hi

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksums::{append_modbus_crc, validate_modbus_crc};
use crate::io::error::ModbusError;
use crate::io::serial::ConfigError;

pub const FUNCTION_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Set on the function byte of an exception response
const EXCEPTION_FLAG: u8 = 0x80;

/// Unit id range addressable on a serial line (0 is broadcast, 248+ reserved)
pub const MIN_UNIT_ID: u8 = 1;
pub const MAX_UNIT_ID: u8 = 247;

/// Largest read that fits in one RTU response (250 data bytes)
pub const MAX_REGISTER_COUNT: u16 = 125;

/// Exception codes a device may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    Unknown(u8),
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailed,
            other => ExceptionCode::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailed => 0x0B,
            ExceptionCode::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::ServerDeviceFailure => "server device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::ServerDeviceBusy => "server device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailed => "gateway target failed to respond",
            ExceptionCode::Unknown(_) => "unknown exception",
        };
        write!(f, "{} (0x{:02X})", name, self.as_u8())
    }
}

/// What to read on each poll
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusQuery {
    pub unit_id: u8,
    pub register_address: u16,
    pub register_count: u16,
}

impl Default for ModbusQuery {
    fn default() -> Self {
        Self {
            unit_id: 1,
            register_address: 0,
            register_count: 1,
        }
    }
}

impl ModbusQuery {
    pub fn new(unit_id: u8, register_address: u16, register_count: u16) -> Self {
        Self {
            unit_id,
            register_address,
            register_count,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_UNIT_ID..=MAX_UNIT_ID).contains(&self.unit_id) {
            return Err(ConfigError::InvalidQuery(format!(
                "unit id {} outside {}..={}",
                self.unit_id, MIN_UNIT_ID, MAX_UNIT_ID
            )));
        }
        if self.register_count == 0 || self.register_count > MAX_REGISTER_COUNT {
            return Err(ConfigError::InvalidQuery(format!(
                "register count {} outside 1..={}",
                self.register_count, MAX_REGISTER_COUNT
            )));
        }
        if self.register_address as u32 + self.register_count as u32 > 0x1_0000 {
            return Err(ConfigError::InvalidQuery(format!(
                "registers {}..{} run past 65535",
                self.register_address,
                self.register_address as u32 + self.register_count as u32
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ModbusQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unit {} registers {}+{}",
            self.unit_id, self.register_address, self.register_count
        )
    }
}

/// Build a Read Holding Registers request, CRC included.
pub fn build_read_holding_registers(unit_id: u8, address: u16, count: u16) -> Vec<u8> {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    append_modbus_crc(&[
        unit_id,
        FUNCTION_READ_HOLDING_REGISTERS,
        addr_hi,
        addr_lo,
        count_hi,
        count_lo,
    ])
}

/// Total length of the response frame that starts `buf`, once enough of the
/// header is present to tell. Used as the completion test for `exchange`.
pub fn response_frame_len(buf: &[u8]) -> Option<usize> {
    let function = *buf.get(1)?;
    if function & EXCEPTION_FLAG != 0 {
        return Some(5);
    }
    if function == FUNCTION_READ_HOLDING_REGISTERS {
        let byte_count = *buf.get(2)? as usize;
        return Some(5 + byte_count);
    }
    // Unexpected function; take the minimum frame and let parsing reject it
    Some(5)
}

/// Validate a complete response frame and decode its registers.
pub fn parse_read_holding_registers_response(
    frame: &[u8],
    unit_id: u8,
    count: u16,
) -> Result<Vec<u16>, ModbusError> {
    if frame.len() < 5 {
        return Err(ModbusError::InvalidResponse(format!(
            "frame too short ({} bytes)",
            frame.len()
        )));
    }
    if !validate_modbus_crc(frame) {
        return Err(ModbusError::InvalidResponse(format!(
            "CRC mismatch in {}",
            hex::encode(frame)
        )));
    }
    if frame[0] != unit_id {
        return Err(ModbusError::InvalidResponse(format!(
            "reply from unit {} (expected {})",
            frame[0], unit_id
        )));
    }

    let function = frame[1];
    if function == FUNCTION_READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        return Err(ModbusError::ResponseError {
            function: FUNCTION_READ_HOLDING_REGISTERS,
            code: ExceptionCode::from_u8(frame[2]),
        });
    }
    if function != FUNCTION_READ_HOLDING_REGISTERS {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected function 0x{:02X}",
            function
        )));
    }

    let byte_count = frame[2] as usize;
    let expected = count as usize * 2;
    if byte_count != expected || frame.len() != 5 + byte_count {
        return Err(ModbusError::InvalidResponse(format!(
            "byte count {} does not match {} registers",
            byte_count, count
        )));
    }

    Ok(frame[3..3 + byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Render register values for the log, e.g. "[10, 20]"
pub fn format_registers(values: &[u16]) -> String {
    format!("{:?}", values)
}
