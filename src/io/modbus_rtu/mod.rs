// io/modbus_rtu/mod.rs
//
// Modbus RTU master over a serial Transport.
// - Frame: request building, response length detection and parsing (FC 0x03)
// - Poller: one request/response per tick against a single unit

mod frame;
mod poller;

pub use frame::{
    build_read_holding_registers, format_registers, parse_read_holding_registers_response,
    response_frame_len, ExceptionCode, ModbusQuery, FUNCTION_READ_HOLDING_REGISTERS,
    MAX_REGISTER_COUNT, MAX_UNIT_ID, MIN_UNIT_ID,
};
pub use poller::ModbusPoller;
