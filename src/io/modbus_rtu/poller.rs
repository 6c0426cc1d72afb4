// io/modbus_rtu/poller.rs
//
// Modbus RTU master bound to one unit id. The poller never owns the port:
// the Session lends it the Transport for each call.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use super::frame::{
    build_read_holding_registers, parse_read_holding_registers_response, response_frame_len,
    ModbusQuery, MAX_UNIT_ID, MIN_UNIT_ID,
};
use crate::io::error::ModbusError;
use crate::io::serial::{Exchange, Transport};

pub struct ModbusPoller {
    unit_id: Option<u8>,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl ModbusPoller {
    /// `timeout` bounds each request/response; `cancel` aborts a waiting request.
    pub fn new(timeout: Duration, cancel: Arc<AtomicBool>) -> Self {
        Self {
            unit_id: None,
            timeout,
            cancel,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.unit_id.is_some()
    }

    pub fn unit_id(&self) -> Option<u8> {
        self.unit_id
    }

    /// Attach to an open transport and address `unit_id`.
    pub fn connect(&mut self, transport: &mut dyn Transport, unit_id: u8) -> Result<(), ModbusError> {
        if !transport.is_open() {
            return Err(ModbusError::ProtocolUnavailable(
                "transport is not open".to_string(),
            ));
        }
        if !(MIN_UNIT_ID..=MAX_UNIT_ID).contains(&unit_id) {
            return Err(ModbusError::ProtocolUnavailable(format!(
                "unit id {} outside {}..={}",
                unit_id, MIN_UNIT_ID, MAX_UNIT_ID
            )));
        }

        let stale = transport.read_available()?;
        if !stale.is_empty() {
            tlog!("[ModbusRtu] Discarded {} stale bytes", stale.len());
        }

        self.unit_id = Some(unit_id);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.unit_id = None;
    }

    /// Read `query.register_count` holding registers. One request, one response.
    pub fn poll(
        &mut self,
        transport: &mut dyn Transport,
        query: &ModbusQuery,
    ) -> Result<Vec<u16>, ModbusError> {
        let unit_id = self
            .unit_id
            .ok_or_else(|| ModbusError::ProtocolUnavailable("poller is not connected".to_string()))?;
        if query.unit_id != unit_id {
            return Err(ModbusError::ProtocolUnavailable(format!(
                "connected to unit {}, query addresses unit {}",
                unit_id, query.unit_id
            )));
        }

        // Late replies to an earlier request would be read as this response
        transport.read_available()?;

        let request =
            build_read_holding_registers(unit_id, query.register_address, query.register_count);
        let outcome = transport.exchange(&request, self.timeout, &self.cancel, &response_frame_len)?;

        match outcome {
            Exchange::Complete(frame) => {
                parse_read_holding_registers_response(&frame, unit_id, query.register_count)
            }
            Exchange::TimedOut(partial) if partial.is_empty() => Err(ModbusError::Timeout {
                unit_id,
                timeout: self.timeout,
            }),
            Exchange::TimedOut(partial) => Err(ModbusError::InvalidResponse(format!(
                "incomplete frame after {:?}: {}",
                self.timeout,
                hex::encode(&partial)
            ))),
            Exchange::Cancelled => Err(ModbusError::Cancelled),
        }
    }
}
