// src/io/mock.rs
//
// In-memory transport and simulated Modbus device for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::checksums::{append_modbus_crc, validate_modbus_crc};
use crate::io::error::TransportError;
use crate::io::serial::transport::PortClaim;
use crate::io::serial::{PortConfig, Transport};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    responder: Option<Responder>,
    fail_next_open: Option<TransportError>,
    fail_writes: bool,
    disconnected: bool,
    open_count: usize,
    close_count: usize,
}

/// Test-side handle to the far end of a `MockTransport`
#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Queue bytes as if the device had sent them
    pub(crate) fn push_inbound(&self, bytes: &[u8]) {
        self.state.lock().unwrap().inbound.extend(bytes.iter().copied());
    }

    /// Every successful write, in order
    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().written.clone()
    }

    /// Answer each write with the returned bytes (None = stay silent)
    pub(crate) fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.state.lock().unwrap().responder = Some(Box::new(responder));
    }

    pub(crate) fn fail_next_open(&self, err: TransportError) {
        self.state.lock().unwrap().fail_next_open = Some(err);
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Simulate the cable being pulled
    pub(crate) fn disconnect(&self) {
        self.state.lock().unwrap().disconnected = true;
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().unwrap().open_count
    }

    pub(crate) fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }
}

/// Transport backed by a `MockDevice`. Claims port names like the real one.
#[derive(Default)]
pub(crate) struct MockTransport {
    device: MockDevice,
    claim: Option<PortClaim>,
    port: Option<String>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn device(&self) -> MockDevice {
        self.device.clone()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, cfg: &PortConfig) -> Result<(), TransportError> {
        if let Some(port) = &self.port {
            return Err(TransportError::AlreadyOpen(port.clone()));
        }
        if let Some(err) = self.device.state.lock().unwrap().fail_next_open.take() {
            return Err(err);
        }
        self.claim = Some(PortClaim::acquire(&cfg.port_name)?);
        self.port = Some(cfg.port_name.clone());
        self.device.state.lock().unwrap().open_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            self.claim = None;
            self.device.state.lock().unwrap().close_count += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_deref().ok_or(TransportError::NotOpen)?;
        let mut state = self.device.state.lock().unwrap();
        if state.disconnected {
            return Err(TransportError::disconnected(port, "device removed"));
        }
        Ok(state.inbound.drain(..).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_deref().ok_or(TransportError::NotOpen)?;
        let mut state = self.device.state.lock().unwrap();
        if state.disconnected {
            return Err(TransportError::disconnected(port, "device removed"));
        }
        if state.fail_writes {
            return Err(TransportError::WriteFailed(format!("{}: broken pipe", port)));
        }
        state.written.push(data.to_vec());
        let reply = state.responder.as_mut().and_then(|r| r(data));
        if let Some(reply) = reply {
            state.inbound.extend(reply);
        }
        Ok(())
    }
}

/// Responder for a Modbus RTU slave with holding registers starting at 0.
/// Out-of-range reads answer with exception 0x02 (illegal data address).
pub(crate) fn holding_register_device(
    unit_id: u8,
    registers: Vec<u16>,
) -> impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static {
    move |request: &[u8]| {
        if request.len() != 8 || !validate_modbus_crc(request) || request[0] != unit_id {
            return None;
        }
        let function = request[1];
        if function != 0x03 {
            return Some(append_modbus_crc(&[unit_id, function | 0x80, 0x01]));
        }
        let address = u16::from_be_bytes([request[2], request[3]]) as usize;
        let count = u16::from_be_bytes([request[4], request[5]]) as usize;
        if address + count > registers.len() {
            return Some(append_modbus_crc(&[unit_id, 0x83, 0x02]));
        }

        let mut body = vec![unit_id, 0x03, (count * 2) as u8];
        for value in &registers[address..address + count] {
            body.extend_from_slice(&value.to_be_bytes());
        }
        Some(append_modbus_crc(&body))
    }
}

/// Responder that answers every request with the given exception code.
pub(crate) fn exception_device(
    unit_id: u8,
    code: u8,
) -> impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static {
    move |_request: &[u8]| Some(append_modbus_crc(&[unit_id, 0x83, code]))
}
