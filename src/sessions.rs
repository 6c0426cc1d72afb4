// src/sessions.rs
//
// Session: the state machine tying a Transport, the display framer and an
// optional Modbus poller together.
//
// A Session never runs on its own. Whoever owns it calls `tick()` on a timer
// (see `scheduler::SessionRunner`), and every outcome is reported to the
// attached observers as LogEntry values and state changes, in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::io::modbus_rtu::format_registers;
use crate::io::serial::{decode, encode};
use crate::io::{
    ConfigError, DisplayFormat, FramerError, LogEntry, LogSource, ModbusError, ModbusPoller,
    ModbusQuery, PortConfig, SerialTransport, SessionState, Transport, TransportError,
};

pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Configuration
// ============================================================================

/// What a session does with an open port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Show whatever the device sends
    Plain,
    /// Read holding registers once per poll interval
    Modbus(ModbusQuery),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub port: PortConfig,
    pub format: DisplayFormat,
    pub mode: SessionMode,
    /// Tick period in plain mode
    pub read_interval: Duration,
    /// Tick period in Modbus mode
    pub poll_interval: Duration,
}

impl SessionConfig {
    /// Plain ASCII session with default intervals
    pub fn new(port: PortConfig) -> Self {
        Self {
            port,
            format: DisplayFormat::default(),
            mode: SessionMode::Plain,
            read_interval: DEFAULT_READ_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_format(mut self, format: DisplayFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_modbus(mut self, query: ModbusQuery) -> Self {
        self.mode = SessionMode::Modbus(query);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.port.validate()?;
        if let SessionMode::Modbus(query) = &self.mode {
            query.validate()?;
        }
        if self.read_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                field: "read_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                field: "poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Period at which `tick()` should be called for the configured mode
    pub fn tick_interval(&self) -> Duration {
        match self.mode {
            SessionMode::Plain => self.read_interval,
            SessionMode::Modbus(_) => self.poll_interval,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framer(#[from] FramerError),
    #[error(transparent)]
    Modbus(#[from] ModbusError),
}

// ============================================================================
// Observers
// ============================================================================

/// Receives everything a session reports. Called synchronously from the
/// thread driving the session, so implementations should not block.
pub trait SessionObserver: Send + Sync {
    fn on_log_entry(&self, entry: &LogEntry);

    fn on_state_change(&self, _old: SessionState, _new: SessionState) {}
}

/// Observer that keeps every entry and transition in memory
#[derive(Clone, Default)]
pub struct LogRecorder {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    transitions: Arc<Mutex<Vec<(SessionState, SessionState)>>>,
}

impl LogRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Entries from one source, payloads only
    pub fn payloads(&self, source: LogSource) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.source == source)
            .map(|e| e.payload)
            .collect()
    }

    pub fn transitions(&self) -> Vec<(SessionState, SessionState)> {
        self.transitions.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.clear();
        }
    }
}

impl SessionObserver for LogRecorder {
    fn on_log_entry(&self, entry: &LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }

    fn on_state_change(&self, old: SessionState, new: SessionState) {
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push((old, new));
        }
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    config: SessionConfig,
    transport: Box<dyn Transport>,
    poller: Option<ModbusPoller>,
    state: SessionState,
    observers: Vec<Arc<dyn SessionObserver>>,
    /// Raised by `stop` (or a runner) to abort an in-flight Modbus exchange
    cancel: Arc<AtomicBool>,
    last_registers: Option<Vec<u16>>,
}

impl Session {
    pub fn new(config: SessionConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            poller: None,
            state: SessionState::Disconnected,
            observers: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            last_registers: None,
        }
    }

    /// Session over a real serial port
    pub fn serial(config: SessionConfig) -> Self {
        Self::new(config, Box::new(SerialTransport::new()))
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers from the most recent successful poll
    pub fn last_registers(&self) -> Option<&[u16]> {
        self.last_registers.as_deref()
    }

    /// Shared cancel flag. Raising it makes a waiting poll return promptly.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Change how data is shown and how `send` parses text. Allowed any time.
    pub fn set_format(&mut self, format: DisplayFormat) {
        self.config.format = format;
    }

    /// Switch to Modbus mode with a new query. Takes effect on the next start.
    pub fn set_modbus_query(&mut self, query: ModbusQuery) -> Result<(), SessionError> {
        if self.state == SessionState::Polling {
            return Err(SessionError::InvalidState {
                operation: "change the Modbus query",
                state: self.state,
            });
        }
        query.validate()?;
        self.config.mode = SessionMode::Modbus(query);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open the port and begin reading (plain) or polling (Modbus).
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        match self.connect() {
            Ok(active) => {
                self.emit(LogSource::System, self.connected_message());
                self.set_state(active);
                Ok(())
            }
            Err(e) => {
                self.teardown();
                self.state = SessionState::Disconnected;
                self.log_error(&format!("Failed to start: {}", e));
                Err(e)
            }
        }
    }

    /// Stop polling, close the port and return to Disconnected. Never fails.
    pub fn stop(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.cancel.store(true, Ordering::SeqCst);
        self.teardown();
        self.emit(LogSource::System, format!("Disconnected from {}", self.port_name()));
        self.set_state(SessionState::Disconnected);
    }

    /// `stop` followed by `start`, reported to observers as one transition.
    /// The last register values are dropped; the next poll fills them again.
    pub fn reconnect(&mut self) -> Result<(), SessionError> {
        let old = self.state;
        self.last_registers = None;
        if old == SessionState::Disconnected {
            return self.start();
        }
        self.cancel.store(true, Ordering::SeqCst);
        self.teardown();
        self.state = SessionState::Disconnected;

        let result = self.connect();
        let new = match &result {
            Ok(active) => *active,
            Err(_) => {
                self.teardown();
                SessionState::Disconnected
            }
        };
        self.state = new;

        match &result {
            Ok(_) => self.emit(LogSource::System, self.connected_message()),
            Err(e) => self.log_error(&format!("Failed to reconnect: {}", e)),
        }
        tlog!("[Session:{}] {} -> {} (reconnect)", self.port_name(), old, new);
        for observer in &self.observers {
            observer.on_state_change(old, new);
        }

        result.map(|_| ())
    }

    /// Leave Failed for Disconnected so the session can be started again.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Failed {
            return Err(SessionError::InvalidState {
                operation: "reset",
                state: self.state,
            });
        }
        self.teardown();
        self.last_registers = None;
        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Encode `text` with the current format and write it to the port.
    pub fn send(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Err(SessionError::InvalidState {
                operation: "send",
                state: self.state,
            });
        }
        if text.is_empty() {
            return Ok(());
        }

        let bytes = match encode(text, self.config.format) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.log_error(&e.to_string());
                return Err(e.into());
            }
        };

        match self.transport.write(&bytes) {
            Ok(()) => {
                self.emit(LogSource::Sent, text);
                Ok(())
            }
            Err(e) => {
                self.fail(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// One read (and, in Modbus mode, one poll). No-op unless active.
    pub fn tick(&mut self) {
        if !self.state.is_active() {
            return;
        }

        match self.transport.read_available() {
            Ok(bytes) if !bytes.is_empty() => {
                let text = decode(&bytes, self.config.format);
                self.emit(LogSource::Received, text);
            }
            Ok(_) => {}
            Err(e) => {
                self.fail(&e.to_string());
                return;
            }
        }

        let SessionMode::Modbus(query) = self.config.mode else {
            return;
        };
        let Some(poller) = self.poller.as_mut() else {
            return;
        };

        match poller.poll(self.transport.as_mut(), &query) {
            Ok(values) => {
                let text = format_registers(&values);
                self.last_registers = Some(values);
                self.emit(LogSource::Received, text);
            }
            Err(ModbusError::Cancelled) => {
                tlog!("[Session:{}] Poll cancelled", self.port_name());
            }
            Err(e) if e.is_fatal() => self.fail(&e.to_string()),
            Err(e) => {
                tlog!("[Session:{}] Poll failed: {}", self.port_name(), e);
                self.emit(LogSource::Error, e.to_string());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Validate, open and attach the poller. Returns the active state to enter.
    fn connect(&mut self) -> Result<SessionState, SessionError> {
        self.state = SessionState::Connecting;
        self.cancel.store(false, Ordering::SeqCst);
        self.config.validate()?;
        self.transport.open(&self.config.port)?;

        match self.config.mode {
            SessionMode::Plain => Ok(SessionState::Connected),
            SessionMode::Modbus(query) => {
                let mut poller = ModbusPoller::new(self.config.port.timeout, self.cancel.clone());
                poller.connect(self.transport.as_mut(), query.unit_id)?;
                self.poller = Some(poller);
                Ok(SessionState::Polling)
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.disconnect();
        }
        self.transport.close();
    }

    /// Fatal error: one Error entry, release the port, one transition to Failed.
    fn fail(&mut self, message: &str) {
        self.teardown();
        self.log_error(message);
        self.set_state(SessionState::Failed);
    }

    fn connected_message(&self) -> String {
        match self.config.mode {
            SessionMode::Plain => format!("Connected to {}", self.config.port.summary()),
            SessionMode::Modbus(query) => {
                format!("Connected to {}, polling {}", self.config.port.summary(), query)
            }
        }
    }

    fn port_name(&self) -> &str {
        &self.config.port.port_name
    }

    fn log_error(&self, message: &str) {
        tlog!("[Session:{}] {}", self.port_name(), message);
        self.emit(LogSource::Error, message);
    }

    fn emit(&self, source: LogSource, payload: impl Into<String>) {
        let entry = LogEntry::new(source, payload);
        for observer in &self.observers {
            observer.on_log_entry(&entry);
        }
    }

    fn set_state(&mut self, new: SessionState) {
        let old = self.state;
        self.state = new;
        if old == new {
            return;
        }
        tlog!("[Session:{}] {} -> {}", self.port_name(), old, new);
        for observer in &self.observers {
            observer.on_state_change(old, new);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// Tests
// ============================================================================
