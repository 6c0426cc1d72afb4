// src/settings.rs
//
// Persisted session settings. JSON by default; a `.toml` path switches the
// file to TOML. Field names follow the settings.json the desktop prototypes
// wrote, so existing files load unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::io::{
    ConfigError, DataBits, DisplayFormat, FlowControl, ModbusQuery, Parity, PortConfig, StopBits,
};
use crate::sessions::{SessionConfig, SessionMode, DEFAULT_POLL_INTERVAL};

const SETTINGS_DIR_NAME: &str = "SeriaLuz";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("failed to serialize settings: {0}")]
    Serialize(String),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Protocol layered over the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "None")]
    Plain,
    #[serde(rename = "Modbus RTU")]
    ModbusRtu,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Plain
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub port: String,
    #[serde(deserialize_with = "deserialize_baudrate")]
    pub baudrate: u32,
    pub data_format: DisplayFormat,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub protocol: Protocol,
    pub unit_id: u8,
    pub register_address: u16,
    pub register_count: u16,
    /// Seconds
    pub timeout: f64,
    pub poll_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: 9600,
            data_format: DisplayFormat::Ascii,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            protocol: Protocol::Plain,
            unit_id: 1,
            register_address: 0,
            register_count: 1,
            timeout: 1.0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// Older files store the baud rate as a string ("9600")
fn deserialize_baudrate<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Baud {
        Number(u32),
        Text(String),
    }

    match Baud::deserialize(deserializer)? {
        Baud::Number(n) => Ok(n),
        Baud::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid baud rate '{}'", s))),
    }
}

impl SessionSettings {
    pub fn to_port_config(&self) -> Result<PortConfig, ConfigError> {
        let mut cfg = PortConfig::new(self.port.trim(), self.baudrate).with_timeout_secs(self.timeout)?;
        cfg.data_bits = self.data_bits;
        cfg.parity = self.parity;
        cfg.stop_bits = self.stop_bits;
        cfg.flow_control = self.flow_control;
        Ok(cfg)
    }

    pub fn modbus_query(&self) -> ModbusQuery {
        ModbusQuery::new(self.unit_id, self.register_address, self.register_count)
    }

    /// Build a validated session configuration
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        let mut config = SessionConfig::new(self.to_port_config()?).with_format(self.data_format);
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        if self.protocol == Protocol::ModbusRtu {
            config = config.with_modbus(self.modbus_query());
        }
        config.validate()?;
        Ok(config)
    }

    /// Copy line parameters from `cfg`, leaving protocol fields alone.
    pub fn apply_port_config(&mut self, cfg: &PortConfig) {
        self.port = cfg.port_name.clone();
        self.baudrate = cfg.baud_rate;
        self.data_bits = cfg.data_bits;
        self.parity = cfg.parity;
        self.stop_bits = cfg.stop_bits;
        self.flow_control = cfg.flow_control;
        self.timeout = cfg.timeout.as_secs_f64();
    }

    pub fn from_session_config(config: &SessionConfig) -> Self {
        let mut settings = Self::default();
        settings.apply_port_config(&config.port);
        settings.data_format = config.format;
        settings.poll_interval_ms = config.poll_interval.as_millis() as u64;
        if let SessionMode::Modbus(query) = config.mode {
            settings.protocol = Protocol::ModbusRtu;
            settings.unit_id = query.unit_id;
            settings.register_address = query.register_address;
            settings.register_count = query.register_count;
        }
        settings
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Load/save of the line parameters alone, for callers that only care about
/// which port to open.
pub trait PortConfigStore {
    fn load(&self) -> Result<PortConfig, SettingsError>;
    fn save(&self, cfg: &PortConfig) -> Result<(), SettingsError>;
}

/// Settings file on disk
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/SeriaLuz/settings.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_toml(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
    }

    /// Read the settings file. A missing file yields defaults.
    pub fn load_settings(&self) -> Result<SessionSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(SessionSettings::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;

        let parsed = if self.is_toml() {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| SettingsError::Parse {
            path: self.path.clone(),
            reason,
        })
    }

    pub fn save_settings(&self, settings: &SessionSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = if self.is_toml() {
            toml::to_string_pretty(settings).map_err(|e| SettingsError::Serialize(e.to_string()))?
        } else {
            serde_json::to_string_pretty(settings)
                .map_err(|e| SettingsError::Serialize(e.to_string()))?
        };

        std::fs::write(&self.path, content).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;

        tlog!("[Settings] Saved {}", self.path.display());
        Ok(())
    }
}

impl PortConfigStore for SettingsStore {
    fn load(&self) -> Result<PortConfig, SettingsError> {
        Ok(self.load_settings()?.to_port_config()?)
    }

    fn save(&self, cfg: &PortConfig) -> Result<(), SettingsError> {
        let mut settings = self.load_settings()?;
        settings.apply_port_config(cfg);
        self.save_settings(&settings)
    }
}
