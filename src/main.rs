// src/main.rs
//
// Command-line front end: list ports, monitor a port (optionally polling
// Modbus registers) or send a single message.

use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

use serialuz_lib::io::{DataBits, FlowControl, Parity, StopBits};
use serialuz_lib::settings::Protocol;
use serialuz_lib::{
    init_file_logging, list_serial_ports, stop_file_logging, DisplayFormat, LogEntry, Session,
    SessionObserver, SessionRunner, SessionSettings, SessionState, SettingsStore,
};

/// Serial port monitor with optional Modbus RTU polling
#[derive(Parser, Debug)]
#[command(name = "serialuz", version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON, or TOML with a .toml extension)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long, global = true)]
    save: bool,

    /// Also write the diagnostic log to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Show incoming data; lines typed on stdin are sent. Ctrl-C stops.
    Monitor {
        #[command(flatten)]
        line: LineArgs,
    },
    /// Send one message and exit
    Send {
        #[command(flatten)]
        line: LineArgs,

        /// Text to send (hex pairs when --format hex)
        data: String,

        /// Keep reading replies for this many milliseconds
        #[arg(long, default_value_t = 0)]
        wait_ms: u64,
    },
}

/// Overrides for values loaded from the settings file
#[derive(Args, Debug, Clone, Default)]
struct LineArgs {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// ascii or hex
    #[arg(short, long)]
    format: Option<DisplayFormat>,

    /// 5, 6, 7 or 8
    #[arg(long)]
    data_bits: Option<DataBits>,

    /// none, even, odd, mark or space
    #[arg(long)]
    parity: Option<Parity>,

    /// 1, 1.5 or 2
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// none, rts/cts or xon/xoff
    #[arg(long)]
    flow_control: Option<FlowControl>,

    /// Timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Poll holding registers over Modbus RTU
    #[arg(long)]
    modbus: bool,

    #[arg(long)]
    unit: Option<u8>,

    /// First holding register
    #[arg(long)]
    address: Option<u16>,

    /// Number of registers per poll
    #[arg(long)]
    count: Option<u16>,

    /// Poll interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
}

impl LineArgs {
    fn apply(&self, settings: &mut SessionSettings) {
        if let Some(port) = &self.port {
            settings.port = port.clone();
        }
        if let Some(baud) = self.baud {
            settings.baudrate = baud;
        }
        if let Some(format) = self.format {
            settings.data_format = format;
        }
        if let Some(bits) = self.data_bits {
            settings.data_bits = bits;
        }
        if let Some(parity) = self.parity {
            settings.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            settings.stop_bits = stop_bits;
        }
        if let Some(flow) = self.flow_control {
            settings.flow_control = flow;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = timeout;
        }
        if self.modbus {
            settings.protocol = Protocol::ModbusRtu;
        }
        if let Some(unit) = self.unit {
            settings.unit_id = unit;
        }
        if let Some(address) = self.address {
            settings.register_address = address;
        }
        if let Some(count) = self.count {
            settings.register_count = count;
        }
        if let Some(ms) = self.poll_ms {
            settings.poll_interval_ms = ms;
        }
    }
}

/// Prints every entry and state change to stdout
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_log_entry(&self, entry: &LogEntry) {
        println!("{}", entry);
    }

    fn on_state_change(&self, old: SessionState, new: SessionState) {
        println!("-- {} -> {}", old, new);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.log_dir {
        init_file_logging(dir)?;
    }

    let result = run(cli).await;
    stop_file_logging();
    result
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let store = cli
        .settings
        .clone()
        .or_else(SettingsStore::default_path)
        .map(SettingsStore::new);

    let line = match &cli.command {
        Command::Ports => return print_ports(),
        Command::Monitor { line } => line,
        Command::Send { line, .. } => line,
    };

    let mut settings = match &store {
        Some(store) => store.load_settings()?,
        None => SessionSettings::default(),
    };
    line.apply(&mut settings);
    let config = settings.to_session_config()?;

    if cli.save {
        let store = store.as_ref().ok_or("no settings path available; pass --settings")?;
        store.save_settings(&settings)?;
    }

    let mut session = Session::serial(config);
    session.add_observer(Arc::new(ConsoleObserver));

    match cli.command {
        Command::Monitor { .. } => monitor(session).await,
        Command::Send { data, wait_ms, .. } => send_once(session, &data, wait_ms).await,
        Command::Ports => Ok(()),
    }
}

fn print_ports() -> Result<(), Box<dyn Error>> {
    let ports = list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

async fn monitor(session: Session) -> Result<(), Box<dyn Error>> {
    let mut runner = SessionRunner::new(session);
    runner.start()?;

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut watchdog = tokio::time::interval(Duration::from_millis(200));
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(text)) => {
                    // Failures are already reported through the observer
                    let _ = runner.send(&text).await;
                }
                _ => stdin_open = false,
            },
            _ = watchdog.tick() => {
                if !runner.is_running() {
                    break;
                }
            }
        }
    }

    let failed = runner.state().await == SessionState::Failed;
    runner.stop().await;

    if failed {
        return Err("session failed".into());
    }
    Ok(())
}

async fn send_once(session: Session, data: &str, wait_ms: u64) -> Result<(), Box<dyn Error>> {
    tokio::task::spawn_blocking({
        let data = data.to_string();
        move || -> Result<(), String> {
            let mut session = session;
            session.start().map_err(|e| e.to_string())?;
            let sent = session.send(&data).map_err(|e| e.to_string());

            if sent.is_ok() && wait_ms > 0 {
                let period = session.config().read_interval;
                let deadline = std::time::Instant::now() + Duration::from_millis(wait_ms);
                while std::time::Instant::now() < deadline && session.state().is_active() {
                    session.tick();
                    std::thread::sleep(period);
                }
            }

            session.stop();
            sent
        }
    })
    .await??;
    Ok(())
}
