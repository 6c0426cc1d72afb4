// src/logging.rs
//
// Diagnostic log for the transport, poller and session. Lines go to stderr
// with a local `HH:MM:SS.mmm` stamp, and to a log file once one is opened.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Always points at the newest log file in the log directory (Unix only)
const LATEST_LOG_NAME: &str = "serialuz.log";

struct LogFile {
    path: PathBuf,
    file: File,
}

static LOG_FILE: Mutex<Option<LogFile>> = Mutex::new(None);

fn timestamp() -> impl fmt::Display {
    chrono::Local::now().format("%H:%M:%S%.3f")
}

/// Write one stamped line. Called through `tlog!`.
pub(crate) fn emit(args: fmt::Arguments<'_>) {
    let line = format!("{} {}", timestamp(), args);
    eprintln!("{}", line);

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(log) = guard.as_mut() {
            let _ = writeln!(log.file, "{}", line);
        }
    }
}

/// Open `<dir>/<YYYYmmdd-HHMMSS>-serialuz.log` and copy every later log line
/// into it. Replaces any file opened earlier. Returns the new file's path.
pub fn init_file_logging(log_dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let file_name = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-serialuz.log")
        .to_string();
    let path = log_dir.join(&file_name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    // Windows symlinks need elevated privileges
    #[cfg(unix)]
    {
        if let Err(e) = link_latest(log_dir, &file_name) {
            emit(format_args!("[logging] Cannot update {}: {}", LATEST_LOG_NAME, e));
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(LogFile {
            path: path.clone(),
            file,
        });
    }
    emit(format_args!("[logging] Writing log to {}", path.display()));

    Ok(path)
}

#[cfg(unix)]
fn link_latest(log_dir: &Path, file_name: &str) -> io::Result<()> {
    let link = log_dir.join(LATEST_LOG_NAME);
    match std::fs::remove_file(&link) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    std::os::unix::fs::symlink(file_name, link)
}

/// Close the log file, if any. Later lines go to stderr only.
pub fn stop_file_logging() {
    let closed = LOG_FILE.lock().ok().and_then(|mut guard| guard.take());
    if let Some(log) = closed {
        emit(format_args!("[logging] Closed {}", log.path.display()));
    }
}

/// `eprintln!` with a timestamp, mirrored to the log file when one is open.
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::emit(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_writes_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_file_logging(dir.path()).unwrap();

        tlog!("[test] hello {}", 42);
        stop_file_logging();
        tlog!("[test] after close");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[logging] Writing log to"));
        assert!(content.contains("[test] hello 42"));
        assert!(!content.contains("after close"));

        #[cfg(unix)]
        assert_eq!(
            std::fs::read_link(dir.path().join(LATEST_LOG_NAME)).unwrap(),
            PathBuf::from(path.file_name().unwrap())
        );
    }
}
