//! Logging setup
//!
//! One-shot CLI commands log to stderr at `warn` unless `RUST_LOG` says
//! otherwise. The daemon logs at `settings.log_level`: to stderr in the
//! foreground, or through a non-blocking writer into a size-rotated file
//! when detached.

use color_eyre::eyre::{self, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Daemon log rotates at this size
const MAX_LOG_SIZE: u64 = 1_000_000;

pub const LOG_FILE_NAME: &str = "daemon.log";

/// `RUST_LOG` if set, else `sndsw=<level>`
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Logging for one-shot CLI commands
pub fn init_cli() {
    // A second init (e.g. in tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(io::stderr)
        .try_init();
}

/// Logging for the daemon
///
/// Returns the guard of the background writer when logging to a file; it
/// must live until the daemon exits or buffered lines are lost.
///
/// # Errors
/// Returns an error if the log directory cannot be determined.
pub fn init_daemon(log_level: &str, foreground: bool) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(&format!("sndsw={log_level}"));

    if foreground {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
        return Ok(None);
    }

    let appender = RotatingFileAppender::new(log_dir()?, LOG_FILE_NAME, MAX_LOG_SIZE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    Ok(Some(guard))
}

/// Directory holding the daemon log (`$XDG_STATE_HOME/sndsw`, falling back to the data dir)
///
/// # Errors
/// Returns an error if neither directory can be determined.
pub fn log_dir() -> Result<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("sndsw"))
        .ok_or_else(|| eyre::eyre!("Could not determine state directory for logs"))
}

/// File writer that rotates on size
///
/// Keeps exactly two files: `<name>` (active) and `<name>.old` (previous).
/// The active file is re-created if it is deleted while the daemon runs.
/// Files are created with 0o600 permissions on unix.
pub struct RotatingFileAppender {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    file: Mutex<Option<File>>,
}

impl RotatingFileAppender {
    pub fn new(dir: impl Into<PathBuf>, filename: &str, max_size_bytes: u64) -> Self {
        let dir = dir.into();
        Self {
            path: dir.join(filename),
            backup_path: dir.join(format!("{filename}.old")),
            max_size_bytes,
            file: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_secure(path: &Path, append: bool) -> io::Result<File> {
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);

        if append {
            options.append(true);
        } else {
            options.truncate(true);
        }

        #[cfg(unix)]
        {
            options.mode(0o600);
        }

        options.open(path)
    }

    /// Open the file if needed (also after external deletion)
    fn get_file<'a>(&self, slot: &'a mut Option<File>) -> io::Result<&'a mut File> {
        if !self.path.exists() {
            *slot = None;
        }

        if slot.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            *slot = Some(Self::open_secure(&self.path, true)?);
        }

        slot.as_mut()
            .ok_or_else(|| io::Error::other("log file not open"))
    }

    /// current -> backup, then start an empty current
    fn rotate(&self, slot: &mut Option<File>) -> io::Result<()> {
        *slot = None;

        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }

        *slot = Some(Self::open_secure(&self.path, false)?);
        Ok(())
    }
}

impl Write for RotatingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        let current_size = match self.get_file(&mut slot) {
            Ok(f) => f.metadata()?.len(),
            Err(_) => 0,
        };

        if current_size >= self.max_size_bytes
            && let Err(e) = self.rotate(&mut slot)
        {
            // Logging can't log its own failure
            eprintln!("Failed to rotate log file: {e}");
        }

        self.get_file(&mut slot)?.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        if let Some(file) = slot.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}
