//! Logging setup driven by environment variables
//!
//! Writes human-readable logs to stderr and, when `LOG_ROOT_DIR` is set,
//! to a size-rotated `master.log` in that directory.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log level environment variable
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Directory for the rotating log file
pub const LOG_ROOT_DIR_ENV: &str = "LOG_ROOT_DIR";

/// Maximum size of the log file before rotation
pub const LOG_ROTATE_MAX_BYTES_ENV: &str = "LOG_ROTATE_MAX_BYTES";

/// Number of rotated backups to keep
pub const LOG_ROTATE_BACKUP_COUNT_ENV: &str = "LOG_ROTATE_BACKUP_COUNT";

const DEFAULT_ROTATE_MAX_BYTES: u64 = 200 * 1024 * 1024;
const MIN_ROTATE_MAX_BYTES: u64 = 1024 * 1024;
const DEFAULT_ROTATE_BACKUP_COUNT: usize = 5;

/// Resolve the tracing level filter from `LOG_LEVEL`.
///
/// Recognized values are DEBUG, INFO, WARNING, ERROR and CRITICAL;
/// anything else falls back to INFO.
pub fn log_level() -> &'static str {
    match std::env::var(LOG_LEVEL_ENV).unwrap_or_default().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" => "warn",
        "ERROR" => "error",
        "CRITICAL" => "error",
        _ => "info",
    }
}

/// Directory holding the rotating log file, if configured
pub fn log_root_dir() -> Option<PathBuf> {
    match std::env::var(LOG_ROOT_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => None,
    }
}

/// Rotation threshold from `LOG_ROTATE_MAX_BYTES`, at least 1 MiB
pub fn rotate_max_bytes() -> u64 {
    match std::env::var(LOG_ROTATE_MAX_BYTES_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        Some(bytes) if bytes >= MIN_ROTATE_MAX_BYTES => bytes,
        _ => DEFAULT_ROTATE_MAX_BYTES,
    }
}

/// Backup count from `LOG_ROTATE_BACKUP_COUNT`, at least 1
pub fn rotate_backup_count() -> usize {
    match std::env::var(LOG_ROTATE_BACKUP_COUNT_ENV)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        Some(count) if count >= 1 => count,
        _ => DEFAULT_ROTATE_BACKUP_COUNT,
    }
}

struct RotateState {
    file: File,
    written: u64,
}

struct RotatingFileInner {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    state: Mutex<RotateState>,
}

/// Size-rotating log file writer
///
/// Keeps `path`, `path.1` .. `path.N` where `path.1` is the most recent
/// backup.
#[derive(Clone)]
pub struct RotatingFileWriter {
    inner: Arc<RotatingFileInner>,
}

impl RotatingFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, backup_count: usize) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Arc::new(RotatingFileInner {
                path,
                max_bytes,
                backup_count,
                state: Mutex::new(RotateState { file, written }),
            }),
        })
    }

    fn backup_path(path: &Path, index: usize) -> PathBuf {
        PathBuf::from(format!("{}.{}", path.display(), index))
    }

    fn rotate(&self, state: &mut RotateState) -> io::Result<()> {
        let inner = &self.inner;
        state.file.flush()?;
        for index in (1..inner.backup_count).rev() {
            let from = Self::backup_path(&inner.path, index);
            if from.exists() {
                let _ = std::fs::rename(&from, Self::backup_path(&inner.path, index + 1));
            }
        }
        let _ = std::fs::rename(&inner.path, Self::backup_path(&inner.path, 1));
        state.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&inner.path)?;
        state.written = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = self.inner.clone();
        let mut state = inner.state.lock();
        if state.written > 0 && state.written + buf.len() as u64 > inner.max_bytes {
            self.rotate(&mut state)?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.state.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initialize global logging from the environment.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level()));

    let file_layer = log_root_dir().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("Failed to create log dir {}: {}", dir.display(), e);
            return None;
        }
        match RotatingFileWriter::new(dir.join("master.log"), rotate_max_bytes(), rotate_backup_count())
        {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer),
            ),
            Err(e) => {
                eprintln!("Failed to open log file in {}: {}", dir.display(), e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init();
}
