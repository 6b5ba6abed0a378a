//! Logging setup: a stderr console sink plus an optional size-rotated file sink, each with its
//! own severity threshold.
//!
//! [`build_subscriber`] only builds the subscriber; nothing global is touched until
//! [`init_logging`] installs it. Tests install the built subscriber with
//! `tracing::subscriber::with_default` instead.

use anyhow::Context;
use clap::ValueEnum;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Layer};

/// Name of the log file created inside the log directory.
pub const LOG_FILE_NAME: &str = "cloud_storage_backups.log";

/// The log file is rotated once it grows past this many bytes.
pub const MAX_LOG_FILE_BYTES: usize = 200_000_000;

/// Number of rotated log files kept next to the live one.
pub const LOG_BACKUP_COUNT: usize = 5;

/// Severity names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Critical,
    Error,
    Warning,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            // tracing has no level above ERROR
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub console_level: LogLevel,
    /// No file sink is installed when unset.
    pub file_level: Option<LogLevel>,
    pub log_dir: PathBuf,
}

impl LogSettings {
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}

/// Size-rotated log file shared by all events.
///
/// Every event is flushed as soon as it is written: the global subscriber is never dropped, so
/// nothing buffered would reach the disk at exit.
pub struct RotatingFile(Mutex<FileRotate<AppendCount>>);

pub struct RotatingFileWriter<'a>(MutexGuard<'a, FileRotate<AppendCount>>);

impl Write for RotatingFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Drop for RotatingFileWriter<'_> {
    fn drop(&mut self) {
        let _ = self.0.flush();
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileWriter(self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl RotatingFile {
    /// Opens `path` for appending, rotating it once it holds `max_bytes` and keeping at most
    /// `backup_count` rotated files (`<name>.1` is the newest).
    pub fn open(path: PathBuf, max_bytes: usize, backup_count: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rotate = FileRotate::new(
            path,
            AppendCount::new(backup_count),
            ContentLimit::Bytes(max_bytes),
            Compression::None,
            #[cfg(unix)]
            None,
        );
        Ok(Self(Mutex::new(rotate)))
    }
}

fn rotating_writer(settings: &LogSettings) -> anyhow::Result<RotatingFile> {
    RotatingFile::open(settings.log_file(), MAX_LOG_FILE_BYTES, LOG_BACKUP_COUNT)
        .with_context(|| format!("Failed to create log directory {:?}", settings.log_dir))
}

/// Builds the dual-sink subscriber described by `settings`.
///
/// Each line carries timestamp, level, target, source file and line, then the message.
pub fn build_subscriber(
    settings: &LogSettings,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::from(settings.console_level));

    let file = match settings.file_level {
        Some(level) => Some(
            fmt::layer()
                .with_writer(rotating_writer(settings)?)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(LevelFilter::from(level)),
        ),
        None => None,
    };

    Ok(tracing_subscriber::registry().with(console).with(file))
}

/// Installs the subscriber process-wide. Call once, at start-up.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let subscriber = build_subscriber(settings)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    tracing::debug!(
        console_level = ?settings.console_level,
        file_level = ?settings.file_level,
        log_file = ?settings.log_file(),
        "Logging initialised"
    );
    Ok(())
}
