//! Logging setup for SpoutCap
//!
//! - tracing subscriber with a reloadable level filter
//! - optional daily-rotated log file under the local data directory
//! - background cleanup of old log files
//!
//! `log` macros used by the capture library are forwarded into the same
//! subscriber.

use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

pub const LOG_FILE_PREFIX: &str = "spoutcap.log";

lazy_static! {
    static ref LOG_RELOAD_HANDLE: Mutex<Option<Handle<EnvFilter, Registry>>> = Mutex::new(None);
}

/// Verbosity accepted in `settings.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const NAMES: [(LogLevel, &'static str); 6] = [
        (LogLevel::Off, "Off"),
        (LogLevel::Error, "Error"),
        (LogLevel::Warn, "Warn"),
        (LogLevel::Info, "Info"),
        (LogLevel::Debug, "Debug"),
        (LogLevel::Trace, "Trace"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(level, _)| *level == self)
            .map_or("Off", |(_, name)| name)
    }

    pub fn tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("warning") {
            return Ok(LogLevel::Warn);
        }
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(wanted))
            .map(|(level, _)| *level)
            .ok_or_else(|| format!("unknown log level {:?}", s))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter directives covering the binary and the capture library
pub fn filter_directives(log_level: LogLevel) -> String {
    match log_level.tracing_level() {
        Some(lvl) => format!("spoutcap={0},spoutcap_capture={0}", lvl.as_str().to_lowercase()),
        None => "off".to_string(),
    }
}

/// %LOCALAPPDATA%\SpoutCap\logs on Windows, ~/.local/share/SpoutCap/logs elsewhere
pub fn get_logs_dir() -> Result<PathBuf> {
    let logs_dir = dirs::data_local_dir()
        .context("no local data directory")?
        .join("SpoutCap")
        .join("logs");
    fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating logs directory {}", logs_dir.display()))?;
    Ok(logs_dir)
}

/// Install the global subscriber, or reload the level if it is already installed.
///
/// The file layer is decided on the first call only.
pub fn init_logging(log_level: LogLevel, log_to_file: bool) -> Result<()> {
    let level_filter = EnvFilter::try_new(filter_directives(log_level))
        .map_err(|e| anyhow!("bad log filter: {}", e))?;

    let mut reload_slot = LOG_RELOAD_HANDLE
        .lock()
        .map_err(|_| anyhow!("log reload handle poisoned"))?;
    if let Some(handle) = reload_slot.as_ref() {
        return handle.reload(level_filter).context("reloading log filter");
    }

    let appender = if log_to_file {
        Some(RollingFileAppender::new(Rotation::DAILY, get_logs_dir()?, LOG_FILE_PREFIX))
    } else {
        None
    };

    let (filter_layer, reload_handle) = tracing_subscriber::reload::Layer::new(level_filter);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .with_line_number(true);
    let file_layer = appender.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("installing log subscriber")?;

    *reload_slot = Some(reload_handle);
    Ok(())
}

// Daily rotation appends the date to the prefix
fn is_log_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) || name.ends_with(".log"))
}

fn file_age(entry: &fs::DirEntry, now: SystemTime) -> Option<Duration> {
    let modified = entry.metadata().ok()?.modified().ok()?;
    now.duration_since(modified).ok()
}

/// Delete log files older than `keep_days`; returns how many were removed
pub fn cleanup_old_logs(logs_dir: &Path, keep_days: u32) -> Result<usize> {
    let now = SystemTime::now();
    let max_age = Duration::from_secs(u64::from(keep_days) * 86_400);
    let entries = fs::read_dir(logs_dir)
        .with_context(|| format!("reading logs directory {}", logs_dir.display()))?;

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_log_file(&path) {
            continue;
        }
        let Some(age) = file_age(&entry, now) else {
            continue;
        };
        if age > max_age && fs::remove_file(&path).is_ok() {
            removed += 1;
            tracing::debug!(file = %path.display(), days = age.as_secs() / 86_400, "removed old log");
        }
    }

    Ok(removed)
}

/// Run [`cleanup_old_logs`] on a background thread
pub fn auto_cleanup_old_logs(keep_days: u32) {
    let spawned = std::thread::Builder::new()
        .name("spoutcap-log-cleanup".to_string())
        .spawn(move || {
            let outcome = get_logs_dir().and_then(|dir| cleanup_old_logs(&dir, keep_days));
            match outcome {
                Ok(0) => {}
                Ok(count) => tracing::info!(removed = count, "old log files cleaned up"),
                Err(e) => tracing::warn!(error = %e, "log cleanup failed"),
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "could not start log cleanup thread");
    }
}
