use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::UtcOffset;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{self, fmt, prelude::*};

const LOG_RETENTION_DAYS: u64 = 7;

/// Where the session log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFile {
    /// Only stderr.
    Disabled,
    /// A new `session-<timestamp>-<pid>.log` in the user cache directory.
    Session,
    /// Truncate and write this file.
    Path(PathBuf),
}

/// Get the log directory path in the user-specific OS cache directory
/// - Linux: ~/.cache/salt-lsp/
/// - macOS: ~/Library/Caches/salt-lsp/
/// - Windows: %LOCALAPPDATA%\salt-lsp\
fn get_log_dir() -> io::Result<PathBuf> {
    let mut log_dir = dirs::cache_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Unable to determine user cache directory"))?;
    log_dir.push("salt-lsp");

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }
    Ok(log_dir)
}

/// Remove session logs older than LOG_RETENTION_DAYS
fn cleanup_old_logs(log_dir: &Path) -> io::Result<()> {
    let now = std::time::SystemTime::now();
    let retention = std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    for entry in fs::read_dir(log_dir)?.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !metadata.is_file() || !(name.starts_with("session-") && name.ends_with(".log")) {
            continue;
        }
        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if expired {
            if let Err(e) = fs::remove_file(entry.path()) {
                eprintln!("Failed to remove old log file {:?}: {}", entry.path(), e);
            }
        }
    }
    Ok(())
}

fn session_log_path() -> io::Result<PathBuf> {
    let log_dir = get_log_dir()?;
    cleanup_old_logs(&log_dir)?;

    let timestamp = time::OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]-[hour][minute][second]"))
        .map_err(io::Error::other)?;
    Ok(log_dir.join(format!("session-{}-{}.log", timestamp, std::process::id())))
}

/// Maps a `--log-level` value to a tracing filter directive. Names are
/// case-insensitive; anything unknown selects `debug`.
pub fn level_directive(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "critical" | "fatal" | "error" => "error",
        "warning" | "warn" => "warn",
        "info" => "info",
        "trace" => "trace",
        _ => "debug",
    }
}

fn tolerate_already_set(result: Result<(), tracing_subscriber::util::TryInitError>) -> io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        // Ignore errors due to the subscriber or logger already being set
        Err(e) if e.to_string().contains("already been set") || e.to_string().contains("SetLoggerError") => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Filter for `--log-level`, else `RUST_LOG`, else "info".
fn level_filter(log_level: Option<&str>) -> tracing_subscriber::EnvFilter {
    match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level_directive(level)),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    }
}

/// An explicit log file replaces stderr output.
fn writes_stderr(log_file: &LogFile) -> bool {
    !matches!(log_file, LogFile::Path(_))
}

/// Initialize logger with stderr and optional file output
/// Returns a WorkerGuard that must be kept alive for the duration of the program
///
/// # Arguments
/// * `no_color` - Disable ANSI colors in stderr output
/// * `log_level` - Override log level (otherwise uses RUST_LOG or defaults to "info")
/// * `log_file` - Session log (always at DEBUG, alongside stderr) or an
///   explicit file that takes the place of stderr
pub fn init_logger(no_color: bool, log_level: Option<&str>, log_file: LogFile) -> io::Result<WorkerGuard> {
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::UTC,
        format_description!("[[[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z]"),
    );

    // stdout carries the protocol when serving over stdio
    let stderr_layer = writes_stderr(&log_file).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(timer.clone())
            .with_ansi(!no_color)
            .with_filter(level_filter(log_level))
    });

    let (log_path, file_filter) = match log_file {
        LogFile::Disabled => {
            let (_, guard) = tracing_appender::non_blocking(std::io::sink());
            tolerate_already_set(tracing_subscriber::registry().with(stderr_layer).try_init())?;
            return Ok(guard);
        }
        LogFile::Session => (session_log_path()?, tracing_subscriber::EnvFilter::new("debug")),
        LogFile::Path(path) => (path, level_filter(log_level)),
    };

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_timer(timer)
        .with_ansi(false)
        .with_filter(file_filter);

    let announce = stderr_layer.is_some();
    tolerate_already_set(
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init(),
    )?;
    if announce {
        eprintln!("Logging to file: {:?}", log_path);
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("Warning"), "warn");
        assert_eq!(level_directive("info"), "info");
        assert_eq!(level_directive("verbose"), "debug");
    }

    #[test]
    fn test_explicit_log_file_replaces_stderr() {
        assert!(!writes_stderr(&LogFile::Path(PathBuf::from("/tmp/salt-lsp.log"))));
        assert!(writes_stderr(&LogFile::Session));
        assert!(writes_stderr(&LogFile::Disabled));
    }

    #[test]
    fn test_init_twice_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let first = init_logger(true, Some("debug"), LogFile::Path(dir.path().join("a.log")));
        let second = init_logger(true, None, LogFile::Disabled);
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    fn test_old_session_logs_are_pruned_only_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("session-new.log"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        cleanup_old_logs(dir.path()).unwrap();
        assert!(dir.path().join("session-new.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
