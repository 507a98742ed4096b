//! Logging for the `liveview` binary.
//!
//! Logs go to stderr so stdout stays machine-readable. `LIVEVIEW_DEBUG_LOG=1`
//! forces debug level, otherwise `RUST_LOG` applies with `info` as fallback.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "LIVEVIEW_DEBUG_LOG";

fn debug_forced() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn env_filter() -> EnvFilter {
    if debug_forced() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. The returned guard flushes the writer on drop
/// and must be held until the process exits.
pub fn init(log_file: Option<&Path>) -> WorkerGuard {
    let opened = log_file.map(|path| {
        fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
    });
    let (file, open_failure) = match opened {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    let to_file = file.is_some();
    let (writer, guard) = match file {
        Some(file) => tracing_appender::non_blocking(file),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(!to_file)
        .with_writer(writer)
        .init();

    if let Some(err) = open_failure {
        tracing::warn!(error = %err, "Failed to open log file, logging to stderr");
    }
    guard
}
