//! # Logging Setup
//!
//! Installs a `tracing` subscriber with a console layer and, when a log
//! directory is given, a JSON file layer rotated daily.

use std::io;
use std::path::PathBuf;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// File name prefix of the rotated log files.
    pub app_name: String,
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `lib_collar=debug`.
    pub level: String,
    /// Directory for JSON log files; console only when `None`.
    pub log_dir: Option<PathBuf>,
    /// Colour the console output.
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            app_name: "collar-fetch".to_string(),
            level: "info".to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for as long as the program logs. `Ok(None)` when there is no file layer.
///
/// # Errors
/// When the log directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging(options: &LogOptions) -> io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // Diagnostics go to stderr so stdout stays free for data.
    let console_layer = fmt::layer()
        .with_target(true)
        .with_ansi(options.ansi)
        .with_writer(io::stderr);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = rolling::daily(dir, &options.app_name);
            let (writer, guard) = non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).json().boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;

    info!(level = %options.level, file = options.log_dir.is_some(), "Logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            log_dir: Some(dir.path().join("logs")),
            ansi: false,
            ..LogOptions::default()
        };
        let first = setup_logging(&options);
        let second = setup_logging(&options);
        // Another test may have installed a subscriber first; either way the
        // second call must fail cleanly.
        assert!(second.is_err());
        if first.is_ok() {
            assert!(dir.path().join("logs").is_dir());
        }
    }
}
