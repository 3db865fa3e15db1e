use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "annual_ingest.log";

/// Daily-rotated log file under `log_dir`, creating the directory if needed.
pub fn open_log_file(log_dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(log_dir)
        .with_context(|| format!("opening log file in {}", log_dir.display()))
}

/// Initializes the logging system with console output plus a JSON log file.
///
/// When the log file cannot be opened, logging continues on the console
/// only. The returned guard must be kept alive until exit so buffered file
/// logs get flushed.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let (file_layer, guard, file_error) = match open_log_file(log_dir) {
        Ok(appender) => {
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(non_blocking_writer);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    // Console goes to stderr; stdout carries the run summary
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    // Respect RUST_LOG if set; otherwise info for our crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("annual_ingest=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    if let Some(e) = file_error {
        warn!(error = %format!("{:#}", e), "file logging disabled, console only");
    }

    guard
}
