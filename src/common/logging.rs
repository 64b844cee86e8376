//! Logging and tracing configuration
//!
//! The driver logs to stderr. A served engine runs in the background, so it
//! logs to a file as well.

use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::paths;

/// Initialize tracing for the driver CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("testdriver=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for a served engine (file + stderr logging)
///
/// Writes to `<data dir>/logs/engine-<name>.log` and to stderr. Falls back to
/// stderr only when the log file cannot be opened.
pub fn init_engine(name: &str) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("testdriver=debug,info"));

    if let Some(log_file) = engine_log_path(name) {
        let opened = log_file
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&log_file)
            });

        match opened {
            Ok(file) => {
                let file_layer = fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);

                let stderr_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact();

                tracing_subscriber::registry()
                    .with(filter)
                    .with(file_layer)
                    .with(stderr_layer)
                    .init();

                return Some(log_file);
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file: {}", e);
            }
        }
    }

    // Fallback: stderr only
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    None
}

/// Get the path to a served engine's log file
pub fn engine_log_path(name: &str) -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join(format!("engine-{}.log", name)))
}
