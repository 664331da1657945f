// src/infra/logger.rs — Structured logging with tracing

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// When `file` is given, output is appended to that file instead of stderr.
/// If the file cannot be opened we fall back to stderr and say so.
pub fn init_logging(level: &str, file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let opened = file.map(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.display().to_string(), e))
    });

    match opened {
        Some(Ok(log_file)) => {
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .compact()
                .init();
        }
        other => {
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .init();
            if let Some(Err((path, e))) = other {
                tracing::warn!("Could not open log file {}: {}. Logging to stderr.", path, e);
            }
        }
    }
}
