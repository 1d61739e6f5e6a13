//! Tracing setup for the arbor binary
//!
//! Logs go to <data dir>/logs/arbor.log so they never interleave with the
//! streamed reply on stdout. Falls back to stderr when the file cannot be
//! opened.

use config::PathManager;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,arbor_core=debug,llm=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered lines are flushed.
pub fn init_logging() -> Option<WorkerGuard> {
    match PathManager::log_file_path() {
        Some(path) => match open_log_file(&path) {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let subscriber = tracing_subscriber::registry().with(filter()).with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                );
                if tracing::subscriber::set_global_default(subscriber).is_ok() {
                    tracing::info!("Logging initialized, writing to {}", path.display());
                }
                Some(guard)
            }
            Err(e) => {
                init_stderr_logging();
                tracing::warn!("Failed to open log file {}: {}", path.display(), e);
                None
            }
        },
        None => {
            init_stderr_logging();
            None
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

fn init_stderr_logging() {
    let subscriber = tracing_subscriber::registry().with(filter()).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
