//! Tracing initialization for the CLI.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::PushError;

/// `RUST_LOG` if set, `info` otherwise.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a console layer and, when `log_file` is given, a JSON file
/// layer appending to that file.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the lifetime of the process.
///
/// # Errors
///
/// - `PushError::Configuration` - `log_file` has no file name
/// - `PushError::Io` - the log directory cannot be created
/// - `PushError::Internal` - a global subscriber is already installed
pub fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, PushError> {
    let console = fmt::layer().with_target(false).with_filter(env_filter());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path.file_name().ok_or_else(|| {
                PushError::Configuration(format!("log file has no name: {}", path.display()))
            })?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .map_err(|e| PushError::Io(format!("Failed to create log directory: {}", e)))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| PushError::Internal(format!("Failed to initialize tracing: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_without_file_name_is_rejected() {
        let result = init_tracing(Some(Path::new("/")));
        assert!(matches!(result, Err(PushError::Configuration(_))));
    }
}
