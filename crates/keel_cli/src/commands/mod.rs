//! CLI command implementations.

pub mod dump;
pub mod verify;

use keel_core::wal::OperationLog;
use keel_core::{Config, CoreError, LOG_FILE_NAME};
use keel_storage::{FileBackend, StorageError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// No log at the given path.
    #[error("log file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The log could not be read or decoded.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The log file could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output failed.
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Verification found corruption.
    #[error("verification failed")]
    VerificationFailed,
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Resolves `path` to a log file: a directory means the store log inside it.
pub fn resolve_log_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(LOG_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

/// Opens the log at `path` for reading.
pub fn open_log(path: &Path) -> CliResult<OperationLog> {
    let log_path = resolve_log_path(path);
    if !log_path.is_file() {
        return Err(CliError::NotFound(log_path));
    }
    tracing::debug!(path = %log_path.display(), "opening log");
    let backend = FileBackend::open(&log_path)?;
    Ok(OperationLog::new(Box::new(backend), &Config::default()))
}

/// Lower-case hex, as printed for keys.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
