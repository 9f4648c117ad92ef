//! Runner errors.

use r2_router::{ConfigError, StorageError};
use thiserror::Error;

/// Errors that stop the runner.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The storage file could not be used.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Socket or thread setup failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The metrics exporter could not start.
    #[error("metrics exporter: {0}")]
    Metrics(String),

    /// The node thread stopped unexpectedly.
    #[error("node thread failed")]
    NodeThread,
}
