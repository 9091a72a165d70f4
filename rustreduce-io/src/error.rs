//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Configuration that parsed but cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] rustreduce_core::Error),
}

impl Error {
    /// Builds an [`Error::InvalidFormat`] naming the file and line.
    pub(crate) fn at_line(
        path: &std::path::Path,
        line: usize,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidFormat(format!("{}:{line}: {message}", path.display()))
    }
}
