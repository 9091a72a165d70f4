//! Error types for rustreduce-core.

use thiserror::Error;

/// Result type alias for rustreduce operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for binning, correction and reduction.
///
/// Every variant is local to one spectrum: callers reducing many spectra
/// decide whether to skip, substitute or abort.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed bin specification (non-monotonic edges, bad step, inverted range).
    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    /// Fewer than two bin edges.
    #[error("bin specification needs at least 2 edges, got {edges}")]
    EmptyBinSpec { edges: usize },

    /// A binning parameter string could not be parsed.
    #[error("invalid binning parameters '{input}': {reason}")]
    InvalidParams { input: String, reason: String },

    /// A correction factor is numerically zero or non-finite for some bin.
    #[error("singular correction {correction} at bin {bin} (x = {x})")]
    SingularCorrection {
        correction: &'static str,
        bin: usize,
        x: f64,
    },

    /// Division by an exact zero.
    #[error("division by zero: {context}")]
    DivisionByZero { context: String },

    /// Two histograms that must share bins do not.
    #[error("incompatible binning: {context}")]
    IncompatibleBinning { context: String },

    /// Histogram arrays are inconsistent with each other or with the bins.
    #[error("histogram shape mismatch: {0}")]
    ShapeMismatch(String),
}

impl Error {
    /// Returns true for errors raised while building a bin schema.
    #[must_use]
    pub fn is_binning_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidBinning(_) | Self::EmptyBinSpec { .. } | Self::InvalidParams { .. }
        )
    }

    pub(crate) fn invalid_binning(reason: impl Into<String>) -> Self {
        Self::InvalidBinning(reason.into())
    }
}
