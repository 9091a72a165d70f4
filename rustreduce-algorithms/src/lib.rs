//! rustreduce-algorithms: Binning, correction and reduction algorithms.
//!
//! This crate provides the numerical stages of a time-of-flight reduction:
//! - **Accumulate** - weighted events into bins, serial or rayon-parallel
//! - **Rebin** - counts-conserving redistribution onto new bins
//! - **Corrections** - exponential, efficiency, polynomial, power-law and
//!   scalar/current normalizations with error propagation
//! - **Reduction** - the bin, correct, subtract, normalize sequence, per
//!   spectrum or across many spectra in parallel
//!
#![warn(missing_docs)]

mod accumulate;
mod correction;
mod processing;
mod rebin;

pub use accumulate::{accumulate, accumulate_par, EventAccumulator};
pub use correction::{horner, Correction, CorrectionPipeline, Operation, SINGULAR_THRESHOLD};
pub use processing::{reduce, Reduction, ReductionInput, ReductionReport, SpectrumFailure};
pub use rebin::rebin;

// Re-export core types used in every signature
pub use rustreduce_core::{BinParams, BinSpec, Error, Event, Histogram, Result};
