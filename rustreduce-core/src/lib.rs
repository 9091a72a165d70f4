//! rustreduce-core: Core types for time-of-flight histogram reduction.
//!
//! This crate provides the data model shared by the accumulation,
//! correction and reduction stages: validated bin schemas, weighted
//! events and histograms carrying per-bin uncertainties.
//!

pub mod binning;
pub mod error;
pub mod event;
pub mod histogram;
pub mod params;

pub use binning::{BinSpec, MAX_BINS};
pub use error::{Error, Result};
pub use event::{Event, WeightedEvent};
pub use histogram::Histogram;
pub use params::BinParams;
