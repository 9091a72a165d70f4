//! JSON reduction configuration.
//!
//! ```json
//! {
//!   "binning": "0.02,0.02,0.10",
//!   "corrections": [
//!     {"type": "exponential_attenuation", "c1": 0.1, "operation": "divide"},
//!     {"type": "normalise_by_current"}
//!   ],
//!   "proton_charge": 12.5,
//!   "parallelism": 4
//! }
//! ```

use crate::{Error, Result};
use rustreduce_algorithms::{CorrectionPipeline, Reduction};
use rustreduce_core::{BinParams, BinSpec};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Settings shared by every spectrum of a reduction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReductionConfig {
    /// Binning parameters, e.g. `"low,step,high"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binning: Option<BinParams>,
    /// Corrections applied in order after binning.
    pub corrections: CorrectionPipeline,
    /// Proton charge attached to histograms binned from events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proton_charge: Option<f64>,
    /// Worker threads for multi-spectrum runs; `None` uses all cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
}

impl ReductionConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`ReductionConfig::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or fails
    /// [`ReductionConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sets the binning parameters.
    #[must_use]
    pub fn with_binning(mut self, binning: BinParams) -> Self {
        self.binning = Some(binning);
        self
    }

    /// Sets the worker thread count.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Checks the configuration once, at load time.
    ///
    /// # Errors
    /// Returns a core error if the binning does not produce valid edges, and
    /// [`Error::InvalidConfig`] for non-finite coefficients, a non-positive
    /// proton charge, or zero parallelism.
    pub fn validate(&self) -> Result<()> {
        if let Some(binning) = &self.binning {
            binning.to_bin_spec()?;
        }
        for (index, correction) in self.corrections.corrections().iter().enumerate() {
            if !correction.has_finite_coefficients() {
                return Err(Error::InvalidConfig(format!(
                    "correction {index} ({}) has a non-finite coefficient",
                    correction.name()
                )));
            }
        }
        if let Some(charge) = self.proton_charge {
            if !(charge.is_finite() && charge > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "proton_charge must be positive and finite, got {charge}"
                )));
            }
        }
        if self.parallelism == Some(0) {
            return Err(Error::InvalidConfig("parallelism must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Builds the bin schema.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if no binning is set, or a core error
    /// if it is invalid.
    pub fn bin_spec(&self) -> Result<BinSpec> {
        let binning = self
            .binning
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("no binning given".to_string()))?;
        Ok(binning.to_bin_spec()?)
    }

    /// Builds the reduction recipe. Background and reference histograms are
    /// attached by the caller.
    ///
    /// # Errors
    /// See [`ReductionConfig::bin_spec`].
    pub fn to_reduction(&self) -> Result<Reduction> {
        let mut reduction =
            Reduction::new(self.bin_spec()?).with_corrections(self.corrections.clone());
        if let Some(charge) = self.proton_charge {
            reduction = reduction.with_normalization(charge);
        }
        Ok(reduction)
    }
}
