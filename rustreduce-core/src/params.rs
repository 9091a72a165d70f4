//! Textual binning parameters in the `Rebin(Params=...)` convention.
//!
//! `"low,step,high"` describes linear bins, `"low,-step,high"` logarithmic
//! bins, and longer lists `"x0,d0,x1,d1,...,xn"` chain several ranges.

use std::fmt;
use std::str::FromStr;

use crate::binning::BinSpec;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parsed binning parameters.
///
/// Formatting with `Display` produces a string that parses back to the
/// same values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct BinParams {
    values: Vec<f64>,
}

impl BinParams {
    /// Creates parameters from raw values, checking their layout.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParams`] unless there is an odd number (>= 3)
    /// of finite values with non-zero steps.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        let reject = |reason: String| Error::InvalidParams {
            input: join(&values),
            reason,
        };
        if values.len() < 3 || values.len() % 2 == 0 {
            return Err(reject(format!(
                "expected low,step,high or x0,d0,x1,...,xn; got {} values",
                values.len()
            )));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(reject(format!("value {index} is not finite")));
        }
        if let Some(index) = values.iter().skip(1).step_by(2).position(|&d| d == 0.0) {
            return Err(reject(format!("step {index} is zero")));
        }
        Ok(Self { values })
    }

    /// Linear bins `low, low + step, ..., high`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParams`] if `step` is not positive.
    pub fn linear(low: f64, step: f64, high: f64) -> Result<Self> {
        if step <= 0.0 {
            return Err(Error::InvalidParams {
                input: join(&[low, step, high]),
                reason: "linear step must be positive".to_string(),
            });
        }
        Self::new(vec![low, step, high])
    }

    /// Logarithmic bins with fractional step `step`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParams`] if `step` is not positive.
    pub fn logarithmic(low: f64, step: f64, high: f64) -> Result<Self> {
        if step <= 0.0 {
            return Err(Error::InvalidParams {
                input: join(&[low, step, high]),
                reason: "logarithmic step must be given as a positive fraction".to_string(),
            });
        }
        Self::new(vec![low, -step, high])
    }

    /// Returns the raw parameter values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns true if any range uses logarithmic steps.
    #[must_use]
    pub fn has_log_range(&self) -> bool {
        self.values.iter().skip(1).step_by(2).any(|&d| d < 0.0)
    }

    /// Builds the bin schema described by these parameters.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinning`] if a range is inverted or a
    /// logarithmic range starts at a non-positive value.
    pub fn to_bin_spec(&self) -> Result<BinSpec> {
        BinSpec::from_params(&self.values)
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for BinParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.values))
    }
}

impl FromStr for BinParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|token| {
                let token = token.trim();
                token.parse::<f64>().map_err(|err| Error::InvalidParams {
                    input: s.to_string(),
                    reason: format!("'{token}' is not a number: {err}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(values).map_err(|err| match err {
            Error::InvalidParams { reason, .. } => Error::InvalidParams {
                input: s.to_string(),
                reason,
            },
            other => other,
        })
    }
}

impl TryFrom<String> for BinParams {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<BinParams> for String {
    fn from(params: BinParams) -> Self {
        params.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_linear_triple() {
        let params: BinParams = "0.02,0.02,50".parse().unwrap();
        assert_eq!(params.values(), &[0.02, 0.02, 50.0]);
        assert!(!params.has_log_range());

        let bins = params.to_bin_spec().unwrap();
        assert_eq!(bins.n_bins(), 2499);
        assert_relative_eq!(bins.range().1, 50.0);
    }

    #[test]
    fn test_parse_negative_step_is_logarithmic() {
        let params: BinParams = " 1 , -1 , 10 ".parse().unwrap();
        assert!(params.has_log_range());
        assert_eq!(params.to_bin_spec().unwrap().edges(), &[1.0, 2.0, 4.0, 8.0, 10.0]);
    }

    #[test]
    fn test_display_round_trips_losslessly() {
        for text in ["0.02,0.02,0.1", "100,-0.004,19990", "0.1,0.3,1.7,-0.05,9.25"] {
            let params: BinParams = text.parse().unwrap();
            assert_eq!(params.to_string(), text);
        }
        let params = BinParams::linear(0.1 + 0.2, 1.0 / 3.0, 7.0).unwrap();
        let reparsed: BinParams = params.to_string().parse().unwrap();
        assert_eq!(reparsed, params);
    }

    #[test]
    fn test_parse_errors() {
        for text in ["", "1,2", "1,2,3,4", "a,1,2", "0,0,1", "0,1,inf", "0,,1"] {
            let err = text.parse::<BinParams>().unwrap_err();
            assert!(
                matches!(err, Error::InvalidParams { ref input, .. } if input == text),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_constructors() {
        let log = BinParams::logarithmic(1.0, 0.5, 10.0).unwrap();
        assert_eq!(log.values(), &[1.0, -0.5, 10.0]);
        assert!(BinParams::linear(0.0, -1.0, 1.0).is_err());
        assert!(BinParams::logarithmic(1.0, 0.0, 10.0).is_err());
    }

    #[test]
    fn test_valid_params_invalid_range() {
        let params: BinParams = "5,1,2".parse().unwrap();
        assert!(matches!(params.to_bin_spec(), Err(Error::InvalidBinning(_))));
    }
}
