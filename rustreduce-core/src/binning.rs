//! Bin schemas: validated, immutable sequences of bin edges.
//!
//! A [`BinSpec`] always holds at least two strictly increasing, finite
//! edges. Edges live behind an `Arc`, so cloning a schema is cheap and the
//! same schema can be shared read-only by any number of concurrent
//! accumulations.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::histogram::Histogram;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest number of bins a generated schema may hold.
pub const MAX_BINS: usize = 10_000_000;

/// A generated edge closer than `step * EDGE_MERGE_TOLERANCE` to the upper
/// bound of its range is replaced by the bound itself.
const EDGE_MERGE_TOLERANCE: f64 = 1e-9;

/// Relative tolerance used by [`BinSpec::matches`].
const MATCH_TOLERANCE: f64 = 1e-10;

/// Strictly increasing bin edges (`n_bins + 1` values).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<f64>", into = "Vec<f64>"))]
pub struct BinSpec {
    edges: Arc<[f64]>,
}

impl BinSpec {
    /// Builds linear bins `min, min + step, min + 2*step, ...` ending with an
    /// edge placed exactly at `max`.
    ///
    /// When `max` does not fall on a step boundary the last bin is narrower
    /// than `step`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinning`] if `step <= 0`, `max <= min`, any
    /// value is non-finite, or the range would need more than [`MAX_BINS`] bins.
    pub fn from_linear(min: f64, step: f64, max: f64) -> Result<Self> {
        let mut edges = vec![min];
        push_linear_range(&mut edges, min, step, max)?;
        Ok(Self::from_generated(edges))
    }

    /// Builds logarithmic bins where `edge[i+1] = edge[i] * (1 + step)`,
    /// ending with an edge placed exactly at `max`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinning`] if `step <= 0`, `min <= 0`,
    /// `max <= min` or any value is non-finite.
    pub fn from_log(min: f64, step: f64, max: f64) -> Result<Self> {
        let mut edges = vec![min];
        push_log_range(&mut edges, min, step, max)?;
        Ok(Self::from_generated(edges))
    }

    /// Builds bins from `Rebin`-style parameters `x0, d0, x1, d1, ..., xn`.
    ///
    /// Each `(x_i, d_i, x_{i+1})` triple is one range; a positive `d_i` is a
    /// linear step, a negative one a logarithmic step of `|d_i|`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinning`] if the parameter count is not odd and
    /// at least 3, a step is zero, or any range is invalid.
    pub fn from_params(params: &[f64]) -> Result<Self> {
        if params.len() < 3 || params.len() % 2 == 0 {
            return Err(Error::invalid_binning(format!(
                "expected an odd number (>= 3) of parameters, got {}",
                params.len()
            )));
        }

        let mut edges = vec![params[0]];
        for range in params.windows(3).step_by(2) {
            let (low, step, high) = (range[0], range[1], range[2]);
            if step > 0.0 {
                push_linear_range(&mut edges, low, step, high)?;
            } else if step < 0.0 {
                push_log_range(&mut edges, low, -step, high)?;
            } else {
                return Err(Error::invalid_binning(format!(
                    "step for range [{low}, {high}] must be non-zero"
                )));
            }
        }
        Ok(Self::from_generated(edges))
    }

    /// Builds bins from an explicit list of edges (irregular widths allowed).
    ///
    /// # Errors
    /// Returns [`Error::EmptyBinSpec`] for fewer than two edges and
    /// [`Error::InvalidBinning`] if edges are non-finite or not strictly increasing.
    pub fn from_edges(edges: &[f64]) -> Result<Self> {
        validate_edges(edges)?;
        Ok(Self {
            edges: Arc::from(edges),
        })
    }

    /// Copies the edges of an existing histogram.
    #[must_use]
    pub fn from_reference(histogram: &Histogram) -> Self {
        histogram.bins().clone()
    }

    /// Re-checks the schema invariants: at least two finite, strictly
    /// increasing edges.
    ///
    /// # Errors
    /// Returns [`Error::EmptyBinSpec`] or [`Error::InvalidBinning`].
    pub fn validate(&self) -> Result<()> {
        validate_edges(&self.edges)
    }

    fn from_generated(edges: Vec<f64>) -> Self {
        debug_assert!(validate_edges(&edges).is_ok());
        Self {
            edges: Arc::from(edges),
        }
    }

    /// Returns the bin edges.
    #[must_use]
    #[inline]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Returns the number of bins (`edges.len() - 1`).
    #[must_use]
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Returns `(first edge, last edge)`.
    #[must_use]
    pub fn range(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    /// Returns the width of bin `index`.
    #[must_use]
    #[inline]
    pub fn width(&self, index: usize) -> f64 {
        self.edges[index + 1] - self.edges[index]
    }

    /// Returns the centre of bin `index`.
    #[must_use]
    #[inline]
    pub fn center(&self, index: usize) -> f64 {
        0.5 * (self.edges[index] + self.edges[index + 1])
    }

    /// Returns the centres of all bins.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Locates the bin containing `x` by binary search.
    ///
    /// Bins are half-open `[lo, hi)`, so the last edge itself is outside the
    /// schema. Returns `None` for out-of-range and NaN values.
    #[must_use]
    #[inline]
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        let (low, high) = self.range();
        if !(x >= low && x < high) {
            return None;
        }
        Some(self.edges.partition_point(|&edge| edge <= x) - 1)
    }

    /// Returns true when both schemas have the same edges, compared with a
    /// relative tolerance of `1e-10`.
    #[must_use]
    pub fn matches(&self, other: &BinSpec) -> bool {
        if Arc::ptr_eq(&self.edges, &other.edges) {
            return true;
        }
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(other.edges.iter())
                .all(|(&a, &b)| a == b || (a - b).abs() <= MATCH_TOLERANCE * a.abs().max(b.abs()))
    }
}

impl PartialEq for BinSpec {
    fn eq(&self, other: &Self) -> bool {
        self.edges == other.edges
    }
}

impl TryFrom<Vec<f64>> for BinSpec {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        validate_edges(&edges)?;
        Ok(Self {
            edges: Arc::from(edges),
        })
    }
}

impl From<BinSpec> for Vec<f64> {
    fn from(bins: BinSpec) -> Self {
        bins.edges.to_vec()
    }
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::EmptyBinSpec { edges: edges.len() });
    }
    if let Some(index) = edges.iter().position(|edge| !edge.is_finite()) {
        return Err(Error::invalid_binning(format!(
            "edge {index} is not finite ({})",
            edges[index]
        )));
    }
    if let Some(index) = edges.windows(2).position(|pair| pair[0] >= pair[1]) {
        return Err(Error::invalid_binning(format!(
            "edges must be strictly increasing: edge {index} ({}) >= edge {} ({})",
            edges[index],
            index + 1,
            edges[index + 1]
        )));
    }
    Ok(())
}

fn check_range(low: f64, step: f64, high: f64) -> Result<()> {
    if !(low.is_finite() && step.is_finite() && high.is_finite()) {
        return Err(Error::invalid_binning(format!(
            "range ({low}, {step}, {high}) contains a non-finite value"
        )));
    }
    if step <= 0.0 {
        return Err(Error::invalid_binning(format!(
            "step must be positive, got {step}"
        )));
    }
    if high <= low {
        return Err(Error::invalid_binning(format!(
            "range upper bound {high} must exceed lower bound {low}"
        )));
    }
    Ok(())
}

fn check_bin_budget(estimated: f64, existing: usize) -> Result<()> {
    #[allow(clippy::cast_precision_loss)]
    let limit = (MAX_BINS - existing.min(MAX_BINS)) as f64;
    if estimated > limit {
        return Err(Error::invalid_binning(format!(
            "binning would produce more than {MAX_BINS} bins"
        )));
    }
    Ok(())
}

/// Appends the edges after `low` up to and including `high`.
/// `edges` must already end with `low`.
fn push_linear_range(edges: &mut Vec<f64>, low: f64, step: f64, high: f64) -> Result<()> {
    check_range(low, step, high)?;
    check_bin_budget((high - low) / step, edges.len())?;

    let tolerance = step * EDGE_MERGE_TOLERANCE;
    let mut k = 1u32;
    loop {
        let edge = low + f64::from(k) * step;
        if edge >= high - tolerance {
            break;
        }
        push_increasing(edges, edge)?;
        k += 1;
    }
    push_increasing(edges, high)
}

fn push_log_range(edges: &mut Vec<f64>, low: f64, step: f64, high: f64) -> Result<()> {
    check_range(low, step, high)?;
    if low <= 0.0 {
        return Err(Error::invalid_binning(format!(
            "logarithmic binning needs a positive lower bound, got {low}"
        )));
    }
    let factor = 1.0 + step;
    check_bin_budget((high / low).ln() / factor.ln(), edges.len())?;

    let mut current = low;
    loop {
        let edge = current * factor;
        if edge >= high - (edge - current) * EDGE_MERGE_TOLERANCE {
            break;
        }
        push_increasing(edges, edge)?;
        current = edge;
    }
    push_increasing(edges, high)
}

fn push_increasing(edges: &mut Vec<f64>, edge: f64) -> Result<()> {
    match edges.last() {
        Some(&last) if edge <= last => Err(Error::invalid_binning(format!(
            "step too small to resolve edges near {last}"
        ))),
        _ => {
            edges.push(edge);
            Ok(())
        }
    }
}
