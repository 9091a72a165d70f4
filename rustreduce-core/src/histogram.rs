//! Histograms with per-bin uncertainties.

use crate::binning::BinSpec;
use crate::error::{Error, Result};

/// Counts and standard deviations over a [`BinSpec`].
///
/// Invariants: `counts.len() == errors.len() == bins.n_bins()` and every
/// error is finite and non-negative. Counts may be negative (after a
/// background subtraction, for instance).
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bins: BinSpec,
    counts: Vec<f64>,
    errors: Vec<f64>,
    /// Accumulated exposure (proton charge, monitor integral).
    normalization: Option<f64>,
}

impl Histogram {
    /// Creates a histogram from explicit counts and errors.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the array lengths disagree with the
    /// bins or any error is negative or non-finite.
    pub fn new(bins: BinSpec, counts: Vec<f64>, errors: Vec<f64>) -> Result<Self> {
        let n_bins = bins.n_bins();
        if counts.len() != n_bins || errors.len() != n_bins {
            return Err(Error::ShapeMismatch(format!(
                "{} bins but {} counts and {} errors",
                n_bins,
                counts.len(),
                errors.len()
            )));
        }
        if let Some(index) = errors.iter().position(|e| !(e.is_finite() && *e >= 0.0)) {
            return Err(Error::ShapeMismatch(format!(
                "error at bin {index} must be finite and non-negative, got {}",
                errors[index]
            )));
        }
        Ok(Self {
            bins,
            counts,
            errors,
            normalization: None,
        })
    }

    /// Creates an empty histogram.
    #[must_use]
    pub fn zeros(bins: BinSpec) -> Self {
        let n_bins = bins.n_bins();
        Self {
            bins,
            counts: vec![0.0; n_bins],
            errors: vec![0.0; n_bins],
            normalization: None,
        }
    }

    /// Creates a histogram of raw counts with Poisson errors `sqrt(count)`.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `counts` does not have one value per bin.
    pub fn from_counts(bins: BinSpec, counts: Vec<f64>) -> Result<Self> {
        let errors = counts.iter().map(|&c| c.max(0.0).sqrt()).collect();
        Self::new(bins, counts, errors)
    }

    /// Sets the accumulated exposure carried with the histogram.
    #[must_use]
    pub fn with_normalization(mut self, normalization: f64) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Sets or clears the accumulated exposure.
    pub fn set_normalization(&mut self, normalization: Option<f64>) {
        self.normalization = normalization;
    }

    /// Returns the accumulated exposure, if any.
    #[must_use]
    #[inline]
    pub fn normalization(&self) -> Option<f64> {
        self.normalization
    }

    /// Returns the bin schema.
    #[must_use]
    #[inline]
    pub fn bins(&self) -> &BinSpec {
        &self.bins
    }

    /// Returns the bin edges.
    #[must_use]
    #[inline]
    pub fn edges(&self) -> &[f64] {
        self.bins.edges()
    }

    /// Returns the per-bin counts.
    #[must_use]
    #[inline]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Returns the per-bin standard deviations.
    #[must_use]
    #[inline]
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Mutable access to counts and errors together.
    ///
    /// Callers must keep every error finite and non-negative.
    #[inline]
    pub fn values_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.counts, &mut self.errors)
    }

    /// Returns the bin centres.
    #[must_use]
    pub fn bin_centers(&self) -> Vec<f64> {
        self.bins.centers()
    }

    /// Returns the number of bins.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if the histogram has no bins.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total_counts(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Quadrature sum of all errors.
    #[must_use]
    pub fn total_error(&self) -> f64 {
        self.errors.iter().map(|e| e * e).sum::<f64>().sqrt()
    }

    /// Integrates counts over `[low, high)`, apportioning partially covered
    /// bins by overlap fraction.
    ///
    /// Returns `(integral, error)`; an empty or inverted interval gives zero.
    #[must_use]
    pub fn integrate(&self, low: f64, high: f64) -> (f64, f64) {
        if !(high > low) {
            return (0.0, 0.0);
        }
        let mut sum = 0.0;
        let mut variance = 0.0;
        for (i, window) in self.edges().windows(2).enumerate() {
            let (a, b) = (window[0], window[1]);
            if b <= low {
                continue;
            }
            if a >= high {
                break;
            }
            let fraction = (b.min(high) - a.max(low)) / (b - a);
            sum += self.counts[i] * fraction;
            variance += self.errors[i] * self.errors[i] * fraction * fraction;
        }
        (sum, variance.sqrt())
    }

    /// Subtracts `other` bin-wise, adding errors in quadrature.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleBinning`] if the bins differ.
    pub fn subtract(&mut self, other: &Histogram) -> Result<()> {
        self.ensure_matching(other, "subtrahend")?;
        for i in 0..self.counts.len() {
            self.counts[i] -= other.counts[i];
            self.errors[i] = self.errors[i].hypot(other.errors[i]);
        }
        Ok(())
    }

    /// Divides by `other` bin-wise with ratio error propagation:
    /// `e^2 = (e1 / y2)^2 + (y1 * e2 / y2^2)^2`.
    ///
    /// Nothing is modified when an error is returned.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleBinning`] if the bins differ and
    /// [`Error::DivisionByZero`] if any bin of `other` is exactly zero.
    pub fn divide(&mut self, other: &Histogram) -> Result<()> {
        self.ensure_matching(other, "divisor")?;
        if let Some(index) = other.counts.iter().position(|&c| c == 0.0) {
            return Err(Error::DivisionByZero {
                context: format!("divisor bin {index} is zero"),
            });
        }
        for i in 0..self.counts.len() {
            let (y1, e1) = (self.counts[i], self.errors[i]);
            let (y2, e2) = (other.counts[i], other.errors[i]);
            self.counts[i] = y1 / y2;
            self.errors[i] = (e1 / y2).hypot(y1 * e2 / (y2 * y2));
        }
        Ok(())
    }

    fn ensure_matching(&self, other: &Histogram, role: &str) -> Result<()> {
        if self.bins.matches(&other.bins) {
            Ok(())
        } else {
            let (low, high) = self.bins.range();
            let (other_low, other_high) = other.bins.range();
            Err(Error::IncompatibleBinning {
                context: format!(
                    "{role} has {} bins over [{other_low}, {other_high}], expected {} bins over [{low}, {high}]",
                    other.len(),
                    self.len()
                ),
            })
        }
    }

    /// Splits the histogram into its bins, counts and errors.
    #[must_use]
    pub fn into_parts(self) -> (BinSpec, Vec<f64>, Vec<f64>) {
        (self.bins, self.counts, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn bins() -> BinSpec {
        BinSpec::from_edges(&[0.0, 1.0, 2.0, 4.0]).unwrap()
    }

    #[test]
    fn test_new_validates_shape() {
        assert!(Histogram::new(bins(), vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0]).is_ok());
        assert!(matches!(
            Histogram::new(bins(), vec![1.0, 2.0], vec![1.0, 1.0]),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(matches!(
            Histogram::new(bins(), vec![1.0, 2.0, 3.0], vec![1.0, -1.0, 1.0]),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(matches!(
            Histogram::new(bins(), vec![1.0, 2.0, 3.0], vec![1.0, f64::NAN, 1.0]),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_from_counts_poisson_errors() {
        let hist = Histogram::from_counts(bins(), vec![4.0, 0.0, 9.0]).unwrap();
        assert_eq!(hist.errors(), &[2.0, 0.0, 3.0]);
        assert_relative_eq!(hist.total_counts(), 13.0);
        assert_relative_eq!(hist.total_error(), 13.0_f64.sqrt());
    }

    #[test]
    fn test_reference_bins_are_shared() {
        let hist = Histogram::zeros(bins());
        let copy = BinSpec::from_reference(&hist);
        assert_eq!(copy.edges(), hist.edges());
        assert!(copy.matches(hist.bins()));
    }

    #[test]
    fn test_integrate_fractional() {
        let hist = Histogram::new(bins(), vec![2.0, 4.0, 8.0], vec![2.0, 2.0, 4.0]).unwrap();
        let (total, _) = hist.integrate(0.0, 4.0);
        assert_relative_eq!(total, 14.0);

        // Half of bin 0, all of bin 1, a quarter of bin 2.
        let (partial, error) = hist.integrate(0.5, 2.5);
        assert_relative_eq!(partial, 1.0 + 4.0 + 2.0);
        assert_relative_eq!(error, (1.0_f64 + 4.0 + 1.0).sqrt());

        assert_eq!(hist.integrate(3.0, 1.0), (0.0, 0.0));
        assert_eq!(hist.integrate(10.0, 20.0), (0.0, 0.0));
    }

    #[test]
    fn test_subtract() {
        let mut sample = Histogram::new(bins(), vec![10.0, 8.0, 6.0], vec![3.0, 3.0, 3.0]).unwrap();
        let background = Histogram::new(bins(), vec![1.0, 2.0, 3.0], vec![4.0, 4.0, 4.0]).unwrap();
        sample.subtract(&background).unwrap();
        assert_eq!(sample.counts(), &[9.0, 6.0, 3.0]);
        for &error in sample.errors() {
            assert_relative_eq!(error, 5.0);
        }
    }

    #[test]
    fn test_subtract_incompatible() {
        let mut sample = Histogram::zeros(bins());
        let other = Histogram::zeros(BinSpec::from_edges(&[0.0, 1.0, 2.0, 5.0]).unwrap());
        assert!(matches!(
            sample.subtract(&other),
            Err(Error::IncompatibleBinning { .. })
        ));
    }

    #[test]
    fn test_divide_ratio_errors() {
        let mut numerator =
            Histogram::new(bins(), vec![10.0, 0.0, 6.0], vec![1.0, 1.0, 0.6]).unwrap();
        let denominator =
            Histogram::new(bins(), vec![5.0, 2.0, 3.0], vec![0.5, 0.1, 0.0]).unwrap();
        numerator.divide(&denominator).unwrap();

        assert_eq!(numerator.counts(), &[2.0, 0.0, 2.0]);
        // rel(y)^2 = rel(y1)^2 + rel(y2)^2 where y1 != 0
        assert_relative_eq!(
            numerator.errors()[0],
            2.0 * (0.1_f64.powi(2) + 0.1_f64.powi(2)).sqrt(),
            max_relative = 1e-12
        );
        // Zero numerator keeps the numerator's own contribution.
        assert_relative_eq!(numerator.errors()[1], 0.5);
        assert_abs_diff_eq!(numerator.errors()[2], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_divide_by_zero_leaves_histogram_untouched() {
        let mut numerator = Histogram::from_counts(bins(), vec![1.0, 2.0, 3.0]).unwrap();
        let before = numerator.clone();
        let denominator = Histogram::from_counts(bins(), vec![1.0, 0.0, 3.0]).unwrap();
        assert!(matches!(
            numerator.divide(&denominator),
            Err(Error::DivisionByZero { .. })
        ));
        assert_eq!(numerator, before);
    }

    #[test]
    fn test_normalization_carried() {
        let hist = Histogram::zeros(bins()).with_normalization(12.5);
        assert_eq!(hist.normalization(), Some(12.5));
        let mut hist = hist;
        hist.set_normalization(None);
        assert_eq!(hist.normalization(), None);
    }
}
