//! Per-bin detector and normalization corrections.
//!
//! Every correction scales each bin by a factor evaluated at the bin centre
//! (or by one scalar) and propagates the same scaling into the errors.
//! All results are computed and checked before any bin is touched, so a
//! failing correction leaves the histogram as it was.

use rustreduce_core::{Error, Histogram, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// [`Correction::OneMinusExponential`] factors with magnitude below this are
/// treated as zero when dividing.
pub const SINGULAR_THRESHOLD: f64 = 1e-12;

/// Whether a correction factor multiplies or divides the counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Operation {
    /// `counts * factor`
    #[default]
    Multiply,
    /// `counts / factor`
    Divide,
}

impl Operation {
    /// Returns the operation that undoes this one.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Multiply => Self::Divide,
            Self::Divide => Self::Multiply,
        }
    }
}

#[cfg(feature = "serde")]
fn one() -> f64 {
    1.0
}

#[cfg(feature = "serde")]
fn divide() -> Operation {
    Operation::Divide
}

/// A named correction with its coefficients.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Correction {
    /// Factor `c0 * exp(-c1 * x)`.
    ExponentialAttenuation {
        /// Prefactor.
        #[cfg_attr(feature = "serde", serde(default = "one"))]
        c0: f64,
        /// Attenuation coefficient.
        c1: f64,
        /// Multiply or divide.
        #[cfg_attr(feature = "serde", serde(default))]
        operation: Operation,
    },
    /// Factor `c1 * (1 - exp(-c * x))`, usually a detector efficiency.
    OneMinusExponential {
        /// Exponent coefficient.
        c: f64,
        /// Prefactor.
        #[cfg_attr(feature = "serde", serde(default = "one"))]
        c1: f64,
        /// Multiply or divide (divide by default).
        #[cfg_attr(feature = "serde", serde(default = "divide"))]
        operation: Operation,
    },
    /// Factor `sum(coefficients[k] * x^k)`.
    Polynomial {
        /// Coefficients, constant term first.
        coefficients: Vec<f64>,
        /// Multiply or divide.
        #[cfg_attr(feature = "serde", serde(default))]
        operation: Operation,
    },
    /// Factor `c0 * x^c1`.
    PowerLaw {
        /// Prefactor.
        c0: f64,
        /// Exponent.
        c1: f64,
        /// Multiply or divide.
        #[cfg_attr(feature = "serde", serde(default))]
        operation: Operation,
    },
    /// One scalar for every bin (sample thickness, monitor integral),
    /// optionally with its own standard deviation.
    NormaliseByScalar {
        /// The scalar.
        value: f64,
        /// Standard deviation of the scalar.
        #[cfg_attr(feature = "serde", serde(default))]
        error: f64,
        /// Multiply or divide (divide by default).
        #[cfg_attr(feature = "serde", serde(default = "divide"))]
        operation: Operation,
    },
    /// Divide by the histogram's own normalization (proton charge).
    NormaliseByCurrent,
}

impl Correction {
    /// Exponential attenuation `exp(-c1 * x)`.
    #[must_use]
    pub fn exponential(c1: f64, operation: Operation) -> Self {
        Self::ExponentialAttenuation {
            c0: 1.0,
            c1,
            operation,
        }
    }

    /// Efficiency correction: divide by `1 - exp(-c * x)`.
    #[must_use]
    pub fn one_minus_exponential(c: f64) -> Self {
        Self::OneMinusExponential {
            c,
            c1: 1.0,
            operation: Operation::Divide,
        }
    }

    /// Polynomial correction, multiplying by default.
    #[must_use]
    pub fn polynomial(coefficients: Vec<f64>) -> Self {
        Self::Polynomial {
            coefficients,
            operation: Operation::Multiply,
        }
    }

    /// Exact scalar normalization.
    #[must_use]
    pub fn scalar(value: f64, operation: Operation) -> Self {
        Self::NormaliseByScalar {
            value,
            error: 0.0,
            operation,
        }
    }

    /// Short name used in error messages and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExponentialAttenuation { .. } => "ExponentialAttenuation",
            Self::OneMinusExponential { .. } => "OneMinusExponential",
            Self::Polynomial { .. } => "Polynomial",
            Self::PowerLaw { .. } => "PowerLaw",
            Self::NormaliseByScalar { .. } => "NormaliseByScalar",
            Self::NormaliseByCurrent => "NormaliseByCurrent",
        }
    }

    /// Returns the operation this correction applies.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::ExponentialAttenuation { operation, .. }
            | Self::OneMinusExponential { operation, .. }
            | Self::Polynomial { operation, .. }
            | Self::PowerLaw { operation, .. }
            | Self::NormaliseByScalar { operation, .. } => *operation,
            Self::NormaliseByCurrent => Operation::Divide,
        }
    }

    /// Returns the same correction with the opposite operation.
    ///
    /// [`Correction::NormaliseByCurrent`] has no inverse and is returned as is.
    #[must_use]
    pub fn inverted(&self) -> Self {
        let mut inverse = self.clone();
        match &mut inverse {
            Self::ExponentialAttenuation { operation, .. }
            | Self::OneMinusExponential { operation, .. }
            | Self::Polynomial { operation, .. }
            | Self::PowerLaw { operation, .. }
            | Self::NormaliseByScalar { operation, .. } => *operation = operation.inverse(),
            Self::NormaliseByCurrent => {}
        }
        inverse
    }

    /// Evaluates the bin-dependent factor at `x`.
    ///
    /// Scalar corrections return `None`.
    #[must_use]
    pub fn factor_at(&self, x: f64) -> Option<f64> {
        match self {
            Self::ExponentialAttenuation { c0, c1, .. } => Some(c0 * (-c1 * x).exp()),
            // exp_m1 keeps precision when c * x is small.
            Self::OneMinusExponential { c, c1, .. } => Some(-c1 * (-c * x).exp_m1()),
            Self::Polynomial { coefficients, .. } => Some(horner(coefficients, x)),
            Self::PowerLaw { c0, c1, .. } => Some(c0 * x.powf(*c1)),
            Self::NormaliseByScalar { .. } | Self::NormaliseByCurrent => None,
        }
    }

    /// Returns true if every coefficient is finite.
    #[must_use]
    pub fn has_finite_coefficients(&self) -> bool {
        match self {
            Self::ExponentialAttenuation { c0, c1, .. } | Self::PowerLaw { c0, c1, .. } => {
                c0.is_finite() && c1.is_finite()
            }
            Self::OneMinusExponential { c, c1, .. } => c.is_finite() && c1.is_finite(),
            Self::Polynomial { coefficients, .. } => coefficients.iter().all(|c| c.is_finite()),
            Self::NormaliseByScalar { value, error, .. } => value.is_finite() && error.is_finite(),
            Self::NormaliseByCurrent => true,
        }
    }

    /// Applies the correction in place.
    ///
    /// # Errors
    /// Returns [`Error::SingularCorrection`] when a divisor factor is zero
    /// (within [`SINGULAR_THRESHOLD`] for [`Correction::OneMinusExponential`]),
    /// or when a factor or any corrected count or error is non-finite, and
    /// [`Error::DivisionByZero`] when a scalar divisor is exactly zero or
    /// [`Correction::NormaliseByCurrent`] finds no usable normalization.
    pub fn apply_in_place(&self, histogram: &mut Histogram) -> Result<()> {
        match self {
            Self::NormaliseByScalar {
                value,
                error,
                operation,
            } => apply_scalar(histogram, self.name(), *value, *error, *operation),
            Self::NormaliseByCurrent => {
                let charge = histogram.normalization().ok_or_else(|| Error::DivisionByZero {
                    context: "NormaliseByCurrent: histogram carries no normalization".to_string(),
                })?;
                apply_scalar(histogram, self.name(), charge, 0.0, Operation::Divide)?;
                histogram.set_normalization(Some(1.0));
                Ok(())
            }
            _ => self.apply_binwise(histogram),
        }
    }

    /// Applies the correction, returning the updated histogram.
    ///
    /// # Errors
    /// See [`Correction::apply_in_place`].
    pub fn apply(&self, mut histogram: Histogram) -> Result<Histogram> {
        self.apply_in_place(&mut histogram)?;
        Ok(histogram)
    }

    /// Whether `factor` cannot be divided out. Only the efficiency term has
    /// a tolerance; the other factors fail on an exact zero.
    fn is_singular_divisor(&self, factor: f64) -> bool {
        match self {
            Self::OneMinusExponential { .. } => factor.abs() < SINGULAR_THRESHOLD,
            _ => factor == 0.0,
        }
    }

    fn apply_binwise(&self, histogram: &mut Histogram) -> Result<()> {
        let operation = self.operation();
        let centers = histogram.bin_centers();
        let mut counts = Vec::with_capacity(centers.len());
        let mut errors = Vec::with_capacity(centers.len());
        for (bin, &x) in centers.iter().enumerate() {
            let factor = self.factor_at(x).unwrap_or(f64::NAN);
            let (y, e) = (histogram.counts()[bin], histogram.errors()[bin]);
            let (count, error) = match operation {
                Operation::Multiply => (y * factor, e * factor.abs()),
                Operation::Divide if self.is_singular_divisor(factor) => (f64::NAN, f64::NAN),
                Operation::Divide => (y / factor, e / factor.abs()),
            };
            if !(factor.is_finite() && count.is_finite() && error.is_finite()) {
                return Err(Error::SingularCorrection {
                    correction: self.name(),
                    bin,
                    x,
                });
            }
            counts.push(count);
            errors.push(error);
        }

        let (target_counts, target_errors) = histogram.values_mut();
        target_counts.copy_from_slice(&counts);
        target_errors.copy_from_slice(&errors);
        Ok(())
    }
}

/// Evaluates `sum(coefficients[k] * x^k)` by Horner's method.
#[must_use]
pub fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

fn apply_scalar(
    histogram: &mut Histogram,
    name: &'static str,
    value: f64,
    value_error: f64,
    operation: Operation,
) -> Result<()> {
    if operation == Operation::Divide && value == 0.0 {
        return Err(Error::DivisionByZero {
            context: format!("{name}: scalar divisor is zero"),
        });
    }
    if !(value.is_finite() && value_error.is_finite()) {
        return Err(Error::SingularCorrection {
            correction: name,
            bin: 0,
            x: value,
        });
    }

    let mut counts = Vec::with_capacity(histogram.len());
    let mut errors = Vec::with_capacity(histogram.len());
    for (bin, (&y, &e)) in histogram.counts().iter().zip(histogram.errors()).enumerate() {
        let (count, error) = match operation {
            Operation::Multiply => (y * value, (e * value).hypot(y * value_error)),
            Operation::Divide => (
                y / value,
                (e / value).hypot(y * value_error / (value * value)),
            ),
        };
        if !(count.is_finite() && error.is_finite()) {
            return Err(Error::SingularCorrection {
                correction: name,
                bin,
                x: histogram.bin_centers()[bin],
            });
        }
        counts.push(count);
        errors.push(error);
    }

    let (target_counts, target_errors) = histogram.values_mut();
    target_counts.copy_from_slice(&counts);
    target_errors.copy_from_slice(&errors);
    Ok(())
}

/// An ordered list of corrections applied one after another.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CorrectionPipeline {
    corrections: Vec<Correction>,
}

impl CorrectionPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a correction.
    pub fn push(&mut self, correction: Correction) {
        self.corrections.push(correction);
    }

    /// Appends a correction, builder style.
    #[must_use]
    pub fn with(mut self, correction: Correction) -> Self {
        self.corrections.push(correction);
        self
    }

    /// Returns the corrections in application order.
    #[must_use]
    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    /// Number of corrections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    /// Returns true if the pipeline has no corrections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Applies every correction in order.
    ///
    /// # Errors
    /// Stops at, and returns, the first failing correction's error.
    pub fn apply(&self, mut histogram: Histogram) -> Result<Histogram> {
        for correction in &self.corrections {
            correction.apply_in_place(&mut histogram)?;
        }
        Ok(histogram)
    }
}

impl FromIterator<Correction> for CorrectionPipeline {
    fn from_iter<I: IntoIterator<Item = Correction>>(iter: I) -> Self {
        Self {
            corrections: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Correction>> for CorrectionPipeline {
    fn from(corrections: Vec<Correction>) -> Self {
        Self { corrections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rustreduce_core::BinSpec;

    fn histogram() -> Histogram {
        Histogram::new(
            BinSpec::from_edges(&[0.0, 1.0, 2.0, 4.0]).unwrap(),
            vec![10.0, 20.0, 30.0],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap()
    }

    #[test]
    fn test_horner() {
        assert_relative_eq!(horner(&[1.0, 2.0, 3.0], 2.0), 17.0);
        assert_relative_eq!(horner(&[], 5.0), 0.0);
        assert_relative_eq!(horner(&[4.0], 5.0), 4.0);
    }

    #[test]
    fn test_exponential_multiply() {
        let out = Correction::exponential(0.5, Operation::Multiply)
            .apply(histogram())
            .unwrap();
        let centers: [f64; 3] = [0.5, 1.5, 3.0];
        for i in 0..3 {
            let factor = (-0.5 * centers[i]).exp();
            assert_relative_eq!(out.counts()[i], histogram().counts()[i] * factor);
            assert_relative_eq!(out.errors()[i], histogram().errors()[i] * factor);
        }
    }

    #[test]
    fn test_one_minus_exponential_divides() {
        let out = Correction::one_minus_exponential(2.0).apply(histogram()).unwrap();
        let factor = 1.0 - (-2.0_f64 * 0.5).exp();
        assert_relative_eq!(out.counts()[0], 10.0 / factor, max_relative = 1e-14);
        assert_relative_eq!(out.errors()[0], 1.0 / factor, max_relative = 1e-14);
    }

    #[test]
    fn test_one_minus_exponential_zero_is_singular() {
        let err = Correction::one_minus_exponential(0.0)
            .apply(histogram())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SingularCorrection {
                correction: "OneMinusExponential",
                bin: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_correction_leaves_histogram_untouched() {
        // Bin centre 0 makes only the first factor singular.
        let mut hist = Histogram::from_counts(
            BinSpec::from_edges(&[-1.0, 1.0, 2.0]).unwrap(),
            vec![4.0, 9.0],
        )
        .unwrap();
        let before = hist.clone();
        assert!(Correction::one_minus_exponential(1.0)
            .apply_in_place(&mut hist)
            .is_err());
        assert_eq!(hist, before);
    }

    #[test]
    fn test_exponential_divide_tiny_factor() {
        // exp(-0.03 * 1000) is about 9.4e-14.
        let hist = Histogram::new(
            BinSpec::from_edges(&[999.0, 1001.0]).unwrap(),
            vec![5.0],
            vec![2.0],
        )
        .unwrap();
        let there = Correction::exponential(0.03, Operation::Multiply)
            .apply(hist.clone())
            .unwrap();
        assert!(there.counts()[0] < SINGULAR_THRESHOLD);
        let back = Correction::exponential(0.03, Operation::Divide)
            .apply(there)
            .unwrap();
        assert_relative_eq!(back.counts()[0], 5.0, max_relative = 1e-12);
        assert_relative_eq!(back.errors()[0], 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_small_constant_divisor() {
        let correction = Correction::Polynomial {
            coefficients: vec![1e-13],
            operation: Operation::Divide,
        };
        let out = correction.apply(histogram()).unwrap();
        assert_relative_eq!(out.counts()[0], 1e14, max_relative = 1e-12);

        // The efficiency term keeps its tolerance.
        assert!(matches!(
            Correction::one_minus_exponential(1e-15).apply(histogram()),
            Err(Error::SingularCorrection { bin: 0, .. })
        ));
    }

    #[test]
    fn test_overflow_is_singular() {
        let mut hist = Histogram::new(
            BinSpec::from_edges(&[999.0, 1001.0]).unwrap(),
            vec![1e6],
            vec![1e3],
        )
        .unwrap();
        let before = hist.clone();
        // exp(700) is finite but the product is not.
        let err = Correction::exponential(-0.7, Operation::Multiply)
            .apply_in_place(&mut hist)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SingularCorrection {
                correction: "ExponentialAttenuation",
                bin: 0,
                ..
            }
        ));
        assert_eq!(hist, before);

        let mut large = Histogram::new(
            BinSpec::from_edges(&[0.0, 1.0, 2.0]).unwrap(),
            vec![1.0, 1e300],
            vec![1.0, 1e299],
        )
        .unwrap();
        let before = large.clone();
        let err = Correction::scalar(1e10, Operation::Multiply)
            .apply_in_place(&mut large)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SingularCorrection {
                correction: "NormaliseByScalar",
                bin: 1,
                ..
            }
        ));
        assert_eq!(large, before);
    }

    #[test]
    fn test_polynomial_constant_one_is_identity() {
        let out = Correction::polynomial(vec![1.0, 0.0])
            .apply(histogram())
            .unwrap();
        assert_eq!(out.counts(), histogram().counts());
        assert_eq!(out.errors(), histogram().errors());
    }

    #[test]
    fn test_polynomial_divide_by_root_is_singular() {
        // 1 - x vanishes at the centre of the first bin [0.5, 1.5).
        let hist = Histogram::zeros(BinSpec::from_edges(&[0.5, 1.5, 2.5]).unwrap());
        let correction = Correction::Polynomial {
            coefficients: vec![1.0, -1.0],
            operation: Operation::Divide,
        };
        assert!(matches!(
            correction.apply(hist),
            Err(Error::SingularCorrection { bin: 0, .. })
        ));
    }

    #[test]
    fn test_power_law() {
        let correction = Correction::PowerLaw {
            c0: 2.0,
            c1: 2.0,
            operation: Operation::Multiply,
        };
        let out = correction.apply(histogram()).unwrap();
        assert_relative_eq!(out.counts()[2], 30.0 * 2.0 * 9.0);

        // x^-1 at a zero bin centre is infinite.
        let singular = Correction::PowerLaw {
            c0: 1.0,
            c1: -1.0,
            operation: Operation::Multiply,
        };
        let hist = Histogram::zeros(BinSpec::from_edges(&[-1.0, 1.0]).unwrap());
        assert!(matches!(
            singular.apply(hist),
            Err(Error::SingularCorrection { .. })
        ));
    }

    #[test]
    fn test_scalar_normalisation() {
        let out = Correction::scalar(2.0, Operation::Divide)
            .apply(histogram())
            .unwrap();
        assert_eq!(out.counts(), &[5.0, 10.0, 15.0]);
        assert_eq!(out.errors(), &[0.5, 1.0, 1.5]);

        assert!(matches!(
            Correction::scalar(0.0, Operation::Divide).apply(histogram()),
            Err(Error::DivisionByZero { .. })
        ));
        let zeroed = Correction::scalar(0.0, Operation::Multiply)
            .apply(histogram())
            .unwrap();
        assert_relative_eq!(zeroed.total_counts(), 0.0);
    }

    #[test]
    fn test_scalar_with_uncertainty() {
        let correction = Correction::NormaliseByScalar {
            value: 4.0,
            error: 0.4,
            operation: Operation::Divide,
        };
        let out = correction.apply(histogram()).unwrap();
        // rel^2 = (1/10)^2 + (0.4/4)^2
        assert_relative_eq!(out.counts()[0], 2.5);
        assert_relative_eq!(out.errors()[0], 2.5 * 0.02_f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_normalise_by_current() {
        let out = Correction::NormaliseByCurrent
            .apply(histogram().with_normalization(10.0))
            .unwrap();
        assert_eq!(out.counts(), &[1.0, 2.0, 3.0]);
        assert_eq!(out.normalization(), Some(1.0));

        assert!(matches!(
            Correction::NormaliseByCurrent.apply(histogram()),
            Err(Error::DivisionByZero { .. })
        ));
        assert!(matches!(
            Correction::NormaliseByCurrent.apply(histogram().with_normalization(0.0)),
            Err(Error::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_inverted_round_trip() {
        for correction in [
            Correction::exponential(0.3, Operation::Multiply),
            Correction::one_minus_exponential(1.5),
            Correction::polynomial(vec![2.0, 0.5, 0.1]),
            Correction::scalar(7.5, Operation::Multiply),
        ] {
            let out = correction
                .apply(histogram())
                .and_then(|h| correction.inverted().apply(h))
                .unwrap();
            for i in 0..3 {
                assert_relative_eq!(out.counts()[i], histogram().counts()[i], max_relative = 1e-12);
                assert_relative_eq!(out.errors()[i], histogram().errors()[i], max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_pipeline_order() {
        let pipeline = CorrectionPipeline::new()
            .with(Correction::scalar(2.0, Operation::Multiply))
            .with(Correction::polynomial(vec![1.0, 1.0]));
        assert_eq!(pipeline.len(), 2);
        let out = pipeline.apply(histogram()).unwrap();
        // (10 * 2) * (1 + 0.5)
        assert_relative_eq!(out.counts()[0], 30.0);

        let empty = CorrectionPipeline::new();
        assert!(empty.is_empty());
        assert_eq!(empty.apply(histogram()).unwrap(), histogram());
    }
}
