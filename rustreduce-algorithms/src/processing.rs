//! Reduction orchestration: bin, correct, subtract background, normalize.
//!
//! The per-spectrum steps are:
//!
//! 1. Bin events with [`accumulate`], or [`rebin`] an existing histogram.
//! 2. Apply each correction of the [`CorrectionPipeline`] in order.
//! 3. Subtract the background histogram, if any.
//! 4. Divide by the reference histogram, if any.
//!
//! Each spectrum is independent; [`Reduction::reduce_spectra`] runs them on
//! the rayon pool and collects per-spectrum failures instead of aborting.

use rayon::prelude::*;
use rustreduce_core::{BinSpec, Error, Event, Histogram, Result};

use crate::accumulate::accumulate;
use crate::correction::{Correction, CorrectionPipeline};
use crate::rebin::rebin;

/// Raw input for one spectrum.
#[derive(Debug, Clone)]
pub enum ReductionInput {
    /// Unbinned events.
    Events(Vec<Event>),
    /// An existing histogram, rebinned onto the target bins if needed.
    Histogram(Histogram),
}

impl From<Vec<Event>> for ReductionInput {
    fn from(events: Vec<Event>) -> Self {
        Self::Events(events)
    }
}

impl From<Histogram> for ReductionInput {
    fn from(histogram: Histogram) -> Self {
        Self::Histogram(histogram)
    }
}

/// A reusable reduction recipe shared by every spectrum.
#[derive(Debug, Clone)]
pub struct Reduction {
    bins: BinSpec,
    corrections: CorrectionPipeline,
    background: Option<Histogram>,
    reference: Option<Histogram>,
    normalization: Option<f64>,
}

impl Reduction {
    /// Creates a reduction that only bins onto `bins`.
    #[must_use]
    pub fn new(bins: BinSpec) -> Self {
        Self {
            bins,
            corrections: CorrectionPipeline::new(),
            background: None,
            reference: None,
            normalization: None,
        }
    }

    /// Sets the correction pipeline.
    #[must_use]
    pub fn with_corrections(mut self, corrections: CorrectionPipeline) -> Self {
        self.corrections = corrections;
        self
    }

    /// Appends one correction.
    #[must_use]
    pub fn with_correction(mut self, correction: Correction) -> Self {
        self.corrections.push(correction);
        self
    }

    /// Sets the background subtracted after corrections.
    #[must_use]
    pub fn with_background(mut self, background: Histogram) -> Self {
        self.background = Some(background);
        self
    }

    /// Sets the reference spectrum divided out last.
    #[must_use]
    pub fn with_reference(mut self, reference: Histogram) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Sets the exposure attached to histograms binned from events.
    #[must_use]
    pub fn with_normalization(mut self, normalization: f64) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Returns the target bins.
    #[must_use]
    pub fn bins(&self) -> &BinSpec {
        &self.bins
    }

    /// Returns the correction pipeline.
    #[must_use]
    pub fn corrections(&self) -> &CorrectionPipeline {
        &self.corrections
    }

    /// Reduces one spectrum.
    ///
    /// # Errors
    /// Returns the first error raised by any stage; see [`reduce`].
    pub fn reduce(&self, input: ReductionInput) -> Result<Histogram> {
        reduce_with(
            input,
            &self.bins,
            &self.corrections,
            self.background.as_ref(),
            self.reference.as_ref(),
            self.normalization,
        )
    }

    /// Reduces every spectrum on the current rayon pool.
    ///
    /// Run inside [`rayon::ThreadPool::install`] to bound the worker count.
    #[must_use]
    pub fn reduce_spectra(&self, inputs: Vec<ReductionInput>) -> ReductionReport {
        let results: Vec<(usize, Result<Histogram>)> = inputs
            .into_par_iter()
            .enumerate()
            .map(|(index, input)| (index, self.reduce(input)))
            .collect();

        let mut report = ReductionReport::default();
        for (index, result) in results {
            match result {
                Ok(histogram) => report.outputs.push((index, histogram)),
                Err(error) => report.failures.push(SpectrumFailure { index, error }),
            }
        }
        report
    }
}

/// A spectrum that could not be reduced.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFailure {
    /// Position of the spectrum in the input list.
    pub index: usize,
    /// The error that stopped it.
    pub error: Error,
}

/// Outcome of a multi-spectrum reduction, in input order.
#[derive(Debug, Clone, Default)]
pub struct ReductionReport {
    /// Reduced spectra with their input index.
    pub outputs: Vec<(usize, Histogram)>,
    /// Spectra that failed.
    pub failures: Vec<SpectrumFailure>,
}

impl ReductionReport {
    /// Returns true if every spectrum was reduced.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of spectra processed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len() + self.failures.len()
    }

    /// Returns true if no spectra were processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reduces one spectrum with an explicit list of corrections.
///
/// # Errors
/// - [`Error::IncompatibleBinning`] if `background` or `reference` does not
///   share `bins`.
/// - [`Error::EmptyBinSpec`] if `bins` has fewer than two edges.
/// - Any correction error ([`Error::SingularCorrection`], [`Error::DivisionByZero`]).
/// - [`Error::DivisionByZero`] if a reference bin is exactly zero.
pub fn reduce(
    input: ReductionInput,
    bins: &BinSpec,
    corrections: &[Correction],
    background: Option<&Histogram>,
    reference: Option<&Histogram>,
) -> Result<Histogram> {
    let pipeline = CorrectionPipeline::from(corrections.to_vec());
    reduce_with(input, bins, &pipeline, background, reference, None)
}

fn reduce_with(
    input: ReductionInput,
    bins: &BinSpec,
    corrections: &CorrectionPipeline,
    background: Option<&Histogram>,
    reference: Option<&Histogram>,
    normalization: Option<f64>,
) -> Result<Histogram> {
    ensure_shares_bins(background, bins, "background")?;
    ensure_shares_bins(reference, bins, "reference")?;

    let mut histogram = match input {
        ReductionInput::Events(events) => accumulate(&events, bins)?,
        ReductionInput::Histogram(histogram) if histogram.bins().matches(bins) => histogram,
        ReductionInput::Histogram(histogram) => rebin(&histogram, bins)?,
    };
    if histogram.normalization().is_none() {
        histogram.set_normalization(normalization);
    }

    let mut histogram = corrections.apply(histogram)?;

    if let Some(background) = background {
        histogram.subtract(background)?;
    }
    if let Some(reference) = reference {
        histogram.divide(reference)?;
    }
    Ok(histogram)
}

fn ensure_shares_bins(other: Option<&Histogram>, bins: &BinSpec, role: &str) -> Result<()> {
    match other {
        Some(histogram) if !histogram.bins().matches(bins) => Err(Error::IncompatibleBinning {
            context: format!(
                "{role} has {} bins, target binning has {}",
                histogram.len(),
                bins.n_bins()
            ),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::Operation;
    use approx::assert_relative_eq;

    fn bins() -> BinSpec {
        BinSpec::from_linear(0.0, 1.0, 4.0).unwrap()
    }

    #[test]
    fn test_matching_histogram_passes_through() {
        let hist = Histogram::from_counts(bins(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = Reduction::new(bins()).reduce(hist.clone().into()).unwrap();
        assert_eq!(out, hist);
    }

    #[test]
    fn test_normalization_attached_to_events() {
        let out = Reduction::new(bins())
            .with_normalization(2.0)
            .with_correction(Correction::NormaliseByCurrent)
            .reduce(vec![Event::new(0.5, 4.0, 2.0)].into())
            .unwrap();
        assert_relative_eq!(out.counts()[0], 2.0);
        assert_relative_eq!(out.errors()[0], 1.0);
    }

    #[test]
    fn test_histogram_keeps_own_normalization() {
        let hist = Histogram::from_counts(bins(), vec![8.0; 4])
            .unwrap()
            .with_normalization(4.0);
        let out = Reduction::new(bins())
            .with_normalization(2.0)
            .with_correction(Correction::NormaliseByCurrent)
            .reduce(hist.into())
            .unwrap();
        assert_relative_eq!(out.counts()[0], 2.0);
    }

    #[test]
    fn test_incompatible_background_rejected_before_binning() {
        let background = Histogram::zeros(BinSpec::from_linear(0.0, 2.0, 4.0).unwrap());
        let err = reduce(
            ReductionInput::Events(vec![]),
            &bins(),
            &[],
            Some(&background),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::IncompatibleBinning { .. }));
    }

    #[test]
    fn test_report_collects_failures_in_order() {
        let reduction = Reduction::new(bins())
            .with_correction(Correction::scalar(2.0, Operation::Multiply))
            .with_correction(Correction::NormaliseByCurrent);
        let with_charge = Histogram::from_counts(bins(), vec![1.0; 4])
            .unwrap()
            .with_normalization(1.0);
        let inputs = vec![
            ReductionInput::Histogram(with_charge.clone()),
            ReductionInput::Events(vec![Event::unweighted(1.5)]),
            ReductionInput::Histogram(with_charge),
        ];
        let report = reduction.reduce_spectra(inputs);
        assert_eq!(report.len(), 3);
        assert!(!report.is_success());
        assert_eq!(
            report.outputs.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(
            report.failures[0].error,
            Error::DivisionByZero { .. }
        ));
    }
}
