//! Weighted event accumulation into histogram bins.
//!
//! Events whose time of flight lies outside `[edges[0], edges[last])` are
//! dropped and counted, never reported as errors. Events with a non-finite
//! weight or weight error are dropped the same way so that a single corrupt
//! event cannot poison a whole spectrum with NaN.

use rayon::prelude::*;
use rustreduce_core::{BinSpec, Error, Histogram, Result, WeightedEvent};

/// Events per rayon task in [`accumulate_par`].
const PAR_CHUNK_SIZE: usize = 64 * 1024;

/// Streaming accumulator: per-bin weight sums and variance sums.
///
/// The bin schema is shared, not copied, so one schema can back any number
/// of independent accumulators (one per spectrum, or one per chunk).
#[derive(Debug, Clone)]
pub struct EventAccumulator {
    bins: BinSpec,
    sums: Vec<f64>,
    variances: Vec<f64>,
    accepted: usize,
    dropped: usize,
}

impl EventAccumulator {
    /// Creates an empty accumulator over `bins`.
    ///
    /// # Errors
    /// Returns [`Error::EmptyBinSpec`] if `bins` has fewer than two edges.
    pub fn new(bins: BinSpec) -> Result<Self> {
        bins.validate()?;
        Ok(Self::with_valid_bins(bins))
    }

    fn with_valid_bins(bins: BinSpec) -> Self {
        let n_bins = bins.n_bins();
        Self {
            bins,
            sums: vec![0.0; n_bins],
            variances: vec![0.0; n_bins],
            accepted: 0,
            dropped: 0,
        }
    }

    /// Adds one event. Returns false if the event was dropped.
    #[inline]
    pub fn push<E: WeightedEvent>(&mut self, event: E) -> bool {
        let (weight, error) = (event.weight(), event.weight_error());
        let bin = if weight.is_finite() && error.is_finite() {
            self.bins.find_bin(event.tof())
        } else {
            None
        };
        match bin {
            Some(index) => {
                self.sums[index] += weight;
                self.variances[index] += error * error;
                self.accepted += 1;
                true
            }
            None => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Adds every event of an iterator.
    pub fn extend<I>(&mut self, events: I)
    where
        I: IntoIterator,
        I::Item: WeightedEvent,
    {
        for event in events {
            self.push(event);
        }
    }

    /// Folds another accumulator's sums into this one.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleBinning`] if the two accumulators use
    /// different bins.
    pub fn merge(&mut self, other: &EventAccumulator) -> Result<()> {
        if !self.bins.matches(&other.bins) {
            return Err(Error::IncompatibleBinning {
                context: format!(
                    "cannot merge accumulator with {} bins into one with {} bins",
                    other.bins.n_bins(),
                    self.bins.n_bins()
                ),
            });
        }
        self.merge_same_bins(other);
        Ok(())
    }

    fn merge_same_bins(&mut self, other: &EventAccumulator) {
        for (sum, value) in self.sums.iter_mut().zip(&other.sums) {
            *sum += value;
        }
        for (variance, value) in self.variances.iter_mut().zip(&other.variances) {
            *variance += value;
        }
        self.accepted += other.accepted;
        self.dropped += other.dropped;
    }

    /// Clears all sums so the accumulator can be reused.
    pub fn reset(&mut self) {
        self.sums.fill(0.0);
        self.variances.fill(0.0);
        self.accepted = 0;
        self.dropped = 0;
    }

    /// Returns the bin schema.
    #[must_use]
    pub fn bins(&self) -> &BinSpec {
        &self.bins
    }

    /// Number of events binned so far.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Number of events dropped (out of range or non-finite).
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Converts the sums into a histogram with `errors = sqrt(variance)`.
    #[must_use]
    pub fn finish(self) -> Histogram {
        let mut histogram = Histogram::zeros(self.bins);
        let (counts, errors) = histogram.values_mut();
        counts.copy_from_slice(&self.sums);
        for (error, variance) in errors.iter_mut().zip(&self.variances) {
            *error = variance.sqrt();
        }
        histogram
    }
}

/// Bins a stream of events.
///
/// # Errors
/// Returns [`Error::EmptyBinSpec`] if `bins` has fewer than two edges.
pub fn accumulate<I>(events: I, bins: &BinSpec) -> Result<Histogram>
where
    I: IntoIterator,
    I::Item: WeightedEvent,
{
    let mut accumulator = EventAccumulator::new(bins.clone())?;
    accumulator.extend(events);
    Ok(accumulator.finish())
}

/// Bins a slice of events on the rayon thread pool.
///
/// Each chunk is accumulated independently and the partial sums are added,
/// so the result equals [`accumulate`] up to floating-point summation order.
///
/// # Errors
/// Returns [`Error::EmptyBinSpec`] if `bins` has fewer than two edges.
pub fn accumulate_par<E>(events: &[E], bins: &BinSpec) -> Result<Histogram>
where
    E: WeightedEvent + Sync,
{
    bins.validate()?;
    let total = events
        .par_chunks(PAR_CHUNK_SIZE)
        .map(|chunk| {
            let mut partial = EventAccumulator::with_valid_bins(bins.clone());
            partial.extend(chunk);
            partial
        })
        .reduce(
            || EventAccumulator::with_valid_bins(bins.clone()),
            |mut left, right| {
                left.merge_same_bins(&right);
                left
            },
        );
    Ok(total.finish())
}
