//! Counts-conserving rebinning by fractional overlap.

use rustreduce_core::{BinSpec, Histogram, Result};

/// Redistributes `histogram` onto `bins`.
///
/// A source bin `[a, b)` overlapping a destination bin `[c, d)` contributes
/// `f = overlap / (b - a)` of its counts and `f^2` of its variance. Source
/// content outside the destination range is discarded, so total counts are
/// conserved whenever the destination range covers the source range.
///
/// Both edge sequences are walked once (`O(n + m)`). The normalization of
/// the input carries over unchanged.
///
/// # Errors
/// Returns [`rustreduce_core::Error::EmptyBinSpec`] if `bins` has fewer than
/// two edges.
pub fn rebin(histogram: &Histogram, bins: &BinSpec) -> Result<Histogram> {
    bins.validate()?;

    let source = histogram.edges();
    let target = bins.edges();
    let (counts, errors) = (histogram.counts(), histogram.errors());

    let mut output = Histogram::zeros(bins.clone());
    output.set_normalization(histogram.normalization());
    let (out_counts, out_errors) = output.values_mut();

    let (mut i, mut j) = (0usize, 0usize);
    while i + 1 < source.len() && j + 1 < target.len() {
        let (a, b) = (source[i], source[i + 1]);
        let (c, d) = (target[j], target[j + 1]);

        let overlap = b.min(d) - a.max(c);
        if overlap > 0.0 {
            let fraction = overlap / (b - a);
            out_counts[j] += counts[i] * fraction;
            // Variance is accumulated here and square-rooted below.
            out_errors[j] += errors[i] * errors[i] * fraction * fraction;
        }

        if b <= d {
            i += 1;
        } else {
            j += 1;
        }
    }

    for error in out_errors.iter_mut() {
        *error = error.sqrt();
    }
    Ok(output)
}
