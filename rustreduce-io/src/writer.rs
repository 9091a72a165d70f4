//! File writers for events and reduced histograms.

use crate::reader::{EVENT_CSV_HEADER, HISTOGRAM_CSV_HEADER};
use crate::Result;
use rustreduce_core::{Event, Histogram};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Buffered writer for event and histogram files.
///
/// Floats are written in Rust's shortest round-trip form, so CSV output
/// reads back to identical values.
pub struct DataFileWriter {
    writer: BufWriter<File>,
}

impl DataFileWriter {
    /// Creates a new file writer, truncating any existing file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes a histogram as CSV, one `x_low,x_high,counts,errors` row per bin.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_histogram_csv(&mut self, histogram: &Histogram) -> Result<()> {
        writeln!(self.writer, "{HISTOGRAM_CSV_HEADER}")?;

        let edges = histogram.edges();
        for (i, (count, error)) in histogram.counts().iter().zip(histogram.errors()).enumerate() {
            writeln!(
                self.writer,
                "{},{},{},{}",
                edges[i],
                edges[i + 1],
                count,
                error
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes a histogram as binary data.
    ///
    /// Format: `u64` bin count `n`, then `n + 1` edges, `n` counts and
    /// `n` errors as `f64`, all little-endian.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_histogram_binary(&mut self, histogram: &Histogram) -> Result<()> {
        self.writer.write_all(&(histogram.len() as u64).to_le_bytes())?;
        for value in histogram
            .edges()
            .iter()
            .chain(histogram.counts())
            .chain(histogram.errors())
        {
            self.writer.write_all(&value.to_le_bytes())?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes events as CSV with a `tof,weight,weight_error` header.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_events_csv(&mut self, events: &[Event]) -> Result<()> {
        writeln!(self.writer, "{EVENT_CSV_HEADER}")?;
        for e in events {
            writeln!(self.writer, "{},{},{}", e.tof, e.weight, e.weight_error)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes events as binary data.
    ///
    /// Format: For each event: f64 (tof) + f64 (weight) + f64 (`weight_error`)
    /// Total: 24 bytes per event
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_events_binary(&mut self, events: &[Event]) -> Result<()> {
        for e in events {
            self.writer.write_all(&e.tof.to_le_bytes())?;
            self.writer.write_all(&e.weight.to_le_bytes())?;
            self.writer.write_all(&e.weight_error.to_le_bytes())?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
