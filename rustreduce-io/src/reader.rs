//! Event and histogram file readers.
//!
//! Binary files are memory-mapped; text files are read line by line.
//! The format is chosen from the file extension: `.csv` and `.txt` are text,
//! anything else is the little-endian binary layout written by
//! [`crate::DataFileWriter`].

use crate::{Error, Result};
use log::debug;
use memmap2::Mmap;
use rayon::prelude::*;
use rustreduce_core::{BinSpec, Event, Histogram};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Bytes per binary event record: `tof`, `weight`, `weight_error` as `f64`.
pub const EVENT_RECORD_SIZE: usize = 24;

/// Column header written to and accepted in histogram CSV files.
pub const HISTOGRAM_CSV_HEADER: &str = "x_low,x_high,counts,errors";

/// Column header written to and accepted in event CSV files.
pub const EVENT_CSV_HEADER: &str = "tof,weight,weight_error";

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Returns the path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reader for binary event files (24-byte little-endian records).
pub struct EventFileReader {
    reader: MappedFileReader,
}

impl EventFileReader {
    /// Opens a binary event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or its size is not a
    /// multiple of [`EVENT_RECORD_SIZE`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        if !reader.len().is_multiple_of(EVENT_RECORD_SIZE) {
            return Err(Error::InvalidFormat(format!(
                "file size {} is not a multiple of {EVENT_RECORD_SIZE} (file: {})",
                reader.len(),
                reader.path().display()
            )));
        }
        Ok(Self { reader })
    }

    /// Returns the number of events in the file.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.reader.len() / EVENT_RECORD_SIZE
    }

    /// Decodes every event, in file order.
    #[must_use]
    pub fn read_events(&self) -> Vec<Event> {
        self.reader
            .as_bytes()
            .par_chunks_exact(EVENT_RECORD_SIZE)
            .map(|record| Event::new(f64_at(record, 0), f64_at(record, 8), f64_at(record, 16)))
            .collect()
    }
}

fn f64_at(bytes: &[u8], offset: usize) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_le_bytes(buf)
}

fn is_text(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("txt"))
}

/// Reads events from a CSV or binary file, chosen by extension.
///
/// # Errors
/// Returns an error if the file cannot be read or is malformed.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let events = if is_text(path) {
        read_events_csv(path)?
    } else {
        EventFileReader::open(path)?.read_events()
    };
    debug!("read {} events from {}", events.len(), path.display());
    Ok(events)
}

/// Reads events from CSV text.
///
/// Rows are `tof,weight,weight_error`. A two-column row has unit error and
/// a one-column row is an unweighted event. Blank lines and lines starting
/// with `#` are skipped, as is a first row with no numeric field (a header).
///
/// # Errors
/// Returns [`Error::InvalidFormat`] naming the offending line.
pub fn read_events_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let mut events = Vec::new();
    for row in csv_rows(path)? {
        let (line, fields) = row?;
        let event = match parse_fields(path, line, &fields)?.as_slice() {
            [tof] => Event::unweighted(*tof),
            [tof, weight] => Event::new(*tof, *weight, 1.0),
            [tof, weight, error] => Event::new(*tof, *weight, *error),
            _ => {
                return Err(Error::at_line(
                    path,
                    line,
                    format!("expected 1 to 3 columns, found {}", fields.len()),
                ))
            }
        };
        events.push(event);
    }
    Ok(events)
}

/// Reads a histogram from a CSV or binary file, chosen by extension.
///
/// # Errors
/// Returns an error if the file cannot be read or is malformed.
pub fn read_histogram<P: AsRef<Path>>(path: P) -> Result<Histogram> {
    let path = path.as_ref();
    let histogram = if is_text(path) {
        read_histogram_csv(path)?
    } else {
        read_histogram_binary(path)?
    };
    debug!("read {} bins from {}", histogram.len(), path.display());
    Ok(histogram)
}

/// Reads a histogram from CSV rows `x_low,x_high,counts,errors`.
///
/// Consecutive rows must share an edge: each row's `x_low` equals the
/// previous row's `x_high`.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for malformed rows or gaps between bins,
/// and a core error if the edges or errors are invalid.
pub fn read_histogram_csv<P: AsRef<Path>>(path: P) -> Result<Histogram> {
    let path = path.as_ref();
    let mut edges = Vec::new();
    let mut counts = Vec::new();
    let mut errors = Vec::new();

    for row in csv_rows(path)? {
        let (line, fields) = row?;
        let values = parse_fields(path, line, &fields)?;
        let [low, high, count, error] = values.as_slice() else {
            return Err(Error::at_line(
                path,
                line,
                format!("expected 4 columns, found {}", values.len()),
            ));
        };
        match edges.last() {
            None => edges.push(*low),
            Some(&previous) if previous != *low => {
                return Err(Error::at_line(
                    path,
                    line,
                    format!("bin starts at {low} but the previous bin ends at {previous}"),
                ))
            }
            Some(_) => {}
        }
        edges.push(*high);
        counts.push(*count);
        errors.push(*error);
    }

    if counts.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "no histogram rows in {}",
            path.display()
        )));
    }
    let bins = BinSpec::from_edges(&edges)?;
    Ok(Histogram::new(bins, counts, errors)?)
}

/// Reads a binary histogram: `u64` bin count `n`, then `n + 1` edges, `n`
/// counts and `n` errors, all little-endian.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] if the file length does not match the
/// bin count, and a core error if the contents are invalid.
pub fn read_histogram_binary<P: AsRef<Path>>(path: P) -> Result<Histogram> {
    let reader = MappedFileReader::open(path)?;
    let bytes = reader.as_bytes();
    let invalid = |message: String| {
        Error::InvalidFormat(format!("{message} (file: {})", reader.path().display()))
    };

    if bytes.len() < 8 {
        return Err(invalid(format!("{} bytes is too short for a header", bytes.len())));
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&bytes[..8]);
    let n_bins = usize::try_from(u64::from_le_bytes(header))
        .map_err(|_| invalid("bin count does not fit in memory".to_string()))?;

    let expected = n_bins
        .checked_mul(3)
        .and_then(|n| n.checked_add(1))
        .and_then(|n| n.checked_mul(8))
        .and_then(|n| n.checked_add(8));
    if expected != Some(bytes.len()) {
        return Err(invalid(format!(
            "{} bytes does not match a histogram of {n_bins} bins",
            bytes.len()
        )));
    }

    let values: Vec<f64> = bytes[8..].chunks_exact(8).map(|b| f64_at(b, 0)).collect();
    let (edges, rest) = values.split_at(n_bins + 1);
    let (counts, errors) = rest.split_at(n_bins);
    let bins = BinSpec::from_edges(edges)?;
    Ok(Histogram::new(bins, counts.to_vec(), errors.to_vec())?)
}

type CsvRow = Result<(usize, Vec<String>)>;

/// Yields `(line_number, fields)` for every data row, skipping comments,
/// blank lines and a leading header.
fn csv_rows(path: &Path) -> Result<impl Iterator<Item = CsvRow>> {
    let file = File::open(path)?;
    let mut seen_data = false;
    let rows = BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(move |(index, line)| -> Option<CsvRow> {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            let fields: Vec<String> = trimmed.split(',').map(|f| f.trim().to_string()).collect();
            let first_row = !seen_data;
            seen_data = true;
            if first_row && is_header(trimmed, &fields) {
                return None;
            }
            Some(Ok((index + 1, fields)))
        });
    Ok(rows)
}

/// A header is one of the known column lines, or a row with no numeric field.
fn is_header(line: &str, fields: &[String]) -> bool {
    line == EVENT_CSV_HEADER
        || line == HISTOGRAM_CSV_HEADER
        || fields.iter().all(|field| field.parse::<f64>().is_err())
}

fn parse_fields(path: &Path, line: usize, fields: &[String]) -> Result<Vec<f64>> {
    fields
        .iter()
        .map(|field| {
            field.parse::<f64>().map_err(|_| {
                Error::at_line(path, line, format!("cannot parse {field:?} as a number"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_events_csv_column_forms() {
        let file = csv_file("# run 1234\ntof,weight,weight_error\n1.5,2.0,0.5\n\n2.5,3.0\n3.5\n");
        let events = read_events(file.path()).unwrap();
        assert_eq!(
            events,
            vec![
                Event::new(1.5, 2.0, 0.5),
                Event::new(2.5, 3.0, 1.0),
                Event::unweighted(3.5),
            ]
        );
    }

    #[test]
    fn test_read_events_csv_reports_line() {
        let file = csv_file("1.0,1.0,1.0\n2.0,abc,1.0\n");
        let err = read_events_csv(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(":2:"), "{message}");
        assert!(message.contains("abc"), "{message}");

        // A malformed first row is reported, not taken for a header.
        let file = csv_file("abc,1,1\n2.0,1.0,1.0\n");
        let message = read_events_csv(file.path()).unwrap_err().to_string();
        assert!(message.contains(":1:"), "{message}");
        assert!(message.contains("abc"), "{message}");

        let file = csv_file("1,2,3,4\n");
        assert!(matches!(
            read_events_csv(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_events_binary() {
        let mut file = NamedTempFile::new().unwrap();
        for value in [1.0_f64, 2.0, 0.5, 3.0, 1.0, 1.0] {
            file.write_all(&value.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();

        let reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.event_count(), 2);
        assert_eq!(
            reader.read_events(),
            vec![Event::new(1.0, 2.0, 0.5), Event::new(3.0, 1.0, 1.0)]
        );
    }

    #[test]
    fn test_read_events_binary_truncated() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 30]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            EventFileReader::open(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_histogram_csv() {
        let file = csv_file("x_low,x_high,counts,errors\n0,1,4,2\n1,3,9,3\n");
        let hist = read_histogram(file.path()).unwrap();
        assert_eq!(hist.edges(), &[0.0, 1.0, 3.0]);
        assert_eq!(hist.counts(), &[4.0, 9.0]);
        assert_eq!(hist.errors(), &[2.0, 3.0]);
    }

    #[test]
    fn test_read_histogram_csv_gap() {
        let file = csv_file("0,1,4,2\n1.5,3,9,3\n");
        assert!(matches!(
            read_histogram_csv(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_histogram_csv_empty() {
        let file = csv_file("x_low,x_high,counts,errors\n");
        assert!(matches!(
            read_histogram_csv(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_histogram_binary_length_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&2u64.to_le_bytes()).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_histogram_binary(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }
}
