//! rustreduce-io: file I/O and configuration for rustreduce.
//!
//! Event files (CSV or memory-mapped little-endian binary), histogram
//! files (CSV or binary), and the JSON [`ReductionConfig`].
//!

mod config;
mod error;
mod reader;
mod writer;

pub use config::ReductionConfig;
pub use error::{Error, Result};
pub use reader::{
    read_events, read_events_csv, read_histogram, read_histogram_binary, read_histogram_csv,
    EventFileReader, MappedFileReader, EVENT_CSV_HEADER, EVENT_RECORD_SIZE, HISTOGRAM_CSV_HEADER,
};
pub use writer::DataFileWriter;
