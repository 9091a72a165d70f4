//! rustreduce CLI
//!
//! Bins time-of-flight event files, applies corrections and writes reduced
//! histograms.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};
use rustreduce_algorithms::{ReductionInput, ReductionReport};
use rustreduce_core::{BinParams, Event, Histogram};
use rustreduce_io::{read_events, read_histogram, DataFileWriter, ReductionConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    RustreduceIo(#[from] rustreduce_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] rustreduce_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Two inputs would both be written to {0}")]
    DuplicateOutput(PathBuf),

    #[error("{failed} of {total} spectra failed")]
    SpectraFailed { failed: usize, total: usize },
}

/// Time-of-flight event binning and correction.
#[derive(Parser)]
#[command(name = "rustreduce")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bin edges produced by a binning string
    Bins {
        /// Binning parameters, e.g. "0.02,0.02,0.10" or "10,-0.01,1000"
        #[arg(allow_hyphen_values = true)]
        params: BinParams,
    },

    /// Reduce event files, one spectrum per file
    Reduce {
        /// Input event file(s) (.csv or binary)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Binning parameters (overrides the config file)
        #[arg(short, long, required_unless_present = "config", allow_hyphen_values = true)]
        binning: Option<BinParams>,

        /// JSON reduction config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Background histogram subtracted after corrections
        #[arg(long)]
        background: Option<PathBuf>,

        /// Reference histogram divided out last
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Directory receiving one <stem>.csv per input
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Worker threads (overrides the config file)
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,
    },

    /// Show information about an event or histogram file
    Info {
        /// Input file
        input: PathBuf,

        /// Read the input as a histogram instead of events
        #[arg(long)]
        histogram: bool,

        /// Integration window for a histogram (default: its full range)
        #[arg(
            long,
            num_args = 2,
            value_names = ["LOW", "HIGH"],
            requires = "histogram",
            allow_hyphen_values = true
        )]
        window: Option<Vec<f64>>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Bins { params } => print_bins(&params),
        Commands::Reduce {
            input,
            binning,
            config,
            background,
            reference,
            output_dir,
            parallelism,
        } => {
            let mut settings = match &config {
                Some(path) => ReductionConfig::from_file(path)?,
                None => ReductionConfig::default(),
            };
            if let Some(binning) = binning {
                settings = settings.with_binning(binning);
            }
            if let Some(parallelism) = parallelism {
                settings = settings.with_parallelism(parallelism);
            }
            settings.validate()?;

            reduce_files(
                &input,
                &settings,
                background.as_deref(),
                reference.as_deref(),
                &output_dir,
            )
        }
        Commands::Info {
            input,
            histogram: true,
            window,
        } => print_histogram_info(&input, window.as_deref()),
        Commands::Info { input, .. } => print_info(&input),
    }
}

fn print_bins(params: &BinParams) -> Result<()> {
    let bins = params.to_bin_spec()?;
    for edge in bins.edges() {
        println!("{}", edge);
    }
    info!("{} bins from {} to {}", bins.n_bins(), bins.range().0, bins.range().1);
    Ok(())
}

fn reduce_files(
    inputs: &[PathBuf],
    settings: &ReductionConfig,
    background: Option<&Path>,
    reference: Option<&Path>,
    output_dir: &Path,
) -> Result<()> {
    let outputs = output_paths(inputs, output_dir)?;

    let mut reduction = settings.to_reduction()?;
    if let Some(path) = background {
        reduction = reduction.with_background(read_histogram(path)?);
    }
    if let Some(path) = reference {
        reduction = reduction.with_reference(read_histogram(path)?);
    }
    info!(
        "Reducing {} file(s) onto {} bins with {} correction(s)",
        inputs.len(),
        reduction.bins().n_bins(),
        reduction.corrections().len()
    );

    let start = Instant::now();

    // A file that cannot be read fails on its own, like a failed reduction.
    let mut failed = 0usize;
    let mut loaded = Vec::with_capacity(inputs.len());
    let mut spectra = Vec::with_capacity(inputs.len());
    for (index, path) in inputs.iter().enumerate() {
        match read_events(path) {
            Ok(events) => {
                debug!("{}: {} events", path.display(), events.len());
                loaded.push(index);
                spectra.push(ReductionInput::Events(events));
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    let report = match settings.parallelism {
        Some(threads) => {
            debug!("Using {} worker thread(s)", threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(|| reduction.reduce_spectra(spectra))
        }
        None => reduction.reduce_spectra(spectra),
    };
    failed += write_report(&report, &loaded, inputs, &outputs, output_dir)?;

    info!(
        "Reduced {} of {} file(s) in {:.2}s",
        inputs.len() - failed,
        inputs.len(),
        start.elapsed().as_secs_f64()
    );
    if failed > 0 {
        return Err(CliError::SpectraFailed {
            failed,
            total: inputs.len(),
        });
    }
    Ok(())
}

/// One `<stem>.csv` per input; two inputs with the same stem are rejected
/// before any work is done.
fn output_paths(inputs: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
        name.push(".csv");
        let output = output_dir.join(name);
        if !seen.insert(output.clone()) {
            return Err(CliError::DuplicateOutput(output));
        }
        outputs.push(output);
    }
    Ok(outputs)
}

/// Writes every reduced spectrum and logs every failure. Returns the number
/// of spectra that failed.
fn write_report(
    report: &ReductionReport,
    loaded: &[usize],
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    output_dir: &Path,
) -> Result<usize> {
    if !report.outputs.is_empty() {
        std::fs::create_dir_all(output_dir)?;
    }

    let mut failed = 0usize;
    for failure in &report.failures {
        let index = loaded[failure.index];
        error!("{}: {}", inputs[index].display(), failure.error);
        failed += 1;
    }

    for (spectrum, histogram) in &report.outputs {
        let index = loaded[*spectrum];
        let path = &outputs[index];
        let written =
            DataFileWriter::create(path).and_then(|mut w| w.write_histogram_csv(histogram));
        match written {
            Ok(()) => {
                if histogram.counts().iter().any(|c| !c.is_finite()) {
                    warn!("{}: output contains non-finite counts", path.display());
                }
                info!(
                    "{} -> {} (total {:.6} +/- {:.6})",
                    inputs[index].display(),
                    path.display(),
                    histogram.total_counts(),
                    histogram.total_error()
                );
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    Ok(failed)
}

fn print_info(input: &Path) -> Result<()> {
    let events = read_events(input)?;

    println!("File: {}", input.display());
    println!("Events: {}", events.len());

    let finite: Vec<&Event> = events.iter().filter(|e| e.tof.is_finite()).collect();
    if finite.len() < events.len() {
        println!("Non-finite TOF: {}", events.len() - finite.len());
    }
    if !finite.is_empty() {
        let min_tof = finite.iter().map(|e| e.tof).fold(f64::INFINITY, f64::min);
        let max_tof = finite.iter().map(|e| e.tof).fold(f64::NEG_INFINITY, f64::max);
        println!("TOF range: {} - {}", min_tof, max_tof);
    }

    let total_weight: f64 = events.iter().map(|e| e.weight).sum();
    let total_error = events
        .iter()
        .map(|e| e.weight_error * e.weight_error)
        .sum::<f64>()
        .sqrt();
    println!("Total weight: {} +/- {}", total_weight, total_error);
    if !events.is_empty() {
        println!("Mean weight: {}", total_weight / events.len() as f64);
    }
    Ok(())
}

/// The `[low, high)` window to integrate over, defaulting to the full range.
fn integration_window(histogram: &Histogram, window: Option<&[f64]>) -> (f64, f64) {
    match window {
        Some(&[low, high]) => (low, high),
        _ => histogram.bins().range(),
    }
}

fn print_histogram_info(input: &Path, window: Option<&[f64]>) -> Result<()> {
    let histogram = read_histogram(input)?;
    let (low, high) = histogram.bins().range();

    println!("File: {}", input.display());
    println!("Bins: {}", histogram.len());
    println!("Range: {} - {}", low, high);

    let (window_low, window_high) = integration_window(&histogram, window);
    let (integral, error) = histogram.integrate(window_low, window_high);
    println!(
        "Integral [{}, {}): {} +/- {}",
        window_low, window_high, integral, error
    );
    Ok(())
}
