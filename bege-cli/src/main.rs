//! BEGe binary trigger file converter.
//!
//! Decodes raw trigger record files into a binary waveform container or a
//! CSV summary.

use anyhow::{Context, Result};
use bege_core::output::{self, SummaryCsvWriter};
use bege_core::veto::DEFAULT_VETO_THRESHOLD;
use bege_core::{
    DecodeError, DecoderConfig, EventSink, EventStreamReader, OutputError, TriggerEvent,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

/// Converter for BEGe binary trigger files.
///
/// Reads a file of fixed-size trigger records (six interleaved waveforms plus
/// timestamp and pulser counters) and writes the decoded events.
#[derive(Parser, Debug)]
#[command(name = "bege-parse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Binary input file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (.bin, .csv)
    ///
    /// The output format is determined by the file extension:
    /// - .bin: Binary container with the full waveforms
    /// - .csv: One summary line per trigger (timestamp, pulser, veto)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// YAML file with the acquisition configuration
    ///
    /// Keys: sampling_frequency (Hz), waveform_length (samples).
    /// Missing keys fall back to 20 MHz and 8000 samples.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Additional CSV summary file (optional)
    #[arg(short, long, value_name = "PATH")]
    summary: Option<PathBuf>,

    /// Muon veto threshold in volts, used for the CSV summary
    #[arg(long, default_value_t = DEFAULT_VETO_THRESHOLD, allow_hyphen_values = true)]
    veto_threshold: f64,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log every decoded record
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

/// Forwards events to the output, the optional summary and the progress bar.
struct ConversionSink {
    output: Box<dyn EventSink>,
    summary: Option<SummaryCsvWriter<File>>,
    progress: ProgressBar,
}

impl EventSink for ConversionSink {
    fn append(&mut self, event: TriggerEvent) -> Result<(), OutputError> {
        if let Some(summary) = self.summary.as_mut() {
            summary.write_event(&event)?;
        }
        self.output.append(event)?;
        self.progress.inc(1);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        let output = self.output.finish();
        let summary = match self.summary.as_mut() {
            Some(summary) => summary.flush(),
            None => Ok(()),
        };
        merge_finish(output, summary)
    }
}

/// Keeps the output error when both sinks fail; the summary error is logged.
fn merge_finish(
    output: Result<(), OutputError>,
    summary: Result<(), OutputError>,
) -> Result<(), OutputError> {
    match (output, summary) {
        (Err(e), Err(summary_err)) => {
            error!("Failed to flush summary CSV: {}", summary_err);
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.quiet {
        simplelog::LevelFilter::Warn
    } else if args.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .context("Failed to initialize logging")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => DecoderConfig::read_config_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => DecoderConfig::default(),
    };
    info!(
        "Record geometry: {} samples per waveform, {} bytes per record, {} Hz",
        config.waveform_length,
        config.record_size(),
        config.sampling_frequency
    );

    let start_time = Instant::now();

    let mut reader = match EventStreamReader::open(&args.input, &config) {
        Ok(reader) => reader,
        Err(e @ DecodeError::StructuralCorruption { .. }) => {
            error!("{}", e);
            anyhow::bail!("File corrupted: {:?}", args.input);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {:?}", args.input));
        }
    };

    // Determine output format from extension
    let output_ext = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let output: Box<dyn EventSink> = match output_ext.as_str() {
        "bin" => Box::new(
            output::create_binary(&args.output, &config)
                .context("Failed to create binary output")?,
        ),
        "csv" => Box::new(
            output::create_summary_csv(&args.output, args.veto_threshold)
                .context("Failed to create CSV output")?,
        ),
        _ => {
            anyhow::bail!(
                "Unsupported output format: .{}. Use .bin or .csv",
                output_ext
            );
        }
    };

    let summary = match &args.summary {
        Some(path) => Some(
            output::create_summary_csv(path, args.veto_threshold)
                .context("Failed to create summary CSV")?,
        ),
        None => None,
    };

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let template = "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
        let pb = ProgressBar::new(reader.records_expected());
        pb.set_style(
            ProgressStyle::default_bar()
                .template(template)
                .context("Invalid progress template")?,
        );
        pb.set_message(format!(
            "Decoding {:?}",
            args.input.file_name().unwrap_or_default()
        ));
        pb
    };

    let mut sink = ConversionSink {
        output,
        summary,
        progress: progress.clone(),
    };

    let result = reader
        .run(&mut sink)
        .with_context(|| format!("Failed to convert {:?}", args.input))?;

    let duration = start_time.elapsed();
    progress.finish_with_message(format!(
        "Done! Decoded {} triggers in {:.2}s",
        result.produced,
        duration.as_secs_f64()
    ));

    if !args.quiet {
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Records:      {}", result.expected);
        eprintln!("  Decoded:      {}", result.produced);
        eprintln!("  Skipped:      {}", result.skipped);
        eprintln!("  Duration:     {:.3}s", duration.as_secs_f64());
    }

    Ok(())
}
