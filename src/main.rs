//! # loadsum - Main Entry Point
//!
//! Reads JSON-lines samples from a file or stdin, aggregates them while they
//! stream in and prints the end-of-test summary.
//!
//! ## Flow
//!
//! 1. **Initialize logging**: colored log lines on stderr, filtered by `RUST_LOG`
//! 2. **Resolve configuration**: all user input is validated before reading
//! 3. **Start the summary output**: the flusher aggregates buffered samples
//! 4. **Read samples**: a blocking task parses the input into the buffer
//! 5. **Stop and report**: the final flush, the text summary and the optional
//!    JSON report

use anyhow::{Context, Result};
use clap::Parser;
use loadsum::{input, logging, Args, MetricRegistry, ReportWriter, Summary, SummaryConfig, SummaryOutput};
use std::io::Write;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);
    debug!("Arguments: {:?}", args);

    let config = SummaryConfig::from_args(&args).context("Invalid configuration")?;

    let mut output = SummaryOutput::new(&config);
    output.start();

    let buffer = output.buffer();
    let submetrics = config.submetrics.clone();
    let input_path = args.input.clone();
    let stats = tokio::task::spawn_blocking(move || {
        let mut registry = MetricRegistry::new(submetrics);
        input::read_path(input_path.as_deref(), &mut registry, &buffer)
    })
    .await
    .context("Input reader task failed")??;
    info!(
        "Read {} samples from {} lines ({} rejected)",
        stats.samples, stats.lines, stats.rejected
    );

    let mut report = output.stop().await?;
    report.dropped_samples += stats.rejected;

    let summary = Summary::from_report(&report, config.summary_options());
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    summary
        .write_to(&mut handle)
        .context("Failed to write summary")?;
    handle.flush()?;

    if let Some(ref path) = args.output_file {
        ReportWriter::new(path, config.trend_factory.kind()).write(&report)?;
    }

    Ok(())
}
