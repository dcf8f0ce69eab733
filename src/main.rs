//! ScanTrail: forensic directory scanner.
//!
//! Thin binary entry point. All scanning logic lives in the
//! `scantrail-core` crate; this file only parses arguments, assembles the
//! configuration, picks a report sink and prints a summary.

use anyhow::Context;
use clap::Parser;
use scantrail_core::config::{HashAlgorithm, ReportFormat, ScanConfiguration};
use scantrail_core::model::ScanReport;
use scantrail_core::scanner::{start_scan, ScanCoordinator, ScanError, ScanProgress};
use scantrail_core::sink::{CsvFileSink, JsonFileSink, ReportSink};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "scantrail")]
#[command(about = "Walk a directory, hash in-scope files in parallel, and write a forensic scan report", long_about = None)]
struct Cli {
    /// Directory to scan
    root: PathBuf,

    /// JSON configuration file; missing fields take their defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report destination [default: scantrail-<UTC timestamp>.<format>]
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_name = "json|csv")]
    format: Option<ReportFormat>,

    /// Content hash algorithm (md5, sha256, sha512, blake3)
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<HashAlgorithm>,

    /// Number of collector threads
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Stop the scan after this many seconds and write a partial report
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Skip files and directories whose name starts with a dot
    #[arg(long)]
    skip_hidden: bool,

    /// Log rejected entries and per-file decisions
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the summary.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("ScanTrail starting");

    let config = load_config(&cli)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(config.report_format));
    let sink: Box<dyn ReportSink> = match config.report_format {
        ReportFormat::Json => Box::new(JsonFileSink::new(&output)),
        ReportFormat::Csv => Box::new(CsvFileSink::new(&output)),
    };

    let coordinator = ScanCoordinator::new(config).with_sink(sink);
    let handle = start_scan(coordinator, cli.root.clone())
        .context("failed to start the scanner thread")?;

    // The channel closes when the scan thread drops its sender.
    for message in handle.progress_rx.iter() {
        match message {
            ScanProgress::Traversed {
                files_found,
                rejected,
                ..
            } => tracing::debug!("{files_found} files queued, {rejected} entries rejected"),
            ScanProgress::Dispatched { files, workers } => {
                tracing::info!("Hashing {files} files on {workers} workers")
            }
            ScanProgress::Error { .. } | ScanProgress::Complete { .. } => {}
            ScanProgress::Cancelled { completed, skipped } => {
                tracing::warn!("Scan stopped early: {completed} done, {skipped} skipped")
            }
        }
    }

    match handle.wait() {
        Ok(report) => {
            print_summary(&report, &output.display().to_string());
            Ok(())
        }
        Err(ScanError::Persist { report, source }) => {
            print_summary(&report, "not saved");
            Err(source).with_context(|| format!("failed to write {}", output.display()))
        }
        Err(err) => Err(err).with_context(|| format!("scan of {} failed", cli.root.display())),
    }
}

fn print_summary(report: &ScanReport, destination: &str) {
    println!(
        "{}: {} files ({} hashed, {} errors, {} rejected){} -> {destination}",
        report.scanned_directory().display(),
        report.file_count(),
        report.hashed_count(),
        report.error_count(),
        report.rejected_count(),
        if report.is_partial() { " [partial]" } else { "" },
    );
}

/// Defaults, then the config file, then `SCANTRAIL_*` variables, then flags.
fn load_config(cli: &Cli) -> anyhow::Result<ScanConfiguration> {
    let mut config = match &cli.config {
        Some(path) => ScanConfiguration::from_json_file(path)?,
        None => ScanConfiguration::default(),
    };
    config.apply_env_overrides();

    if let Some(format) = cli.format {
        config.report_format = format;
    } else if let Some(format) = cli.output.as_deref().and_then(format_from_extension) {
        config.report_format = format;
    }
    if let Some(algorithm) = cli.hash {
        config.hash_algorithm = algorithm;
    }
    if let Some(workers) = cli.workers {
        config.parallel_workers = workers;
    }
    if let Some(secs) = cli.timeout {
        config.scan_timeout_secs = Some(secs);
    }
    if cli.skip_hidden {
        config.skip_hidden_files = true;
    }

    let config = config.normalized();
    config.validate().context("invalid scan configuration")?;
    Ok(config)
}

fn format_from_extension(path: &Path) -> Option<ReportFormat> {
    path.extension()?.to_str()?.parse().ok()
}

fn default_output(format: ReportFormat) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    PathBuf::from(format!("scantrail-{stamp}.{}", format.extension()))
}
