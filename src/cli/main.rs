//! Foreground matting CLI tool
//!
//! Command-line interface that runs the matting pipeline over files and directories, writing a
//! `<stem>_mask` and a `<stem>_img` output next to each input.

use super::config::CliConfigBuilder;
use crate::{
    config::{DEFAULT_CANVAS_SIDE, MAX_CANVAS_SIDE},
    inference::{BackendFactory, DefaultBackendFactory},
    processor::{MattingPipeline, OutputPaths},
    services::{ConsoleProgressReporter, ImageCodec, WorkerEvent},
    tracing_config::{spans, TracingConfig, TracingFormat, TracingOutput},
    worker::{BatchJob, BatchReport, BatchWorker, CancelHandle, WorkerState},
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Instrument;

/// Exit code used when the batch was interrupted with Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// Foreground matting tool: writes an opacity mask and a white-backed composite per image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "abg-remover")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Vec<PathBuf>,

    /// Write outputs into this directory instead of next to each input (ignored if it does not exist)
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to the ONNX matting model [default: <executable dir>/model/isnetis.onnx]
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Execution provider in format backend:provider (onnx:auto, onnx:cpu, onnx:cuda, onnx:coreml, tract, mock)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Side length of the square model canvas
    #[arg(
        long,
        default_value_t = DEFAULT_CANVAS_SIDE,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_CANVAS_SIDE))
    )]
    pub side: u32,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// JPEG quality (1-100) for JPEG outputs
    #[arg(long, default_value_t = 95)]
    pub jpeg_quality: u8,

    /// Stop the batch on the first failed file
    #[arg(long)]
    pub fail_fast: bool,

    /// Only pick up .png files
    #[arg(long)]
    pub png_only: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for files found in directories (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Also write log output to this file (e.g., abgr_error.log)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Write the batch report as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show backend and execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

pub async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let session_id = uuid::Uuid::new_v4().to_string();
    let _log_guard = init_tracing(&cli, &session_id).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(ExitCode::SUCCESS);
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let span = spans::session(
        &session_id,
        &config.backend_type.to_string(),
        &config.execution_provider.to_string(),
    );
    run(&cli, config).instrument(span).await
}

async fn run(cli: &Cli, config: crate::MattingConfig) -> Result<ExitCode> {
    info!("Starting foreground matting CLI");
    info!(
        "Backend: {}, Provider: {}",
        config.backend_type, config.execution_provider
    );
    info!("Model: {}", config.model_path.display());

    if let Some(dir) = &config.output_dir {
        if !dir.is_dir() {
            warn!(
                "Output directory {} does not exist, writing next to each input instead",
                dir.display()
            );
        }
    }

    let pipeline = MattingPipeline::new(config).context("Failed to create matting pipeline")?;

    // The model is loaded up front so a missing or broken artifact stops the run before any file
    {
        let _span = spans::model_loading(&pipeline.session().config().model_path).entered();
        match pipeline.session().ensure_loaded() {
            Ok(Some(load_time)) => info!("Model loaded in {}ms", load_time.as_millis()),
            Ok(None) => {},
            Err(e) => {
                error!("{e}");
                return Err(e).context("Failed to load the matting model");
            },
        }
    }

    let inputs = collect_inputs(cli)?;
    if inputs.is_empty() {
        warn!("No supported image files found in the provided inputs");
    } else {
        info!("Found {} image file(s) to process", inputs.len());
    }

    let job = BatchJob::new(inputs);
    tokio::spawn(cancel_on_ctrl_c(job.cancel_handle()));

    let batch_span = spans::batch_processing(job.len());
    let worker = BatchWorker::new(pipeline);
    let report = run_batch(worker, job, cli.verbose > 0)
        .instrument(batch_span)
        .await?;

    print_summary(&report);

    if let Some(path) = &cli.summary_json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    Ok(ExitCode::from(exit_status(&report)))
}

/// Run the batch, drawing a progress bar when attached to a terminal
async fn run_batch(worker: BatchWorker, job: BatchJob, verbose: bool) -> Result<BatchReport> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );

    if bar.is_hidden() {
        let reporter = ConsoleProgressReporter::new(verbose);
        let report = tokio::task::spawn_blocking(move || {
            let mut worker = worker;
            let mut job = job;
            worker.run(&mut job, &reporter)
        })
        .await
        .context("Batch worker task failed")?;
        return Ok(report);
    }

    let mut handle = worker.spawn(job).context("Failed to start batch worker")?;
    while let Some(event) = handle.events().recv().await {
        match event {
            WorkerEvent::FileStarted { index, total, path } => {
                bar.set_message(format!("[{}/{}] {}", index + 1, total, display_name(&path)));
            },
            WorkerEvent::Progress(percent) => bar.set_position(u64::from(percent)),
            WorkerEvent::FileFailed { path, error, .. } => {
                bar.println(format!("❌ {}: {}", path.display(), error));
            },
            WorkerEvent::Finished(state) => bar.set_message(state.to_string()),
        }
    }

    let report = handle.join()?;
    if report.state == WorkerState::Completed {
        bar.finish();
    } else {
        bar.abandon();
    }
    Ok(report)
}

async fn cancel_on_ctrl_c(cancel: CancelHandle) {
    if wait_for_interrupts(cancel, tokio::signal::ctrl_c).await {
        warn!("Second interrupt received, exiting immediately");
        std::process::exit(i32::from(EXIT_CANCELLED));
    }
}

/// Cancel the batch on the first interrupt; returns `true` once a second one arrives
async fn wait_for_interrupts<S, F>(cancel: CancelHandle, mut signal: S) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if signal().await.is_err() {
        return false;
    }
    warn!("Interrupt received, stopping after the current file (press Ctrl-C again to exit now)");
    cancel.cancel();

    signal().await.is_ok()
}

/// Initialize tracing based on verbosity level and the optional log file
fn init_tracing(
    cli: &Cli,
    session_id: &str,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let output = match &cli.log_file {
        Some(path) => TracingOutput::Both(path.clone()),
        None => TracingOutput::Console,
    };

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_output(output)
        .with_session_id(session_id)
        .init()
        .context("Failed to initialize tracing subscriber")
}

/// Display backend and execution provider diagnostics
fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🔧 Available Backends:");
    for backend in DefaultBackendFactory.available_backends() {
        println!("  • {backend}");
    }

    #[cfg(feature = "onnx")]
    {
        println!("\n🚀 ONNX Runtime Execution Providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available {
                "✅ Available"
            } else {
                "❌ Not Available"
            };
            println!("  • {name}: {status} - {description}");
        }
    }
}

/// Expand the CLI inputs into the ordered list of files to process
///
/// Inputs keep their command-line order; files found in a directory are sorted by path. A file
/// named more than once is processed at its first position only. Explicit paths that do not
/// exist are kept so the batch reports them as failed inputs.
fn collect_inputs(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in &cli.input {
        if path.is_dir() {
            let mut found =
                find_image_files(path, cli.recursive, cli.pattern.as_deref(), cli.png_only)?;
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            if is_image_file(path, cli.png_only) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else {
            warn!("Input path does not exist: {}", path.display());
            files.push(path.clone());
        }
    }

    let mut seen = HashSet::new();
    files.retain(|path| seen.insert(path.clone()));
    Ok(files)
}

/// Find image files in a directory, leaving out the outputs of earlier runs
fn find_image_files(
    dir: &Path,
    recursive: bool,
    pattern: Option<&str>,
    png_only: bool,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let max_depth = if recursive { usize::MAX } else { 1 };

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if OutputPaths::is_output_file(path) {
                continue;
            }
            if is_image_file(path, png_only) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok(files)
}

/// Check if file is an image the codec can handle
fn is_image_file(path: &Path, png_only: bool) -> bool {
    if png_only {
        return path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    }
    ImageCodec::is_supported_format(path)
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            } else {
                false
            }
        },
        None => true,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn print_summary(report: &BatchReport) {
    info!(
        "Batch {}: {} succeeded, {} failed, {} of {} attempted in {:.2}s",
        report.state,
        report.succeeded,
        report.failures.len(),
        report.processed,
        report.total,
        report.elapsed_ms as f64 / 1000.0
    );
    for failure in &report.failures {
        error!("  {}: {}", failure.path.display(), failure.error);
    }
}

fn exit_status(report: &BatchReport) -> u8 {
    match report.state {
        WorkerState::Completed if !report.has_failures() => 0,
        WorkerState::Cancelled if !report.has_failures() => EXIT_CANCELLED,
        _ => 1,
    }
}
