//! Sequential batch worker with progress reporting and cooperative cancellation
//!
//! A [`BatchWorker`] walks a [`BatchJob`] one file at a time. After each file it emits
//! `floor(index * 99 / count)` where `index` is the position of the file just handled, and it
//! emits exactly 100 once every file has been attempted. Cancellation is checked once per
//! iteration, before the next file starts; an in-flight file always finishes.

use crate::{
    config::ErrorPolicy,
    error::{MattingError, Result},
    processor::{MattingPipeline, OutputPaths},
    services::progress::{ChannelProgressReporter, ProgressReporter, WorkerEvent},
};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::instrument;

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    Running,
    /// Every file was attempted and 100% was emitted
    Completed,
    /// The run flag was cleared before the batch was exhausted
    Cancelled,
    /// A fatal error (or any error under [`ErrorPolicy::AbortOnFirstError`]) stopped the batch
    Failed,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Shared run flag of a batch; clearing it requests cancellation
#[derive(Debug, Clone)]
pub struct CancelHandle {
    running: Arc<AtomicBool>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clear the run flag; the worker stops after the file in progress
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered inputs, an optional output directory override, a cursor and the run flag
#[derive(Debug, Clone)]
pub struct BatchJob {
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    cursor: usize,
    run_flag: CancelHandle,
}

impl BatchJob {
    #[must_use]
    pub fn new<I, P>(inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output_dir: None,
            cursor: 0,
            run_flag: CancelHandle::new(),
        }
    }

    /// Write outputs into `dir` when it exists at processing time.
    ///
    /// Takes precedence over [`MattingConfig::output_dir`](crate::MattingConfig::output_dir).
    #[must_use]
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.output_dir = dir.map(Into::into);
        self
    }

    #[must_use]
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    #[must_use]
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Index of the next file to process
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Handle that cancels this job from another thread
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.run_flag.clone()
    }
}

/// One failed input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub index: usize,
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub state: WorkerState,
    pub total: usize,
    /// Files attempted, successful or not
    pub processed: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
    /// Last progress value emitted, `None` if nothing was emitted
    pub last_progress: Option<u8>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Progress value emitted after the file at `index` of `count`
#[must_use]
pub fn progress_percent(index: usize, count: usize) -> u8 {
    if count == 0 {
        return 100;
    }
    (index.saturating_mul(99) / count).min(99) as u8
}

/// Runs a [`MattingPipeline`] over a [`BatchJob`]
#[derive(Debug)]
pub struct BatchWorker {
    pipeline: MattingPipeline,
    error_policy: ErrorPolicy,
    state: WorkerState,
}

impl BatchWorker {
    /// Create a worker using the error policy of the pipeline's configuration
    #[must_use]
    pub fn new(pipeline: MattingPipeline) -> Self {
        let error_policy = pipeline.session().config().error_policy;
        Self {
            pipeline,
            error_policy,
            state: WorkerState::Idle,
        }
    }

    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[must_use]
    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// Process `job` on the calling thread until it completes, is cancelled or fails
    #[instrument(skip_all, fields(files = job.len(), policy = ?self.error_policy))]
    pub fn run(&mut self, job: &mut BatchJob, reporter: &dyn ProgressReporter) -> BatchReport {
        let start = Instant::now();
        let total = job.len();
        let mut processed = 0;
        let mut failures = Vec::new();
        let mut last_progress = None;

        let output_dir = job
            .output_dir()
            .map(Path::to_path_buf)
            .or_else(|| self.pipeline.session().config().output_dir.clone());

        self.state = WorkerState::Running;
        log::info!("Starting batch of {total} file(s)");

        let final_state = loop {
            if job.run_flag.is_cancelled() {
                log::info!("Batch cancelled at {}/{}", job.cursor, total);
                break WorkerState::Cancelled;
            }

            let index = job.cursor;
            let Some(input) = job.inputs.get(index).cloned() else {
                reporter.report_progress(100);
                last_progress = Some(100);
                break WorkerState::Completed;
            };

            reporter.report_file_started(index, total, &input);
            log::info!("[{}/{}] {}", index + 1, total, input.display());

            let outcome = OutputPaths::derive(&input, output_dir.as_deref())
                .and_then(|outputs| self.pipeline.process_file(&input, &outputs));
            processed += 1;

            if let Err(error) = outcome {
                log::error!("Failed to process {}: {}", input.display(), error);
                reporter.report_file_error(index, &input, &error);
                let fatal = !error.is_per_file();
                failures.push(FileFailure {
                    index,
                    path: input,
                    error: error.to_string(),
                });

                if fatal || self.error_policy == ErrorPolicy::AbortOnFirstError {
                    break WorkerState::Failed;
                }
            }

            let percent = progress_percent(index, total);
            reporter.report_progress(percent);
            last_progress = Some(percent);
            job.cursor += 1;
        };

        self.state = final_state;
        reporter.report_finished(final_state);

        let report = BatchReport {
            state: final_state,
            total,
            processed,
            succeeded: processed - failures.len(),
            failures,
            last_progress,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        log::info!(
            "Batch {}: {}/{} succeeded in {}ms",
            report.state,
            report.succeeded,
            report.total,
            report.elapsed_ms
        );
        report
    }

    /// Run `job` on a dedicated thread, delivering [`WorkerEvent`]s over a channel
    ///
    /// # Errors
    /// - The worker thread could not be spawned
    pub fn spawn(self, job: BatchJob) -> Result<WorkerHandle> {
        let cancel = job.cancel_handle();
        let (reporter, events) = ChannelProgressReporter::channel();

        let thread = std::thread::Builder::new()
            .name("abg-worker".to_string())
            .spawn(move || {
                let mut worker = self;
                let mut job = job;
                worker.run(&mut job, &reporter)
            })?;

        Ok(WorkerHandle {
            cancel,
            events,
            thread,
        })
    }
}

/// Controller side of a spawned batch
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancelHandle,
    events: UnboundedReceiver<WorkerEvent>,
    thread: JoinHandle<BatchReport>,
}

impl WorkerHandle {
    /// Request cancellation; the file in progress still finishes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Event stream; it ends once the worker thread has finished
    pub fn events(&mut self) -> &mut UnboundedReceiver<WorkerEvent> {
        &mut self.events
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker thread and return its report
    ///
    /// # Errors
    /// - The worker thread panicked
    pub fn join(self) -> Result<BatchReport> {
        self.thread
            .join()
            .map_err(|_| MattingError::internal("Batch worker thread panicked"))
    }
}
