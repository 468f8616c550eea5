//! Progress reporting service
//!
//! The batch worker only talks to a [`ProgressReporter`]; frontends decide what to do with the
//! notifications. [`ChannelProgressReporter`] forwards them as [`WorkerEvent`]s over a tokio channel
//! so a controlling thread or async task can subscribe.

use crate::{error::MattingError, worker::WorkerState};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Notification emitted by a running batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A file is about to be processed
    FileStarted {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    /// Overall batch progress in percent, non-decreasing
    Progress(u8),
    /// A single file failed
    FileFailed {
        index: usize,
        path: PathBuf,
        error: String,
    },
    /// The batch reached a terminal state
    Finished(WorkerState),
}

/// Trait for reporting progress of a batch
pub trait ProgressReporter: Send + Sync {
    /// Report overall progress in percent
    fn report_progress(&self, percent: u8);

    /// Report that the file at `index` is being processed
    fn report_file_started(&self, _index: usize, _total: usize, _path: &Path) {}

    /// Report a per-file failure
    fn report_file_error(&self, index: usize, path: &Path, error: &MattingError);

    /// Report the terminal state of the batch
    fn report_finished(&self, _state: WorkerState) {}
}

/// No-op progress reporter that discards all updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _percent: u8) {
        // Intentionally empty - discards progress updates
    }

    fn report_file_error(&self, _index: usize, _path: &Path, _error: &MattingError) {
        // Intentionally empty - discards error reports
    }
}

/// Console progress reporter that logs progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log each file as it starts
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, percent: u8) {
        log::info!("[{percent}%]");
    }

    fn report_file_started(&self, index: usize, total: usize, path: &Path) {
        if self.verbose {
            log::info!("[{}/{}] {}", index + 1, total, path.display());
        }
    }

    fn report_file_error(&self, index: usize, path: &Path, error: &MattingError) {
        log::error!("❌ File #{} ({}) failed: {}", index + 1, path.display(), error);
    }

    fn report_finished(&self, state: WorkerState) {
        log::info!("Batch finished: {state}");
    }
}

/// Reporter that forwards every notification as a [`WorkerEvent`]
#[derive(Debug, Clone)]
pub struct ChannelProgressReporter {
    sender: UnboundedSender<WorkerEvent>,
}

impl ChannelProgressReporter {
    #[must_use]
    pub fn new(sender: UnboundedSender<WorkerEvent>) -> Self {
        Self { sender }
    }

    /// Create a reporter together with the receiving end of its channel
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<WorkerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn send(&self, event: WorkerEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Progress receiver dropped, discarding event");
        }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report_progress(&self, percent: u8) {
        self.send(WorkerEvent::Progress(percent));
    }

    fn report_file_started(&self, index: usize, total: usize, path: &Path) {
        self.send(WorkerEvent::FileStarted {
            index,
            total,
            path: path.to_path_buf(),
        });
    }

    fn report_file_error(&self, index: usize, path: &Path, error: &MattingError) {
        self.send(WorkerEvent::FileFailed {
            index,
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }

    fn report_finished(&self, state: WorkerState) {
        self.send(WorkerEvent::Finished(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_progress_reporter() {
        let reporter = NoOpProgressReporter;
        reporter.report_progress(50);
        reporter.report_file_started(0, 1, Path::new("a.png"));
        reporter.report_file_error(0, Path::new("a.png"), &MattingError::decode("bad"));
        reporter.report_finished(WorkerState::Completed);
    }

    #[test]
    fn test_console_progress_reporter() {
        let reporter = ConsoleProgressReporter::new(true);
        reporter.report_file_started(2, 5, Path::new("c.png"));
        reporter.report_progress(39);
        reporter.report_file_error(2, Path::new("c.png"), &MattingError::inference("boom"));
        reporter.report_finished(WorkerState::Cancelled);
    }

    #[test]
    fn test_channel_reporter_forwards_events_in_order() {
        let (reporter, mut receiver) = ChannelProgressReporter::channel();

        reporter.report_file_started(0, 2, Path::new("a.png"));
        reporter.report_progress(0);
        reporter.report_file_error(1, Path::new("b.png"), &MattingError::decode("corrupt"));
        reporter.report_progress(49);
        reporter.report_finished(WorkerState::Completed);

        assert_eq!(
            receiver.try_recv().unwrap(),
            WorkerEvent::FileStarted {
                index: 0,
                total: 2,
                path: PathBuf::from("a.png")
            }
        );
        assert_eq!(receiver.try_recv().unwrap(), WorkerEvent::Progress(0));
        match receiver.try_recv().unwrap() {
            WorkerEvent::FileFailed { index, path, error } => {
                assert_eq!(index, 1);
                assert_eq!(path, PathBuf::from("b.png"));
                assert!(error.contains("corrupt"));
            },
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(receiver.try_recv().unwrap(), WorkerEvent::Progress(49));
        assert_eq!(
            receiver.try_recv().unwrap(),
            WorkerEvent::Finished(WorkerState::Completed)
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_reporter_survives_dropped_receiver() {
        let (reporter, receiver) = ChannelProgressReporter::channel();
        drop(receiver);
        reporter.report_progress(10);
        reporter.report_finished(WorkerState::Completed);
    }
}
