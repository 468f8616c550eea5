//! Integration tests for the batch worker
//!
//! Covers progress sequences, cancellation, error policies and output placement using real files
//! and the mock backend.

use abg_remover::{
    backends::{MockBackend, MockMask},
    BackendType, BatchJob, BatchWorker, CancelHandle, ErrorPolicy, InferenceSession,
    MattingConfig, MattingError, MattingPipeline, ProgressReporter, WorkerEvent, WorkerState,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::{atomic::Ordering, Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Reporter that records everything and can cancel after a number of progress emissions
#[derive(Default)]
struct RecordingReporter {
    progress: Mutex<Vec<u8>>,
    started: Mutex<Vec<usize>>,
    failed: Mutex<Vec<PathBuf>>,
    finished: Mutex<Option<WorkerState>>,
    cancel_after: Option<(usize, CancelHandle)>,
}

impl RecordingReporter {
    fn cancelling_after(emissions: usize, handle: CancelHandle) -> Self {
        Self {
            cancel_after: Some((emissions, handle)),
            ..Self::default()
        }
    }

    fn progress(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_progress(&self, percent: u8) {
        let mut progress = self.progress.lock().unwrap();
        progress.push(percent);
        if let Some((emissions, handle)) = &self.cancel_after {
            if progress.len() == *emissions {
                handle.cancel();
            }
        }
    }

    fn report_file_started(&self, index: usize, _total: usize, _path: &Path) {
        self.started.lock().unwrap().push(index);
    }

    fn report_file_error(&self, _index: usize, path: &Path, _error: &MattingError) {
        self.failed.lock().unwrap().push(path.to_path_buf());
    }

    fn report_finished(&self, state: WorkerState) {
        *self.finished.lock().unwrap() = Some(state);
    }
}

fn mock_pipeline(backend: MockBackend, policy: ErrorPolicy) -> MattingPipeline {
    let config = MattingConfig::builder()
        .backend_type(BackendType::Mock)
        .canvas_side(64)
        .error_policy(policy)
        .build()
        .expect("Failed to build config");
    MattingPipeline::with_session(Arc::new(InferenceSession::with_backend(
        config,
        Box::new(backend),
    )))
}

fn create_images(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            RgbImage::from_pixel(24, 16, Rgb([120, 60, 30]))
                .save(&path)
                .expect("Failed to write test image");
            path
        })
        .collect()
}

fn outputs_for(dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{stem}_mask.png")),
        dir.join(format!("{stem}_img.png")),
    )
}

#[test]
fn test_progress_sequence_for_three_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let inputs = create_images(temp_dir.path(), &["a.png", "b.png", "c.png"]);

    let mut worker = BatchWorker::new(mock_pipeline(MockBackend::default(), ErrorPolicy::default()));
    let mut job = BatchJob::new(inputs);
    let reporter = RecordingReporter::default();
    let report = worker.run(&mut job, &reporter);

    let progress = reporter.progress();
    assert_eq!(progress, vec![0, 33, 66, 100]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(report.state, WorkerState::Completed);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.last_progress, Some(100));
    assert_eq!(job.cursor(), 3);
    assert_eq!(*reporter.finished.lock().unwrap(), Some(WorkerState::Completed));

    for stem in ["a", "b", "c"] {
        let (mask, img) = outputs_for(temp_dir.path(), stem);
        assert!(mask.is_file(), "{} missing", mask.display());
        assert!(img.is_file(), "{} missing", img.display());
    }
}

#[test]
fn test_cancel_after_two_emissions_in_five_file_job() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let inputs = create_images(temp_dir.path(), &["1.png", "2.png", "3.png", "4.png", "5.png"]);

    let backend = MockBackend::default();
    let calls = backend.call_counter();
    let mut worker = BatchWorker::new(mock_pipeline(backend, ErrorPolicy::default()));
    let mut job = BatchJob::new(inputs);
    let reporter = RecordingReporter::cancelling_after(2, job.cancel_handle());
    let report = worker.run(&mut job, &reporter);

    let progress = reporter.progress();
    assert_eq!(progress.len(), 2);
    assert!(*progress.last().unwrap() < 100);
    assert!(calls.load(Ordering::SeqCst) <= 3);
    assert_eq!(report.state, WorkerState::Cancelled);
    assert_eq!(worker.state(), WorkerState::Cancelled);
    assert!(report.processed <= 3);

    // Files after the cancellation point were never touched
    let (mask, img) = outputs_for(temp_dir.path(), "5");
    assert!(!mask.exists());
    assert!(!img.exists());
}

#[test]
fn test_continue_on_error_reports_and_advances() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut inputs = create_images(temp_dir.path(), &["a.png", "c.png"]);
    let broken = temp_dir.path().join("b.png");
    std::fs::write(&broken, b"not an image").unwrap();
    inputs.insert(1, broken.clone());

    let mut worker = BatchWorker::new(mock_pipeline(
        MockBackend::default(),
        ErrorPolicy::ContinueOnError,
    ));
    let mut job = BatchJob::new(inputs);
    let reporter = RecordingReporter::default();
    let report = worker.run(&mut job, &reporter);

    assert_eq!(report.state, WorkerState::Completed);
    assert_eq!(reporter.progress(), vec![0, 33, 66, 100]);
    assert_eq!(*reporter.failed.lock().unwrap(), vec![broken.clone()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, broken);
    assert_eq!(report.succeeded, 2);
    assert!(outputs_for(temp_dir.path(), "c").1.is_file());
}

#[test]
fn test_abort_on_first_error_stops_the_batch() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let inputs = create_images(temp_dir.path(), &["a.png", "b.png", "c.png"]);

    let backend = MockBackend::default().fail_on_call(1);
    let mut worker = BatchWorker::new(mock_pipeline(backend, ErrorPolicy::AbortOnFirstError));
    let mut job = BatchJob::new(inputs);
    let reporter = RecordingReporter::default();
    let report = worker.run(&mut job, &reporter);

    assert_eq!(report.state, WorkerState::Failed);
    assert_eq!(reporter.progress(), vec![0]);
    assert_eq!(*reporter.started.lock().unwrap(), vec![0, 1]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("injected failure"));
    assert!(!outputs_for(temp_dir.path(), "c").1.exists());
}

#[test]
fn test_model_load_failure_is_fatal_under_continue_policy() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let inputs = create_images(temp_dir.path(), &["a.png", "b.png"]);

    let backend = MockBackend::default().fail_initialize();
    let mut worker = BatchWorker::new(mock_pipeline(backend, ErrorPolicy::ContinueOnError));
    let mut job = BatchJob::new(inputs);
    let reporter = RecordingReporter::default();
    let report = worker.run(&mut job, &reporter);

    assert_eq!(report.state, WorkerState::Failed);
    assert!(reporter.progress().is_empty());
    assert_eq!(report.processed, 1);
}

#[test]
fn test_output_dir_override_and_fallback() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let source_dir = temp_dir.path().join("source");
    let output_dir = temp_dir.path().join("out");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();
    let inputs = create_images(&source_dir, &["photo.png"]);

    // Existing override directory receives the outputs
    let mut worker = BatchWorker::new(mock_pipeline(MockBackend::default(), ErrorPolicy::default()));
    let mut job = BatchJob::new(inputs.clone()).with_output_dir(Some(&output_dir));
    worker.run(&mut job, &RecordingReporter::default());
    assert!(output_dir.join("photo_img.png").is_file());
    assert!(output_dir.join("photo_mask.png").is_file());
    assert!(!source_dir.join("photo_img.png").exists());

    // Missing override directory falls back to the source directory
    let mut worker = BatchWorker::new(mock_pipeline(MockBackend::default(), ErrorPolicy::default()));
    let mut job =
        BatchJob::new(inputs).with_output_dir(Some(temp_dir.path().join("does-not-exist")));
    let report = worker.run(&mut job, &RecordingReporter::default());
    assert_eq!(report.state, WorkerState::Completed);
    assert!(source_dir.join("photo_img.png").is_file());
    assert!(source_dir.join("photo_mask.png").is_file());
}

#[test]
fn test_configured_output_dir_applies_without_job_override() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let source_dir = temp_dir.path().join("source");
    let output_dir = temp_dir.path().join("configured");
    let override_dir = temp_dir.path().join("override");
    for dir in [&source_dir, &output_dir, &override_dir] {
        std::fs::create_dir_all(dir).unwrap();
    }
    let inputs = create_images(&source_dir, &["cat.png"]);

    let config = MattingConfig::builder()
        .backend_type(BackendType::Mock)
        .canvas_side(64)
        .output_dir(Some(&output_dir))
        .build()
        .expect("Failed to build config");
    let session = Arc::new(InferenceSession::with_backend(
        config,
        Box::new(MockBackend::default()),
    ));

    let mut worker = BatchWorker::new(MattingPipeline::with_session(session.clone()));
    let report = worker.run(&mut BatchJob::new(inputs.clone()), &RecordingReporter::default());
    assert_eq!(report.state, WorkerState::Completed);
    assert!(output_dir.join("cat_img.png").is_file());
    assert!(output_dir.join("cat_mask.png").is_file());
    assert!(!source_dir.join("cat_img.png").exists());
    assert!(!source_dir.join("cat_mask.png").exists());

    // A job-level directory wins over the configured one
    let mut worker = BatchWorker::new(MattingPipeline::with_session(session));
    let mut job = BatchJob::new(inputs).with_output_dir(Some(&override_dir));
    worker.run(&mut job, &RecordingReporter::default());
    assert!(override_dir.join("cat_img.png").is_file());
    assert!(override_dir.join("cat_mask.png").is_file());
}

#[cfg(unix)]
#[test]
fn test_write_failure_is_reported_without_partial_files() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let source_dir = temp_dir.path().join("readonly");
    std::fs::create_dir_all(&source_dir).unwrap();
    let inputs = create_images(&source_dir, &["photo.png"]);
    std::fs::set_permissions(&source_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    // Running as root ignores directory permissions
    let probe = source_dir.join(".probe");
    if std::fs::write(&probe, b"").is_ok() {
        std::fs::remove_file(&probe).unwrap();
        std::fs::set_permissions(&source_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        eprintln!("Directory permissions not enforced, skipping write failure test");
        return;
    }

    let mut worker = BatchWorker::new(mock_pipeline(MockBackend::default(), ErrorPolicy::default()));
    let mut job = BatchJob::new(inputs);
    let reporter = RecordingReporter::default();
    let report = worker.run(&mut job, &reporter);

    std::fs::set_permissions(&source_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(report.state, WorkerState::Completed);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("photo_img.png"));
    assert!(report.failures[0].error.contains("photo_mask.png"));
    let leftovers: Vec<_> = std::fs::read_dir(&source_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("photo.png")]);
}

#[test]
fn test_spawned_worker_can_be_cancelled() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let names: Vec<String> = (0..6).map(|i| format!("{i}.png")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let inputs = create_images(temp_dir.path(), &names);

    let backend = MockBackend::new(MockMask::Constant(0.5)).with_delay(Duration::from_millis(50));
    let worker = BatchWorker::new(mock_pipeline(backend, ErrorPolicy::default()));
    let mut handle = worker.spawn(BatchJob::new(inputs)).unwrap();

    let mut progress = Vec::new();
    let mut finished = None;
    while let Some(event) = handle.events().blocking_recv() {
        match event {
            WorkerEvent::Progress(percent) => {
                progress.push(percent);
                if progress.len() == 1 {
                    handle.cancel();
                }
            },
            WorkerEvent::Finished(state) => finished = Some(state),
            WorkerEvent::FileStarted { .. } | WorkerEvent::FileFailed { .. } => {},
        }
    }

    let report = handle.join().unwrap();
    assert_eq!(finished, Some(WorkerState::Cancelled));
    assert_eq!(report.state, WorkerState::Cancelled);
    assert!(report.processed < 6);
    assert!(progress.iter().all(|&p| p < 100));
}
