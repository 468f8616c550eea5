#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # abg-remover
//!
//! Foreground matting for batches of photos. For every input image the pipeline produces an
//! opacity mask and a composite where the background is replaced by white and the mask becomes
//! the alpha channel.
//!
//! The pipeline letterboxes the image onto a square canvas, runs an `ISNet`-style matting model on
//! it, maps the predicted mask back to the original frame and composites the outputs.
//!
//! ## Features
//!
//! - **Multiple Backends**: ONNX Runtime (CPU, CUDA, `CoreML`) and Tract (Pure Rust), plus a
//!   deterministic mock backend for tests and dry runs
//! - **Format Support**: PNG, JPEG, BMP, TIFF and WebP, chosen by output file extension
//! - **Batch Worker**: progress reporting, cooperative cancellation and a configurable error policy
//! - **Atomic Writes**: outputs are written to a temporary file and renamed into place
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use abg_remover::{BatchJob, BatchWorker, MattingConfig, MattingPipeline, NoOpProgressReporter};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = MattingConfig::builder()
//!     .model_path("model/isnetis.onnx")
//!     .build()?;
//! let pipeline = MattingPipeline::new(config)?;
//!
//! let mut job = BatchJob::new(["portrait.jpg", "product.png"]);
//! let report = BatchWorker::new(pipeline).run(&mut job, &NoOpProgressReporter);
//! println!("{}: {} of {} succeeded", report.state, report.succeeded, report.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Single Image
//!
//! ```rust
//! use abg_remover::{
//!     backends::{MockBackend, MockMask},
//!     BackendType, InferenceSession, MattingConfig, MattingPipeline,
//! };
//! use image::{Rgb, RgbImage};
//! use std::sync::Arc;
//!
//! let config = MattingConfig::builder()
//!     .backend_type(BackendType::Mock)
//!     .canvas_side(64)
//!     .build()
//!     .unwrap();
//! let backend = MockBackend::new(MockMask::Constant(1.0));
//! let session = Arc::new(InferenceSession::with_backend(config, Box::new(backend)));
//! let pipeline = MattingPipeline::with_session(session);
//!
//! let image = RgbImage::from_pixel(40, 20, Rgb([10, 20, 30]));
//! let outputs = pipeline.matte(&image).unwrap();
//! assert_eq!(outputs.composited.get_pixel(0, 0).0, [10, 20, 30, 255]);
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface, progress bar and tracing subscriber
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod worker;

// Public API exports
pub use config::{
    BackendType, EncodeParams, ErrorPolicy, ExecutionProvider, MattingConfig,
    MattingConfigBuilder,
};
pub use error::{MattingError, Result};
pub use inference::{
    BackendFactory, DefaultBackendFactory, InferenceBackend, InferenceSession,
    PreparedBackendFactory,
};
pub use processor::{MattingPipeline, OutputPaths};
pub use services::{
    ChannelProgressReporter, ConsoleProgressReporter, ImageCodec, NoOpProgressReporter,
    OutputFormat, ProgressReporter, WorkerEvent,
};
pub use types::{mask_to_alpha, Mask, OutputPair};
pub use utils::{Letterbox, LetterboxGeometry};
pub use worker::{
    progress_percent, BatchJob, BatchReport, BatchWorker, CancelHandle, FileFailure,
    WorkerHandle, WorkerState,
};
