//! Service layer for image I/O, output formats and progress reporting

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormat;
pub use io::ImageCodec;
pub use progress::{
    ChannelProgressReporter, ConsoleProgressReporter, NoOpProgressReporter, ProgressReporter,
    WorkerEvent,
};
