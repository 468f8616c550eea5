//! Tracing configuration module for structured logging and observability
//!
//! The library only emits `log` records and `tracing` spans; the binary installs the subscriber
//! configured here. Records from the `log` facade are bridged into the same subscriber.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Default log file name, written next to the working directory when `--log-file` has no name
pub const DEFAULT_LOG_FILE: &str = "abgr_error.log";

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging for production environments
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file only
    File(PathBuf),
    /// Output to both console and file
    Both(PathBuf),
}

impl TracingOutput {
    fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Console => None,
            Self::File(path) | Self::Both(path) => Some(path),
        }
    }

    fn includes_console(&self) -> bool {
        !matches!(self, Self::File(_))
    }
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Output destination
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set output format
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set output destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for correlation across log lines
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: informational messages and above
            1 => "debug", // -v: internal state and computations
            _ => "trace", // -vv+: extremely detailed traces
        }
    }

    /// Initialize the global subscriber
    ///
    /// The returned guard flushes the log file when dropped; keep it alive for the whole run.
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<Option<WorkerGuard>> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let (file_writer, guard) = match self.output.file_path() {
            Some(path) => {
                let directory = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new(DEFAULT_LOG_FILE));
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (Some(writer), Some(guard))
            },
            None => (None, None),
        };
        let console_enabled = self.output.includes_console();

        #[cfg(feature = "tracing-json")]
        if self.format == TracingFormat::Json {
            let console_layer = console_enabled.then(|| {
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
            });
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_span_list(true)
            });
            Registry::default()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()?;
            self.announce_session();
            return Ok(guard);
        }

        let console_layer = console_enabled.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(self.format == TracingFormat::Console)
                .with_target(false)
                .with_level(true)
                .compact()
        });
        let file_layer = file_writer.map(|writer| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .compact()
        });

        Registry::default()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        self.announce_session();
        Ok(guard)
    }

    fn announce_session(&self) {
        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "🚀 Matting session started");
        }
    }
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Create a session span for the entire CLI operation
    #[must_use]
    pub fn session(session_id: &str, backend: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            backend = %backend,
            provider = %provider
        )
    }

    /// Create a span for model loading operations
    #[must_use]
    pub fn model_loading(model_path: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_path = %model_path.display()
        )
    }

    /// Create a span for batch processing operations
    #[must_use]
    pub fn batch_processing(file_count: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "batch_processing",
            file_count = %file_count
        )
    }
}
