//! Error types for matting operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for matting operations
pub type Result<T> = std::result::Result<T, MattingError>;

/// Error taxonomy for the matting pipeline and batch worker
///
/// `Decode`, `Inference` and `EncodeWrite` are per-file failures: the batch worker isolates them
/// according to its [`ErrorPolicy`](crate::config::ErrorPolicy). `ModelLoad` is fatal: no file can
/// be processed without a session.
#[derive(Error, Debug)]
pub enum MattingError {
    /// Input could not be read or is not a supported image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Model artifact missing or malformed
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Model invocation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Output could not be encoded or written
    #[error("Encode/write error: {0}")]
    EncodeWrite(String),

    /// Input/output errors outside of decode and write (directory checks, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor or geometry errors inside the pipeline
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MattingError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new encode/write error
    pub fn encode_write<S: Into<String>>(msg: S) -> Self {
        Self::EncodeWrite(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Decode failure with path and cause
    pub fn decode_error<P: AsRef<Path>>(path: P, cause: impl std::fmt::Display) -> Self {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::Decode(format!(
            "Failed to decode '{}' (extension: {}): {}",
            path_ref.display(),
            extension,
            cause
        ))
    }

    /// Model load failure with troubleshooting hints
    pub fn model_load_error<P: AsRef<Path>>(
        model_path: P,
        cause: &str,
        suggestions: &[&str],
    ) -> Self {
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::ModelLoad(format!(
            "Failed to load model '{}': {}.{}",
            model_path.as_ref().display(),
            cause,
            suggestion_text
        ))
    }

    /// Encode or write failure for a specific output path
    pub fn encode_write_error<P: AsRef<Path>>(path: P, cause: impl std::fmt::Display) -> Self {
        Self::EncodeWrite(format!(
            "Failed to write '{}': {}",
            path.as_ref().display(),
            cause
        ))
    }

    /// Inference failure naming the backend that produced it
    pub fn inference_error_with_backend(backend: &str, operation: &str, cause: &str) -> Self {
        Self::Inference(format!("{operation} failed using '{backend}' backend: {cause}"))
    }

    /// Whether this error is confined to a single file of a batch
    #[must_use]
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Inference(_) | Self::EncodeWrite(_) | Self::Processing(_)
        )
    }
}
