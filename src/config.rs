//! Configuration types for matting operations

use crate::error::{MattingError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default side length of the square model canvas
pub const DEFAULT_CANVAS_SIDE: u32 = 1024;

/// Largest accepted canvas side; the float canvas alone is `3 * side^2` values
pub const MAX_CANVAS_SIDE: u32 = 4096;

/// Model artifact location relative to the executable's directory
pub const DEFAULT_MODEL_SUBPATH: &str = "model/isnetis.onnx";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
    /// Deterministic mask generator, no model file required
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// What the batch worker does when a single file fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Report the failure, advance the cursor and keep going
    #[default]
    ContinueOnError,
    /// Stop the batch on the first failed file
    AbortOnFirstError,
}

/// Encoder parameters applied when writing outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeParams {
    /// JPEG quality (1-100, only used for JPEG output)
    pub jpeg_quality: u8,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self { jpeg_quality: 95 }
    }
}

/// Resolve the default model path next to the running executable
///
/// Falls back to a path relative to the working directory when the executable location cannot be
/// determined.
#[must_use]
pub fn default_model_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map_or_else(
            || PathBuf::from(DEFAULT_MODEL_SUBPATH),
            |dir| dir.join(DEFAULT_MODEL_SUBPATH),
        )
}

/// Configuration for the matting pipeline, its session and the batch worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MattingConfig {
    /// Path to the model artifact
    pub model_path: PathBuf,

    /// Backend used to run the model
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Side length S of the square model canvas
    pub canvas_side: u32,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Output directory for batches whose job sets none (used only when it exists)
    pub output_dir: Option<PathBuf>,

    /// Per-file failure handling in batches
    pub error_policy: ErrorPolicy,

    /// Encoder parameters for written outputs
    pub encode_params: EncodeParams,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::default(),
            canvas_side: DEFAULT_CANVAS_SIDE,
            intra_threads: 0,
            inter_threads: 0,
            output_dir: None,
            error_policy: ErrorPolicy::default(),
            encode_params: EncodeParams::default(),
        }
    }
}

impl MattingConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use abg_remover::{BackendType, ErrorPolicy, MattingConfig};
    ///
    /// let config = MattingConfig::builder()
    ///     .backend_type(BackendType::Mock)
    ///     .error_policy(ErrorPolicy::AbortOnFirstError)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.canvas_side, 1024);
    /// ```
    #[must_use]
    pub fn builder() -> MattingConfigBuilder {
        MattingConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.canvas_side == 0 {
            return Err(MattingError::invalid_config(
                "canvas side must be greater than zero",
            ));
        }
        if self.canvas_side > MAX_CANVAS_SIDE {
            return Err(MattingError::invalid_config(format!(
                "canvas side must be at most {MAX_CANVAS_SIDE}, got {}",
                self.canvas_side
            )));
        }
        if self.encode_params.jpeg_quality == 0 || self.encode_params.jpeg_quality > 100 {
            return Err(MattingError::invalid_config(format!(
                "JPEG quality must be 1-100, got {}",
                self.encode_params.jpeg_quality
            )));
        }
        if self.backend_type != BackendType::Mock && self.model_path.as_os_str().is_empty() {
            return Err(MattingError::invalid_config("model path is empty"));
        }
        Ok(())
    }
}

/// Builder for [`MattingConfig`]
#[derive(Debug, Default)]
pub struct MattingConfigBuilder {
    config: MattingConfig,
}

impl MattingConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MattingConfig::default(),
        }
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = path.into();
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn canvas_side(mut self, side: u32) -> Self {
        self.config.canvas_side = side;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.config.output_dir = dir.map(Into::into);
        self
    }

    #[must_use]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.encode_params.jpeg_quality = quality;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Canvas side of zero or above [`MAX_CANVAS_SIDE`]
    /// - JPEG quality outside 1-100
    /// - Empty model path for a model-backed backend
    pub fn build(self) -> Result<MattingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MattingConfig::default();
        assert_eq!(config.canvas_side, DEFAULT_CANVAS_SIDE);
        assert_eq!(config.backend_type, BackendType::Onnx);
        assert_eq!(config.error_policy, ErrorPolicy::ContinueOnError);
        assert!(config.output_dir.is_none());
        assert!(config.model_path.ends_with(DEFAULT_MODEL_SUBPATH));
    }

    #[test]
    fn test_builder_chain() {
        let config = MattingConfig::builder()
            .model_path("/opt/models/isnetis.onnx")
            .backend_type(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cpu)
            .canvas_side(512)
            .output_dir(Some("/tmp/out"))
            .error_policy(ErrorPolicy::AbortOnFirstError)
            .jpeg_quality(80)
            .build()
            .unwrap();

        assert_eq!(config.model_path, PathBuf::from("/opt/models/isnetis.onnx"));
        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.canvas_side, 512);
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.error_policy, ErrorPolicy::AbortOnFirstError);
        assert_eq!(config.encode_params.jpeg_quality, 80);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(MattingConfig::builder().canvas_side(0).build().is_err());
        assert!(MattingConfig::builder()
            .canvas_side(MAX_CANVAS_SIDE + 1)
            .build()
            .is_err());
        assert!(MattingConfig::builder()
            .canvas_side(MAX_CANVAS_SIDE)
            .build()
            .is_ok());
        assert!(MattingConfig::builder().jpeg_quality(0).build().is_err());
        assert!(MattingConfig::builder().jpeg_quality(101).build().is_err());
        assert!(MattingConfig::builder()
            .model_path("")
            .backend_type(BackendType::Onnx)
            .build()
            .is_err());
        assert!(MattingConfig::builder()
            .model_path("")
            .backend_type(BackendType::Mock)
            .build()
            .is_ok());
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ExecutionProvider::CoreMl.to_string(), "coreml");
        assert_eq!(BackendType::Tract.to_string(), "tract");
    }
}
