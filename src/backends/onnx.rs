//! ONNX Runtime backend implementation for matting models
//!
//! Loads the model artifact from disk and runs it with the configured execution provider (CPU,
//! CUDA, `CoreML`). `Auto` prefers CUDA, then `CoreML`, and always keeps CPU as the fallback.

use crate::config::{ExecutionProvider, MattingConfig};
use crate::error::{MattingError, Result};
use crate::inference::InferenceBackend;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// ONNX Runtime backend for running matting models
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    initialized: bool,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    ///
    /// # Examples
    /// ```rust
    /// use abg_remover::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn select_providers(provider: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        match provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    vec![cuda.build()]
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    vec![coreml.build()]
                } else {
                    log::error!("🚫 CoreML execution provider requested but not available!");
                    log::error!("  - Falling back to CPU (will be much slower)");
                    Vec::new()
                }
            },
        }
    }

    fn load_error(
        model_path: &std::path::Path,
        stage: &str,
        cause: &dyn std::fmt::Display,
    ) -> MattingError {
        MattingError::model_load_error(model_path, &format!("{stage}: {cause}"), &[])
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &MattingConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_path = config.model_path.as_path();

        if !model_path.is_file() {
            return Err(MattingError::model_load_error(
                model_path,
                "file not found",
                &[
                    "place isnetis.onnx in the model directory next to the executable",
                    "pass --model <PATH>",
                ],
            ));
        }

        let load_error =
            |stage: &str, e: &dyn std::fmt::Display| Self::load_error(model_path, stage, e);

        let mut session_builder = Session::builder()
            .map_err(|e| load_error("failed to create session builder", &e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error("failed to set optimization level", &e))?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| load_error("failed to set execution providers", &e))?;
        }

        // Calculate optimal threading if auto-detect (0)
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| load_error("failed to set intra threads", &e))?
            .with_inter_threads(inter_threads)
            .map_err(|e| load_error("failed to set inter threads", &e))?
            .commit_from_file(model_path)
            .map_err(|e| load_error("malformed or unsupported model", &e))?;

        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &MattingConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None); // No model loading time for already initialized backend
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| MattingError::internal("ONNX session not initialized"))?;

        let failed = |cause: String| {
            MattingError::inference_error_with_backend("onnx", "Model inference", &cause)
        };

        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| failed(format!("failed to convert input tensor: {e}")))?;

        // Positional input and first output, so tensor names in the artifact do not matter
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| failed(e.to_string()))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| failed("no output tensors found".to_string()))?;
            outputs
                .get(first_key)
                .ok_or_else(|| failed("first output tensor not found".to_string()))?
                .try_extract_array::<f32>()
                .map_err(|e| failed(format!("failed to extract output tensor: {e}")))?
        };

        let output_shape = output_tensor.shape().to_vec();
        let output_data = output_tensor.view().to_owned();

        match output_shape.as_slice() {
            &[batch, channels, height, width] => Array4::from_shape_vec(
                (batch, channels, height, width),
                output_data.into_raw_vec_and_offset().0,
            )
            .map_err(|e| failed(format!("failed to reshape output tensor: {e}"))),
            &[batch, height, width] => Array4::from_shape_vec(
                (batch, 1, height, width),
                output_data.into_raw_vec_and_offset().0,
            )
            .map_err(|e| failed(format!("failed to reshape output tensor: {e}"))),
            other => Err(failed(format!(
                "expected 3D or 4D output tensor, got {}D",
                other.len()
            ))),
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

#[cfg(all(test, feature = "onnx"))]
mod tests {
    use super::*;
    use crate::config::BackendType;
    use std::path::PathBuf;

    #[test]
    fn test_onnx_backend_creation() {
        let backend = OnnxBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.name(), "onnx");
    }

    #[test]
    fn test_missing_model_is_model_load_error() {
        let mut backend = OnnxBackend::new();
        let config = MattingConfig::builder()
            .backend_type(BackendType::Onnx)
            .model_path(PathBuf::from("does/not/exist/isnetis.onnx"))
            .build()
            .unwrap();

        let result = backend.initialize(&config);
        assert!(matches!(result, Err(MattingError::ModelLoad(_))));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = OnnxBackend::new();
        assert!(backend.infer(&Array4::zeros((1, 3, 8, 8))).is_err());
    }
}
