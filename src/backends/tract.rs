//! Tract backend implementation for matting models
//!
//! Pure Rust inference with no native dependencies. The input fact is pinned to
//! `(1, 3, S, S)` before optimization, so the canvas side must match the one the session is
//! configured with.

use crate::config::MattingConfig;
use crate::error::{MattingError, Result};
use crate::inference::InferenceBackend;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running matting models using pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    initialized: bool,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and initialize the model using Tract
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

        log::info!("🚀 Initializing Tract Backend");
        log::info!("📦 Backend: Tract (Pure Rust)");
        log::debug!("Creating Tract model from {}", model_path.display());

        let side = config.canvas_side as usize;
        let load_error = |stage: &str, e: &dyn std::fmt::Display| {
            MattingError::model_load_error(model_path, &format!("{stage}: {e}"), &[])
        };

        let model = onnx()
            .model_for_path(model_path)
            .map_err(|e| load_error("failed to load ONNX model", &e))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| load_error("failed to set input shape", &e))?
            .into_optimized()
            .map_err(|e| load_error("failed to optimize model", &e))?
            .into_runnable()
            .map_err(|e| load_error("failed to create runnable model", &e))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {:.2}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &MattingConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None); // No model loading time for already initialized backend
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| MattingError::internal("Tract model not initialized"))?;

        let failed = |cause: String| {
            MattingError::inference_error_with_backend("tract", "Model inference", &cause)
        };

        log::debug!("🔮 Running Tract inference on {:?}", input.shape());

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| failed(e.to_string()))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| failed("no output tensor found".to_string()))?
            .into_arc_tensor();

        let output_data = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| failed(format!("failed to convert output tensor: {e}")))?;

        let shape = match *output_data.shape() {
            [batch, channels, height, width] => (batch, channels, height, width),
            [batch, height, width] => (batch, 1, height, width),
            ref other => {
                return Err(failed(format!(
                    "expected 3D or 4D output tensor, got {}D",
                    other.len()
                )))
            },
        };

        Array4::from_shape_vec(shape, output_data.iter().copied().collect())
            .map_err(|e| failed(format!("failed to reshape output tensor: {e}")))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;
    use crate::config::BackendType;

    #[test]
    fn test_tract_backend_creation() {
        let backend = TractBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.name(), "tract");
    }

    #[test]
    fn test_missing_model_is_model_load_error() {
        let mut backend = TractBackend::new();
        let config = MattingConfig::builder()
            .backend_type(BackendType::Tract)
            .model_path("no/such/model.onnx")
            .build()
            .unwrap();

        assert!(matches!(
            backend.initialize(&config),
            Err(MattingError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_malformed_model_is_model_load_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model_path = temp_dir.path().join("isnetis.onnx");
        std::fs::write(&model_path, b"not a protobuf").unwrap();

        let mut backend = TractBackend::new();
        let config = MattingConfig::builder()
            .backend_type(BackendType::Tract)
            .model_path(model_path)
            .build()
            .unwrap();

        assert!(matches!(
            backend.initialize(&config),
            Err(MattingError::ModelLoad(_))
        ));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = TractBackend::new();
        assert!(backend.infer(&Array4::zeros((1, 3, 4, 4))).is_err());
    }
}
