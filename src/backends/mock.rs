//! Deterministic backend that needs no model file
//!
//! Used by tests and by `--execution-provider mock` dry runs. Failures can be injected on
//! initialization or on chosen calls to exercise the error paths of the pipeline and worker.

use crate::{
    config::MattingConfig,
    error::{MattingError, Result},
    inference::InferenceBackend,
};
use ndarray::{Array4, Axis};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use instant::{Duration, Instant};

/// Mask produced by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMask {
    /// Every canvas pixel gets the same value
    Constant(f32),
    /// Mean of the three input channels, so padding maps to 0
    Luminance,
}

impl Default for MockMask {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

#[derive(Debug, Default)]
pub struct MockBackend {
    mask: MockMask,
    initialized: bool,
    fail_initialize: bool,
    failing_calls: Vec<usize>,
    delay: Option<std::time::Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    #[must_use]
    pub fn new(mask: MockMask) -> Self {
        Self {
            mask,
            ..Self::default()
        }
    }

    /// Make `initialize` fail with a model load error
    #[must_use]
    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Make the call with the given zero-based index fail with an inference error
    #[must_use]
    pub fn fail_on_call(mut self, call_index: usize) -> Self {
        self.failing_calls.push(call_index);
        self
    }

    /// Sleep for `delay` inside every call
    #[must_use]
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of `infer` calls, readable after the backend moved into a session
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, config: &MattingConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        if self.fail_initialize {
            return Err(MattingError::model_load_error(
                &config.model_path,
                "mock initialization failure",
                &[],
            ));
        }

        let start = Instant::now();
        self.initialized = true;
        log::debug!("Mock backend initialized with {:?}", self.mask);
        Ok(Some(start.elapsed()))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(MattingError::internal("Backend not initialized"));
        }

        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.failing_calls.contains(&call) {
            return Err(MattingError::inference_error_with_backend(
                self.name(),
                "Model inference",
                &format!("injected failure on call {call}"),
            ));
        }

        let (batch, channels, height, width) = input.dim();
        if channels != 3 {
            return Err(MattingError::inference_error_with_backend(
                self.name(),
                "Model inference",
                &format!("expected 3 input channels, got {channels}"),
            ));
        }

        let output = match self.mask {
            MockMask::Constant(value) => Array4::from_elem((batch, 1, height, width), value),
            MockMask::Luminance => input
                .mean_axis(Axis(1))
                .ok_or_else(|| MattingError::inference("Empty input tensor"))?
                .insert_axis(Axis(1)),
        };

        Ok(output)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
