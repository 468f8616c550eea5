//! Inference backend abstraction and the shared session handle
//!
//! [`InferenceSession`] owns at most one backend for its whole lifetime. The backend is created
//! lazily on first use (or eagerly through [`InferenceSession::ensure_loaded`]) behind a mutex, so
//! concurrent first calls construct it exactly once and every `run` is serialized.

use crate::{
    backends::MockBackend,
    config::{BackendType, MattingConfig},
    error::{MattingError, Result},
};
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex, MutexGuard,
};

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` if the backend was already initialized.
    ///
    /// # Errors
    /// - `MattingError::ModelLoad` when the artifact is missing or malformed
    fn initialize(&mut self, config: &MattingConfig) -> Result<Option<Duration>>;

    /// Run inference on a `(1, 3, S, S)` tensor, producing a `(1, 1, S, S)` raw mask
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name used in logs and error messages
    fn name(&self) -> &'static str;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend instance of the specified type
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled through cargo features
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[cfg(not(feature = "onnx"))]
            BackendType::Onnx => Err(MattingError::invalid_config(
                "ONNX backend not compiled in. Rebuild with --features onnx",
            )),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[cfg(not(feature = "tract"))]
            BackendType::Tract => Err(MattingError::invalid_config(
                "Tract backend not compiled in. Rebuild with --features tract",
            )),
            BackendType::Mock => Ok(Box::new(MockBackend::default())),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends.push(BackendType::Mock);
        backends
    }
}

/// Factory that hands out a single prepared backend
///
/// Used to inject a configured [`MockBackend`] (or any custom backend) into a session. A second
/// construction request fails, which never happens through [`InferenceSession`] unless the first
/// construction failed.
pub struct PreparedBackendFactory {
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
}

impl PreparedBackendFactory {
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend: Mutex::new(Some(backend)),
        }
    }
}

impl BackendFactory for PreparedBackendFactory {
    fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        self.backend
            .lock()
            .map_err(|_| MattingError::internal("Prepared backend lock poisoned"))?
            .take()
            .ok_or_else(|| MattingError::internal("Prepared backend already consumed"))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        Vec::new()
    }
}

/// Lazily-initialized handle to a loaded model
pub struct InferenceSession {
    config: MattingConfig,
    factory: Box<dyn BackendFactory>,
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
    constructions: AtomicUsize,
}

impl InferenceSession {
    /// Create a session that builds its backend with [`DefaultBackendFactory`]
    #[must_use]
    pub fn new(config: MattingConfig) -> Self {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a session with a custom backend factory
    #[must_use]
    pub fn with_factory(config: MattingConfig, factory: Box<dyn BackendFactory>) -> Self {
        Self {
            config,
            factory,
            backend: Mutex::new(None),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Create a session around an already constructed backend
    #[must_use]
    pub fn with_backend(config: MattingConfig, backend: Box<dyn InferenceBackend>) -> Self {
        Self::with_factory(config, Box::new(PreparedBackendFactory::new(backend)))
    }

    #[must_use]
    pub fn config(&self) -> &MattingConfig {
        &self.config
    }

    /// Load the backend now instead of on the first `run`
    ///
    /// Returns the model load time, or `None` when already loaded.
    ///
    /// # Errors
    /// - `MattingError::ModelLoad` when the artifact is missing or malformed
    pub fn ensure_loaded(&self) -> Result<Option<Duration>> {
        let mut slot = self.lock()?;
        self.load_into(&mut slot)
    }

    /// Run the model on `input`, loading it first if needed
    ///
    /// # Errors
    /// - `MattingError::ModelLoad` if the first construction fails
    /// - `MattingError::Inference` if the model invocation fails
    pub fn run(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let mut slot = self.lock()?;
        self.load_into(&mut slot)?;

        let backend = slot
            .as_mut()
            .ok_or_else(|| MattingError::internal("Backend missing after initialization"))?;

        let start = Instant::now();
        let output = backend.infer(input)?;
        log::debug!(
            "{} inference completed in {:.2}ms",
            backend.name(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }

    /// Whether the backend has been constructed and initialized
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.backend
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|b| b.is_initialized()))
            .unwrap_or(false)
    }

    /// Number of successful backend constructions (0 or 1)
    #[must_use]
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Box<dyn InferenceBackend>>>> {
        self.backend
            .lock()
            .map_err(|_| MattingError::internal("Inference session lock poisoned"))
    }

    fn load_into(&self, slot: &mut Option<Box<dyn InferenceBackend>>) -> Result<Option<Duration>> {
        if slot.is_some() {
            return Ok(None);
        }

        log::info!(
            "Loading {} backend from {}",
            self.config.backend_type,
            self.config.model_path.display()
        );

        let mut backend = self.factory.create_backend(self.config.backend_type)?;
        let load_time = backend.initialize(&self.config)?;

        if let Some(duration) = load_time {
            log::info!(
                "{} backend ready in {:.0}ms",
                backend.name(),
                duration.as_secs_f64() * 1000.0
            );
        }

        *slot = Some(backend);
        self.constructions.fetch_add(1, Ordering::SeqCst);
        Ok(load_time)
    }
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("backend_type", &self.config.backend_type)
            .field("model_path", &self.config.model_path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockMask;
    use std::sync::Arc;

    fn mock_config() -> MattingConfig {
        MattingConfig::builder()
            .backend_type(BackendType::Mock)
            .canvas_side(8)
            .build()
            .unwrap()
    }

    /// Factory that counts calls and builds slow mock backends
    struct CountingFactory {
        created: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl BackendFactory for CountingFactory {
        fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
            let previous = self.created.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && previous == 0 {
                return Err(MattingError::model_load("transient failure"));
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Box::new(MockBackend::default()))
        }

        fn available_backends(&self) -> Vec<BackendType> {
            vec![BackendType::Mock]
        }
    }

    #[test]
    fn test_default_factory_lists_mock() {
        let factory = DefaultBackendFactory;
        assert!(factory.available_backends().contains(&BackendType::Mock));
        assert!(factory.create_backend(BackendType::Mock).is_ok());
    }

    #[test]
    fn test_session_is_lazy() {
        let session = InferenceSession::new(mock_config());
        assert!(!session.is_loaded());
        assert_eq!(session.construction_count(), 0);

        let output = session.run(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert_eq!(output.shape(), &[1, 1, 8, 8]);
        assert!(session.is_loaded());
        assert_eq!(session.construction_count(), 1);
    }

    #[test]
    fn test_ensure_loaded_reports_load_time_once() {
        let session = InferenceSession::new(mock_config());
        assert!(session.ensure_loaded().unwrap().is_some());
        assert!(session.ensure_loaded().unwrap().is_none());
        assert_eq!(session.construction_count(), 1);
    }

    #[test]
    fn test_concurrent_first_use_constructs_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(InferenceSession::with_factory(
            mock_config(),
            Box::new(CountingFactory {
                created: Arc::clone(&created),
                fail_first: false,
            }),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.run(&Array4::zeros((1, 3, 8, 8))).is_ok())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(session.construction_count(), 1);
    }

    #[test]
    fn test_failed_construction_is_retried() {
        let created = Arc::new(AtomicUsize::new(0));
        let session = InferenceSession::with_factory(
            mock_config(),
            Box::new(CountingFactory {
                created: Arc::clone(&created),
                fail_first: true,
            }),
        );

        let first = session.run(&Array4::zeros((1, 3, 8, 8)));
        assert!(matches!(first, Err(MattingError::ModelLoad(_))));
        assert!(!session.is_loaded());

        assert!(session.run(&Array4::zeros((1, 3, 8, 8))).is_ok());
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(session.construction_count(), 1);
    }

    #[test]
    fn test_with_backend_uses_prepared_backend() {
        let backend = MockBackend::new(MockMask::Constant(0.25));
        let session = InferenceSession::with_backend(mock_config(), Box::new(backend));

        let output = session.run(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert!(output.iter().all(|&v| (v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn test_inference_errors_propagate() {
        let backend = MockBackend::default().fail_on_call(1);
        let session = InferenceSession::with_backend(mock_config(), Box::new(backend));

        assert!(session.run(&Array4::zeros((1, 3, 8, 8))).is_ok());
        let result = session.run(&Array4::zeros((1, 3, 8, 8)));
        assert!(matches!(result, Err(MattingError::Inference(_))));
        // A failed call does not poison the session
        assert!(session.run(&Array4::zeros((1, 3, 8, 8))).is_ok());
    }
}
