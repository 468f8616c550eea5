//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{BackendType, ErrorPolicy, ExecutionProvider, MattingConfig},
    error::MattingError,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a [`MattingConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `MattingConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<MattingConfig> {
        let (backend_type, execution_provider) =
            Self::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let error_policy = if cli.fail_fast {
            ErrorPolicy::AbortOnFirstError
        } else {
            ErrorPolicy::ContinueOnError
        };

        let mut builder = MattingConfig::builder()
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .canvas_side(cli.side)
            .jpeg_quality(cli.jpeg_quality)
            // Same thread count for intra and inter operations
            .intra_threads(cli.threads)
            .inter_threads(cli.threads)
            .output_dir(cli.output_dir.as_ref())
            .error_policy(error_policy);

        if let Some(model) = &cli.model {
            builder = builder.model_path(model);
        }

        builder.build().context("Invalid configuration")
    }

    /// Parse `backend[:provider]` into a backend type and execution provider
    ///
    /// Accepted forms: `onnx`, `onnx:auto`, `onnx:cpu`, `onnx:cuda`, `onnx:coreml`, `tract`,
    /// `tract:cpu` and `mock`.
    pub(crate) fn parse_provider_string(
        provider_str: &str,
    ) -> crate::Result<(BackendType, ExecutionProvider)> {
        let (backend, provider) = match provider_str.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (provider_str, None),
        };

        match (backend, provider) {
            ("onnx", None | Some("auto")) => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            ("onnx", Some("cpu")) => Ok((BackendType::Onnx, ExecutionProvider::Cpu)),
            ("onnx", Some("cuda")) => Ok((BackendType::Onnx, ExecutionProvider::Cuda)),
            ("onnx", Some("coreml")) => Ok((BackendType::Onnx, ExecutionProvider::CoreMl)),
            ("onnx", Some(other)) => Err(MattingError::invalid_config(format!(
                "Unknown ONNX provider: {other}. Supported: auto, cpu, cuda, coreml"
            ))),
            // Tract only supports CPU
            ("tract", None | Some("cpu")) => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            ("tract", Some(other)) => Err(MattingError::invalid_config(format!(
                "Unknown Tract provider: {other}. Tract only supports 'cpu'"
            ))),
            ("mock", None) => Ok((BackendType::Mock, ExecutionProvider::Cpu)),
            _ => Err(MattingError::invalid_config(format!(
                "Unknown backend: {provider_str}. Supported backends: onnx, tract, mock"
            ))),
        }
    }
}
