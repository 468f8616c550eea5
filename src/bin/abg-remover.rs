//! Foreground matting CLI tool
//!
//! Command-line interface for the abg-remover library with support for ONNX Runtime and Tract
//! backends.

#[cfg(feature = "cli")]
use abg_remover::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<std::process::ExitCode> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
