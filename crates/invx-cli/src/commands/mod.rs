//! Subcommands and the helpers they share.

pub mod analyze;
pub mod batch;
pub mod config;
pub mod process;
pub mod serve;

use std::path::{Path, PathBuf};

use invx_core::invx_genai::GeminiBackend;
use invx_core::{InvoicePipeline, InvxConfig};
use tracing::debug;

/// Pipeline type every command works with.
pub type Pipeline = InvoicePipeline<GeminiBackend>;

/// `<config dir>/invx/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invx")
        .join("config.json")
}

/// The file named by `--config`, or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration.
///
/// An explicit path must exist; the default location falls back to built-in
/// defaults when absent.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<InvxConfig> {
    let path = config_path(explicit);

    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        return Ok(InvxConfig::from_file(&path)?);
    }

    if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    Ok(InvxConfig::default())
}

/// Build the Gemini pipeline.
///
/// Must run off the async runtime: the backend owns a blocking HTTP client.
pub fn build_pipeline(config: InvxConfig) -> anyhow::Result<Pipeline> {
    Ok(InvoicePipeline::from_config(config)?)
}

/// File stem used to name per-document outputs.
pub fn output_stem(path: &Path) -> &str {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice")
}
