pub mod ask;
pub mod config_cmd;
pub mod serve;

use anyhow::Context;
use std::path::Path;
use tracing::debug;
use voltwise_config::AppConfig;

/// Load `path` if given, else the default location; env overrides apply
/// either way.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env_overrides(),
        None => AppConfig::load().context("Failed to load config")?,
    };
    debug!(
        provider = %config.default_provider,
        model = %config.default_model,
        "Configuration loaded"
    );
    Ok(config)
}
