//! `voltwise serve` — Start the HTTP API server.

use std::path::Path;
use tracing::info;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        info!(port, "Port overridden from the command line");
        config.gateway.port = port;
    }

    println!("⚡ Voltwise Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);
    let cache = if config.cache.enabled {
        config.cache.backend.as_str()
    } else {
        "disabled"
    };
    println!("   Cache:     {cache}");

    voltwise_gateway::start(config).await
}
