//! Chain health agent binary

use anyhow::Context;
use chainhealth_agent::{Agent, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is not up yet, so configuration errors go to stderr via anyhow
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from_file(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => Config::load().context("loading configuration")?,
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    common::logging::init_with(level, config.logging.json())?;

    tracing::info!(chains = config.chains.len(), "Chain health agent starting");
    if config.chains.is_empty() {
        tracing::warn!("No chains configured, nothing will be probed");
    }

    Agent::new(config)?.run().await?;
    Ok(())
}
