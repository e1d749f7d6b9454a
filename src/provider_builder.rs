//! Provider factory: builds the configured generative backend from config.

use replica_core::{config, traits::Provider};
use replica_providers::GeminiProvider;
use std::sync::Arc;

/// Build the configured provider.
pub fn build_provider(cfg: &config::Config) -> anyhow::Result<Arc<dyn Provider>> {
    match cfg.provider.default.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::from_config(
            cfg.provider.gemini.clone(),
        )?)),
        other => anyhow::bail!("unsupported provider: {other}"),
    }
}
