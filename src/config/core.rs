use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

use super::EngineConfig;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Repository-local override file
pub const CONFIG_FILE: &str = "streamfork.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "STREAMFORK_";

impl EngineConfig {
    /// Load defaults, `streamfork.toml` from the working directory, then env vars
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment().merge(Toml::file(CONFIG_FILE)))
    }

    /// Load defaults, the given file, then env vars
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        Self::extract(Self::figment().merge(Toml::file(path)))
    }

    fn figment() -> Figment {
        Figment::new().merge(Toml::string(DEFAULT_CONFIG)) // Embedded defaults
    }

    fn extract(figment: Figment) -> Result<Self> {
        // Environment variables always have highest priority
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: EngineConfig = figment
            .extract()
            .context("Failed to extract engine configuration")?;
        config.validate()?;

        tracing::debug!(
            "Loaded engine config: parallelism={} leaf_threshold={}",
            config.scheduler.parallelism,
            config.splitting.leaf_threshold
        );
        Ok(config)
    }

    /// Worker count after applying hardware detection
    pub fn resolved_parallelism(&self) -> usize {
        crate::parallel::ExecutionStrategy::calculate_optimal_workers(
            self.scheduler.parallelism,
            self.scheduler.thread_percentage,
        )
    }
}
