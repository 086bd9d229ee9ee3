//! Configuration management for streamfork
//!
//! The engine reads its tuning knobs once: the process-wide scheduler is built
//! from [`EngineConfig::load`] the first time a pipeline runs in parallel.
//! Pools created explicitly through [`SchedulerHandle::from_config`] can use
//! any configuration, which keeps tests isolated from the environment.
//!
//! Sources, in increasing priority:
//! 1. Embedded `default-config.toml`
//! 2. `streamfork.toml` in the working directory (or an explicit path)
//! 3. `STREAMFORK_` environment variables (`STREAMFORK_SCHEDULER__PARALLELISM=8`)
//!
//! [`SchedulerHandle::from_config`]: crate::parallel::SchedulerHandle::from_config

pub mod core;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Main configuration structure for the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fork-join pool configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Source splitting configuration
    #[serde(default)]
    pub splitting: SplittingConfig,
}

/// Fork-join pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker threads (0 = derive from hardware concurrency)
    #[serde(default)]
    pub parallelism: usize,

    /// Percentage of CPU cores to use when parallelism is 0 (1-100)
    #[serde(default = "default_thread_percentage")]
    pub thread_percentage: u8,

    /// Maximum compensating workers alive at once for managed blocking
    #[serde(default = "default_max_compensation")]
    pub max_compensation: usize,

    /// Idle worker sleep between queue checks (milliseconds)
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

fn default_thread_percentage() -> u8 {
    100
}

fn default_max_compensation() -> usize {
    64
}

fn default_idle_wait_ms() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            thread_percentage: default_thread_percentage(),
            max_compensation: default_max_compensation(),
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

/// Source splitting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplittingConfig {
    /// Fixed leaf size (0 = derive from the source estimate)
    #[serde(default)]
    pub leaf_threshold: u64,

    /// Leaf size for sources that cannot estimate their size; splits of such
    /// sources pull batches growing by this many elements
    #[serde(default = "default_unsized_leaf_size")]
    pub unsized_leaf_size: u64,

    /// Target leaf tasks per worker
    #[serde(default = "default_tasks_per_worker")]
    pub tasks_per_worker: u64,
}

/// Leaf size, and split batch increment, for sources of unknown size
pub(crate) const DEFAULT_UNSIZED_LEAF_SIZE: u64 = 1024;

fn default_unsized_leaf_size() -> u64 {
    DEFAULT_UNSIZED_LEAF_SIZE
}

fn default_tasks_per_worker() -> u64 {
    4
}

impl Default for SplittingConfig {
    fn default() -> Self {
        Self {
            leaf_threshold: 0,
            unsized_leaf_size: default_unsized_leaf_size(),
            tasks_per_worker: default_tasks_per_worker(),
        }
    }
}

impl EngineConfig {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), StreamError> {
        let percentage = self.scheduler.thread_percentage;
        if !(1..=100).contains(&percentage) {
            return Err(StreamError::config(format!(
                "scheduler.thread_percentage must be within 1-100, got {percentage}"
            )));
        }
        if self.splitting.unsized_leaf_size == 0 {
            return Err(StreamError::config(
                "splitting.unsized_leaf_size must be at least 1",
            ));
        }
        if self.splitting.tasks_per_worker == 0 {
            return Err(StreamError::config(
                "splitting.tasks_per_worker must be at least 1",
            ));
        }
        Ok(())
    }

    /// Configuration with a fixed worker count; everything else default
    pub fn with_parallelism(parallelism: usize) -> Self {
        let mut config = Self::default();
        config.scheduler.parallelism = parallelism;
        config
    }
}
