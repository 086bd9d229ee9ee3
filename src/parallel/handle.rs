use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use crossbeam::channel;

use crate::config::{EngineConfig, SplittingConfig};
use crate::error::{Result, StreamError};

use super::pool::{ForkJoinPool, PoolStats};

static GLOBAL: OnceLock<SchedulerHandle> = OnceLock::new();

/// Cloneable handle to a fork-join pool
///
/// Pipelines evaluate on the handle passed to `parallel_on`, or on
/// [`SchedulerHandle::global`] after `parallel()`. The pool shuts down when
/// the last handle is dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    pool: Arc<ForkJoinPool>,
    parallelism: usize,
    splitting: Arc<SplittingConfig>,
}

impl SchedulerHandle {
    /// Pool with `parallelism` workers (0 = hardware concurrency) and default tuning
    pub fn new(parallelism: usize) -> Self {
        Self::from_config(&EngineConfig::with_parallelism(parallelism))
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let parallelism = config.resolved_parallelism();
        Self {
            pool: Arc::new(ForkJoinPool::new(parallelism, &config.scheduler)),
            parallelism,
            splitting: Arc::new(config.splitting.clone()),
        }
    }

    /// Process-wide scheduler, built from [`EngineConfig::load`] on first use
    pub fn global() -> Self {
        GLOBAL
            .get_or_init(|| {
                let config = EngineConfig::load().unwrap_or_else(|e| {
                    tracing::warn!("Using default engine config: {:#}", e);
                    EngineConfig::default()
                });
                Self::from_config(&config)
            })
            .clone()
    }

    /// Worker count the split heuristics plan for
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn splitting(&self) -> &SplittingConfig {
        &self.splitting
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Run `task` on a pool worker and wait for its result.
    ///
    /// Called from one of this pool's workers the task runs inline. A panic
    /// inside the task is reported as [`StreamError::WorkerPanic`].
    pub fn invoke<R, F>(&self, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.pool.is_current() || self.pool.workers() == 0 {
            return panic::catch_unwind(AssertUnwindSafe(task)).map_err(StreamError::from_panic);
        }

        let (sender, receiver) = channel::bounded(1);
        self.pool.registry().inject(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            // The caller only stops listening if it unwound itself
            let _ = sender.send(outcome);
        }));

        // Waiting on a worker of another pool blocks that worker
        match super::managed_block(|| receiver.recv()) {
            Ok(outcome) => outcome.map_err(StreamError::from_panic),
            Err(_) => Err(StreamError::WorkerPanic {
                message: "scheduler dropped the task before it completed".to_string(),
            }),
        }
    }

    /// Run a blocking region; on one of this pool's workers a compensating
    /// worker keeps the pool's parallelism while `blocking` runs
    pub fn managed_block<R>(&self, blocking: impl FnOnce() -> R) -> R {
        if self.pool.is_current() {
            self.pool.registry().managed_block(blocking)
        } else {
            blocking()
        }
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("parallelism", &self.parallelism)
            .field("workers", &self.pool.workers())
            .finish()
    }
}
