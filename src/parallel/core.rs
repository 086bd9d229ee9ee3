use crate::config::SplittingConfig;
use crate::source::Characteristics;

use super::SchedulerHandle;

/// Execution strategy of a pipeline
///
/// Pipelines start out `Sequential`; `parallel()` switches to the process-wide
/// scheduler and `parallel_on(handle)` to an injected one.
#[derive(Debug, Clone, Default)]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel {
        /// `None` resolves to [`SchedulerHandle::global`] at evaluation time
        scheduler: Option<SchedulerHandle>,
    },
}

impl ExecutionStrategy {
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionStrategy::Parallel { .. })
    }

    /// Scheduler to evaluate on, `None` for sequential execution
    pub(crate) fn scheduler(&self) -> Option<SchedulerHandle> {
        match self {
            ExecutionStrategy::Sequential => None,
            ExecutionStrategy::Parallel { scheduler } => {
                Some(scheduler.clone().unwrap_or_else(SchedulerHandle::global))
            }
        }
    }

    /// Calculate the worker count from available system resources and configuration
    ///
    /// # Parameters
    /// - `parallelism_config`: Configured worker count (0 = derive from hardware)
    /// - `thread_percentage`: Percentage of CPU cores to use when deriving
    ///
    /// # Algorithm
    /// ```text
    /// 1. Configured count > 0: use it as is
    /// 2. Detect available CPU cores: num_cpus::get()
    /// 3. Apply percentage: cores * thread_percentage / 100
    /// 4. Ensure minimum: max(1, result)
    /// ```
    ///
    /// # Examples
    /// ```rust
    /// use streamfork::parallel::ExecutionStrategy;
    ///
    /// let workers = ExecutionStrategy::calculate_optimal_workers(0, 75);
    /// assert!(workers >= 1); // Always at least 1 worker
    ///
    /// let workers = ExecutionStrategy::calculate_optimal_workers(6, 75);
    /// assert_eq!(workers, 6); // An explicit count wins
    /// ```
    pub fn calculate_optimal_workers(parallelism_config: usize, thread_percentage: u8) -> usize {
        if parallelism_config > 0 {
            return parallelism_config;
        }

        let available_cores = num_cpus::get();

        // Calculate workers based on percentage of available cores
        std::cmp::max(1, (available_cores * thread_percentage as usize) / 100)
    }
}

/// Leaf-size decision for one fork-join evaluation
///
/// The threshold is computed once from the root estimate; every split point
/// compares the current estimate against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SplitPolicy {
    threshold: u64,
}

impl SplitPolicy {
    pub(crate) fn new(
        estimate: Option<u64>,
        characteristics: Characteristics,
        parallelism: usize,
        config: &SplittingConfig,
    ) -> Self {
        if config.leaf_threshold > 0 {
            return Self {
                threshold: config.leaf_threshold,
            };
        }

        let threshold = match estimate {
            None => config.unsized_leaf_size.max(1),
            Some(size) => {
                let workers = parallelism.max(1) as u64;
                // Linear-cost splits get one leaf per worker
                let leaves = if characteristics.contains(Characteristics::SUBSIZED) {
                    workers.saturating_mul(config.tasks_per_worker.max(1))
                } else {
                    workers
                };
                (size / leaves).max(1)
            }
        };
        Self { threshold }
    }

    pub(crate) fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Unknown sizes always try to split; the source decides how much to hand off
    pub(crate) fn should_split(&self, estimate: Option<u64>) -> bool {
        match estimate {
            Some(size) => size > self.threshold,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized() -> Characteristics {
        Characteristics::SIZED | Characteristics::SUBSIZED
    }

    #[test]
    fn test_configured_workers_are_used_exactly() {
        assert_eq!(ExecutionStrategy::calculate_optimal_workers(3, 10), 3);
        assert!(ExecutionStrategy::calculate_optimal_workers(0, 1) >= 1);
    }

    #[test]
    fn test_default_strategy_is_sequential() {
        let strategy = ExecutionStrategy::default();
        assert!(!strategy.is_parallel());
        assert!(strategy.scheduler().is_none());
    }

    #[test]
    fn test_threshold_from_estimate() {
        let config = SplittingConfig::default();
        let policy = SplitPolicy::new(Some(1600), sized(), 4, &config);
        assert_eq!(policy.threshold(), 100);
        assert!(policy.should_split(Some(101)));
        assert!(!policy.should_split(Some(100)));
    }

    #[test]
    fn test_threshold_never_below_one() {
        let config = SplittingConfig::default();
        let policy = SplitPolicy::new(Some(3), sized(), 8, &config);
        assert_eq!(policy.threshold(), 1);
        assert!(!policy.should_split(Some(1)));
    }

    #[test]
    fn test_linear_split_cost_is_coarser() {
        let config = SplittingConfig::default();
        let policy = SplitPolicy::new(Some(1600), Characteristics::SIZED, 4, &config);
        assert_eq!(policy.threshold(), 400);
    }

    #[test]
    fn test_unknown_size_uses_configured_leaf() {
        let config = SplittingConfig::default();
        let policy = SplitPolicy::new(None, Characteristics::empty(), 4, &config);
        assert_eq!(policy.threshold(), config.unsized_leaf_size);
        assert!(policy.should_split(None));
    }

    #[test]
    fn test_fixed_leaf_threshold_overrides() {
        let config = SplittingConfig {
            leaf_threshold: 7,
            ..SplittingConfig::default()
        };
        let policy = SplitPolicy::new(Some(1_000_000), sized(), 16, &config);
        assert_eq!(policy.threshold(), 7);
    }
}
