//! Fork-join parallel execution
//!
//! This module owns the worker threads that parallel pipelines run on.
//!
//! # Architecture Responsibilities
//!
//! ## What This Module Does:
//! - **Resource Discovery**: Detects available CPU cores using `num_cpus::get()`
//! - **Resource Calculation**: Applies configuration (fixed worker count or thread percentage)
//! - **Work Stealing**: Per-worker crossbeam deques plus a global injector
//! - **Managed Blocking**: Compensating workers for declared blocking regions
//!
//! ## What This Module Does NOT Do:
//! - **Pipeline Semantics**: Splitting, stage planning and result merging live in `eval`
//! - **Timeouts**: Tasks run until they finish or observe cancellation
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Evaluator     │    │   Parallel       │    │   System        │
//! │   (eval)        │───▶│   Module         │───▶│   Resources     │
//! │                 │    │                  │    │                 │
//! │ • Split policy  │    │ • Worker deques  │    │ • CPU cores     │
//! │ • Fork / join   │    │ • Stealing       │    │ • OS threads    │
//! │ • Cancellation  │    │ • Compensation   │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use streamfork::parallel::{ExecutionStrategy, SchedulerHandle};
//!
//! // Resource-based worker count (0 = derive from cores)
//! let workers = ExecutionStrategy::calculate_optimal_workers(0, 75);
//! assert!(workers >= 1);
//!
//! // Dedicated pool, injected into pipelines with `parallel_on`
//! let scheduler = SchedulerHandle::new(2);
//! assert_eq!(scheduler.invoke(|| 6 * 7).unwrap(), 42);
//! ```

pub mod core;
mod handle;
mod pool;
pub(crate) mod task;

// Re-export main types for easier access
pub use self::core::ExecutionStrategy;
pub(crate) use self::core::SplitPolicy;
pub use handle::SchedulerHandle;
pub use pool::PoolStats;

/// Run a blocking region from inside a pipeline callback.
///
/// On a pool worker a compensating worker is started for the duration of
/// `blocking` so the pool keeps its parallelism; elsewhere `blocking` simply
/// runs.
pub fn managed_block<R>(blocking: impl FnOnce() -> R) -> R {
    match pool::current_worker() {
        Some(worker) => worker.registry().managed_block(blocking),
        None => blocking(),
    }
}
