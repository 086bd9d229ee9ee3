//! # streamfork - lazy sequence pipelines with fork-join evaluation
//!
//! Build a pipeline from a splittable source, chain intermediate operations,
//! and run one terminal operation. The same pipeline runs sequentially or on
//! a work-stealing fork-join pool and produces the same result for ordered
//! terminal operations.
//!
//! ## Features
//!
//! - **Lazy**: nothing runs until a terminal operation; infinite sources work
//!   with short-circuiting operations
//! - **Splittable sources**: arrays, ranges, lists, sets and generators split
//!   themselves for parallel evaluation
//! - **Collectors**: grouping, partitioning, maps, joining and numeric
//!   summaries, composable through downstream collectors
//! - **Concurrent collectors**: unordered parallel reductions into one shared
//!   `scc` map
//! - **Cancellation**: the first failure or satisfied short-circuit stops the
//!   tasks that can no longer matter
//!
//! ## Quick Start
//!
//! ```rust
//! use streamfork::{Pipeline, collectors};
//!
//! let words = vec!["pear", "fig", "plum", "apple", "kiwi"];
//! let by_length = Pipeline::from_container(words)
//!     .parallel()
//!     .collect(collectors::grouping_by_sorted(|w: &&str| w.len(), collectors::counting()))
//!     .unwrap();
//! assert_eq!(by_length[&4], 3);
//!
//! let first_even_square = Pipeline::iterate_unbounded(1u64, |n| n + 1)
//!     .map(|n| n * n)
//!     .filter(|n| n % 2 == 0)
//!     .find_first()
//!     .unwrap();
//! assert_eq!(first_even_square, Some(4));
//! ```

pub mod collector;
pub mod config;
pub mod error;
mod eval;
pub mod parallel;
pub mod pipeline;
mod shared;
pub mod source;

pub use collector::{Collector, CollectorCharacteristics, collectors};
pub use config::EngineConfig;
pub use error::{Result, StreamError};
pub use parallel::SchedulerHandle;
pub use pipeline::{Pipeline, PipelineIter, StageKind};
pub use source::{BoxSource, Characteristics, IntoSource, Source};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
