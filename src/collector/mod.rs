//! Collectors: mutable reductions
//!
//! A [`Collector`] bundles four functions:
//!
//! - `supplier` creates an empty container,
//! - `accumulator` folds one element into a container,
//! - `combiner` merges two containers (must be associative),
//! - `finisher` turns the final container into the result.
//!
//! Sequential evaluation uses one container. Parallel evaluation creates one
//! container per leaf and merges siblings with the combiner while joining;
//! only the root container is finished. A `CONCURRENT` collector whose
//! container is a cloneable handle (see [`Collector::into_concurrent`]) may
//! instead share a single container between all leaves, in which case the
//! combiner is never called.
//!
//! The factory functions live in [`collectors`].

mod builtins;
mod concurrent;
mod grouping;
mod numeric;

use std::fmt;
use std::sync::Arc;

use crate::shared::flag_set;

pub use grouping::{OrderedMap, Partition};
pub use numeric::{KahanSum, Numeric, SummaryStatistics};

flag_set! {
    /// Properties a [`Collector`] advertises to the evaluator
    pub struct CollectorCharacteristics: u8 {
        /// The container may be accumulated into from several threads at once
        const CONCURRENT = 0;
        /// The result does not depend on encounter order
        const UNORDERED = 1;
        /// The finisher is the identity function
        const IDENTITY_FINISH = 2;
    }
}

type Supplier<A> = Arc<dyn Fn() -> A + Send + Sync>;
type Accumulator<T, A> = Arc<dyn Fn(&mut A, T) -> anyhow::Result<()> + Send + Sync>;
type Combiner<A> = Arc<dyn Fn(A, A) -> anyhow::Result<A> + Send + Sync>;
type Finisher<A, R> = Arc<dyn Fn(A) -> anyhow::Result<R> + Send + Sync>;
type Share<A> = Arc<dyn Fn(&A) -> A + Send + Sync>;

/// Mutable reduction of elements `T` through a container `A` into a result `R`
pub struct Collector<T, A, R> {
    supplier: Supplier<A>,
    accumulator: Accumulator<T, A>,
    combiner: Combiner<A>,
    finisher: Finisher<A, R>,
    characteristics: CollectorCharacteristics,
    share: Option<Share<A>>,
}

impl<T, A, R> Clone for Collector<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            supplier: Arc::clone(&self.supplier),
            accumulator: Arc::clone(&self.accumulator),
            combiner: Arc::clone(&self.combiner),
            finisher: Arc::clone(&self.finisher),
            characteristics: self.characteristics,
            share: self.share.clone(),
        }
    }
}

impl<T, A, R> fmt::Debug for Collector<T, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("characteristics", &self.characteristics)
            .field("shareable", &self.share.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: 'static, A: 'static> Collector<T, A, A> {
    /// Collector whose container is its result
    pub fn new<S, F, C>(supplier: S, accumulator: F, combiner: C) -> Self
    where
        S: Fn() -> A + Send + Sync + 'static,
        F: Fn(&mut A, T) + Send + Sync + 'static,
        C: Fn(A, A) -> A + Send + Sync + 'static,
    {
        Self::try_new(
            supplier,
            move |container: &mut A, item| {
                accumulator(container, item);
                Ok(())
            },
            move |left, right| Ok(combiner(left, right)),
        )
    }

    /// Like [`Collector::new`] with a fallible accumulator and combiner
    pub fn try_new<S, F, C>(supplier: S, accumulator: F, combiner: C) -> Self
    where
        S: Fn() -> A + Send + Sync + 'static,
        F: Fn(&mut A, T) -> anyhow::Result<()> + Send + Sync + 'static,
        C: Fn(A, A) -> anyhow::Result<A> + Send + Sync + 'static,
    {
        Self {
            supplier: Arc::new(supplier),
            accumulator: Arc::new(accumulator),
            combiner: Arc::new(combiner),
            finisher: Arc::new(|container: A| Ok(container)),
            characteristics: CollectorCharacteristics::IDENTITY_FINISH,
            share: None,
        }
    }
}

impl<T: 'static, A: 'static, R: 'static> Collector<T, A, R> {
    /// Collector with an explicit finisher
    pub fn with_finisher<S, F, C, G>(supplier: S, accumulator: F, combiner: C, finisher: G) -> Self
    where
        S: Fn() -> A + Send + Sync + 'static,
        F: Fn(&mut A, T) + Send + Sync + 'static,
        C: Fn(A, A) -> A + Send + Sync + 'static,
        G: Fn(A) -> R + Send + Sync + 'static,
    {
        Collector::new(supplier, accumulator, combiner).and_then(finisher)
    }

    /// Apply `f` to the result of this collector
    pub fn and_then<U, G>(self, f: G) -> Collector<T, A, U>
    where
        U: 'static,
        G: Fn(R) -> U + Send + Sync + 'static,
    {
        self.try_and_then(move |result| Ok(f(result)))
    }

    /// Apply a fallible `f` to the result of this collector
    pub fn try_and_then<U, G>(self, f: G) -> Collector<T, A, U>
    where
        U: 'static,
        G: Fn(R) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        let finisher = self.finisher;
        Collector {
            supplier: self.supplier,
            accumulator: self.accumulator,
            combiner: self.combiner,
            finisher: Arc::new(move |container| f(finisher(container)?)),
            characteristics: self
                .characteristics
                .without(CollectorCharacteristics::IDENTITY_FINISH),
            share: self.share,
        }
    }

    /// Add characteristics. `CONCURRENT` only takes effect on collectors
    /// whose container can be shared, see [`Collector::into_concurrent`].
    pub fn with_characteristics(mut self, characteristics: CollectorCharacteristics) -> Self {
        self.characteristics |= characteristics;
        self
    }

    pub(crate) fn from_parts(
        supplier: Supplier<A>,
        accumulator: Accumulator<T, A>,
        combiner: Combiner<A>,
        finisher: Finisher<A, R>,
        characteristics: CollectorCharacteristics,
    ) -> Self {
        Self {
            supplier,
            accumulator,
            combiner,
            finisher,
            characteristics,
            share: None,
        }
    }
}

impl<T, A: Clone + 'static, R> Collector<T, A, R> {
    /// Declare the container a cloneable handle to one concurrent structure,
    /// so that every clone accumulates into the same data.
    ///
    /// The accumulator must then be safe to call from several threads at once
    /// and commutative; the result must not depend on encounter order.
    pub fn into_concurrent(mut self) -> Self {
        self.characteristics |= CollectorCharacteristics::CONCURRENT;
        self.share = Some(Arc::new(|container: &A| container.clone()));
        self
    }
}

impl<T, A, R> Collector<T, A, R> {
    pub fn characteristics(&self) -> CollectorCharacteristics {
        self.characteristics
    }

    /// Fresh empty container
    pub fn supply(&self) -> A {
        (self.supplier)()
    }

    pub fn accumulate(&self, container: &mut A, item: T) -> anyhow::Result<()> {
        (self.accumulator)(container, item)
    }

    /// Merge `right` into `left`; `left` precedes `right` in encounter order
    pub fn combine(&self, left: A, right: A) -> anyhow::Result<A> {
        (self.combiner)(left, right)
    }

    pub fn finish(&self, container: A) -> anyhow::Result<R> {
        (self.finisher)(container)
    }

    /// Another handle to `container`, for concurrent collectors only
    pub(crate) fn share(&self, container: &A) -> Option<A> {
        if !self.characteristics.contains(CollectorCharacteristics::CONCURRENT) {
            return None;
        }
        self.share.as_ref().map(|share| share(container))
    }

    pub(crate) fn parts(
        &self,
    ) -> (
        Supplier<A>,
        Accumulator<T, A>,
        Combiner<A>,
        Finisher<A, R>,
    ) {
        (
            Arc::clone(&self.supplier),
            Arc::clone(&self.accumulator),
            Arc::clone(&self.combiner),
            Arc::clone(&self.finisher),
        )
    }
}

/// Factory functions for the built-in collectors
pub mod collectors {
    pub use super::builtins::{
        filtering, joining, mapping, max_by, min_by, reducing, reducing_with, teeing,
        to_collection, to_map, to_map_merging, to_sequence, to_set, to_vec,
    };
    pub use super::concurrent::{grouping_by_concurrent, to_concurrent_map, to_concurrent_map_merging};
    pub use super::grouping::{grouping_by, grouping_by_ordered, grouping_by_sorted, partitioning_by};
    pub use super::numeric::{averaging, averaging_by, counting, summarizing, summing, summing_by};
}
