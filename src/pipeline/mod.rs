//! Lazy pipelines
//!
//! A [`Pipeline`] is a source plus a chain of intermediate operations. Chain
//! methods only link a new stage; nothing is evaluated until a terminal
//! operation runs, and a pipeline can be consumed only once.
//!
//! ```rust
//! use streamfork::{Pipeline, collectors};
//!
//! let doubled = Pipeline::from_container(vec![3, 1, 2])
//!     .filter(|x| *x > 0)
//!     .map(|x| x * 2)
//!     .to_sequence()
//!     .unwrap();
//! assert_eq!(doubled, vec![6, 2, 4]);
//!
//! let total = Pipeline::from_container(1i32..6)
//!     .parallel()
//!     .collect(collectors::summing::<i32>())
//!     .unwrap();
//! assert_eq!(total, 15);
//! ```

mod iter;
pub(crate) mod stage;

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

pub use iter::PipelineIter;
pub use stage::{StageKind, Statefulness};

use crate::collector::{Collector, CollectorCharacteristics};
use crate::error::{Result, StreamError};
use crate::eval::terminal::{
    Collect, Count, Find, ForEach, Gather, Match, MatchKind, Reduce, SharedCollect, Terminal,
};
use crate::eval::{self, PlanContext};
use crate::parallel::{ExecutionStrategy, SchedulerHandle};
use crate::source::{self, BoxSource, Characteristics, IntoSource};
use stage::{Conversion, ConvertStage, Op, Stage};

enum State<T> {
    Ready(Stage<T>),
    /// An unbounded stateful stage follows an infinite source
    Rejected { operation: StageKind },
    Consumed,
}

/// Lazy, single-use sequence pipeline
pub struct Pipeline<T> {
    state: State<T>,
    strategy: ExecutionStrategy,
    unordered: bool,
    /// The source is infinite and no `limit`/`take_while` has bounded it yet
    infinite: bool,
    kinds: Vec<StageKind>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Pipeline over `source`
    pub fn of(source: BoxSource<T>) -> Self {
        let unordered = !source.characteristics().contains(Characteristics::ORDERED);
        let infinite = source.is_infinite();
        Self {
            state: State::Ready(Stage::Source(source)),
            strategy: ExecutionStrategy::default(),
            unordered,
            infinite,
            kinds: Vec::new(),
        }
    }

    /// Pipeline over any supported container
    pub fn from_container<C: IntoSource<T>>(container: C) -> Self {
        Self::of(container.into_source())
    }

    /// Infinite unordered pipeline of `supplier()` values
    pub fn generate<F>(supplier: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        Self::of(source::generate(supplier))
    }

    /// `seed, next(seed), …` while `has_next` holds
    pub fn iterate<P, F>(seed: T, has_next: P, next: F) -> Self
    where
        T: Clone,
        P: FnMut(&T) -> bool + Send + 'static,
        F: FnMut(&T) -> T + Send + 'static,
    {
        Self::of(source::iterate(seed, has_next, next))
    }

    /// Infinite `seed, next(seed), …`
    pub fn iterate_unbounded<F>(seed: T, next: F) -> Self
    where
        T: Clone,
        F: FnMut(&T) -> T + Send + 'static,
    {
        Self::of(source::iterate_unbounded(seed, next))
    }

    pub fn empty() -> Self {
        Self::of(source::empty())
    }

    /// Elements of `first`, then the elements of `second`
    pub fn concat(first: BoxSource<T>, second: BoxSource<T>) -> Self {
        Self::of(source::concat(first, second))
    }

    /// Link an operation that keeps the element type
    fn push(self, op: Op<T>) -> Self {
        let kind = op.kind();
        let Pipeline {
            state,
            strategy,
            unordered,
            infinite,
            mut kinds,
        } = self;
        kinds.push(kind);

        let state = match state {
            State::Ready(_) if infinite && kind.statefulness() == Statefulness::StatefulUnbounded => {
                tracing::debug!("Rejecting {} downstream of an infinite source", kind);
                State::Rejected { operation: kind }
            }
            State::Ready(upstream) => State::Ready(Stage::Op {
                upstream: Box::new(upstream),
                op,
            }),
            other => other,
        };

        Pipeline {
            state,
            strategy,
            unordered,
            infinite: infinite && !kind.bounds_input(),
            kinds,
        }
    }

    /// Link an operation that changes the element type
    fn convert<O: Send + 'static>(self, kind: StageKind, conversion: Conversion<T, O>) -> Pipeline<O> {
        let Pipeline {
            state,
            strategy,
            unordered,
            infinite,
            mut kinds,
        } = self;
        kinds.push(kind);

        let state = match state {
            State::Ready(upstream) => State::Ready(Stage::Convert(Box::new(ConvertStage {
                upstream,
                conversion,
            }))),
            State::Rejected { operation } => State::Rejected { operation },
            State::Consumed => State::Consumed,
        };

        Pipeline {
            state,
            strategy,
            unordered,
            infinite,
            kinds,
        }
    }

    pub fn map<O, F>(self, mapper: F) -> Pipeline<O>
    where
        O: Send + 'static,
        F: Fn(T) -> O + Send + Sync + 'static,
    {
        self.try_map(move |item| Ok(mapper(item)))
    }

    /// `map` with a fallible mapper; the first error fails the terminal operation
    pub fn try_map<O, F>(self, mapper: F) -> Pipeline<O>
    where
        O: Send + 'static,
        F: Fn(T) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.convert(StageKind::Map, Conversion::Map(Arc::new(mapper)))
    }

    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |item| Ok(predicate(item)))
    }

    pub fn try_filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::Filter(Arc::new(predicate)))
    }

    /// Replace every element with the elements of `mapper(element)`
    pub fn flat_map<O, I, F>(self, mapper: F) -> Pipeline<O>
    where
        O: Send + 'static,
        I: IntoIterator<Item = O>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        self.try_flat_map(move |item| Ok(mapper(item)))
    }

    pub fn try_flat_map<O, I, F>(self, mapper: F) -> Pipeline<O>
    where
        O: Send + 'static,
        I: IntoIterator<Item = O>,
        F: Fn(T) -> anyhow::Result<I> + Send + Sync + 'static,
    {
        let expand = move |item| -> anyhow::Result<Vec<O>> {
            Ok(mapper(item)?.into_iter().collect())
        };
        self.convert(StageKind::FlatMap, Conversion::FlatMap(Arc::new(expand)))
    }

    /// Observe every element as it passes
    pub fn peek<F>(self, action: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.try_peek(move |item| {
            action(item);
            Ok(())
        })
    }

    pub fn try_peek<F>(self, action: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(Op::Peek(Arc::new(action)))
    }

    /// Sort by natural order; equal elements keep their encounter order
    pub fn sorted(self) -> Self
    where
        T: Ord,
    {
        self.sorted_by(T::cmp)
    }

    /// Stable sort by `compare`
    pub fn sorted_by<F>(self, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.push(Op::Sorted(Arc::new(compare)))
    }

    pub fn sorted_by_key<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.sorted_by(move |a, b| key(a).cmp(&key(b)))
    }

    /// Drop repeated elements, keeping the first occurrence
    pub fn distinct(self) -> Self
    where
        T: Clone + Eq + Hash,
    {
        self.push(Op::Distinct(stage::distinct_factory()))
    }

    /// At most the first `count` elements
    pub fn limit(self, count: u64) -> Self {
        self.push(Op::Limit(count))
    }

    /// Everything after the first `count` elements
    pub fn skip(self, count: u64) -> Self {
        self.push(Op::Skip(count))
    }

    /// The longest prefix whose elements match `predicate`
    pub fn take_while<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.push(Op::TakeWhile(Arc::new(move |item: &T| -> anyhow::Result<bool> {
            Ok(predicate(item))
        })))
    }

    /// Everything from the first element that does not match `predicate` on
    pub fn drop_while<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.push(Op::DropWhile(Arc::new(move |item: &T| -> anyhow::Result<bool> {
            Ok(predicate(item))
        })))
    }

    /// Drop the encounter-order constraint, enabling the shared-container
    /// path of concurrent collectors
    pub fn unordered(mut self) -> Self {
        self.unordered = true;
        self
    }

    /// Evaluate on the process-wide scheduler
    pub fn parallel(mut self) -> Self {
        self.strategy = ExecutionStrategy::Parallel { scheduler: None };
        self
    }

    /// Evaluate on `scheduler`
    pub fn parallel_on(mut self, scheduler: &SchedulerHandle) -> Self {
        self.strategy = ExecutionStrategy::Parallel {
            scheduler: Some(scheduler.clone()),
        };
        self
    }

    pub fn sequential(mut self) -> Self {
        self.strategy = ExecutionStrategy::Sequential;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.strategy.is_parallel()
    }

    /// Kinds of the linked operations, source first
    pub fn stages(&self) -> &[StageKind] {
        &self.kinds
    }

    /// Fail early if the chain can never complete
    pub fn validate(&self) -> Result<()> {
        match &self.state {
            State::Ready(_) => Ok(()),
            State::Rejected { operation } => Err(StreamError::UnboundedStatefulOperation {
                operation: *operation,
            }),
            State::Consumed => Err(StreamError::PipelineReuse),
        }
    }

    /// Take the stage chain, leaving the pipeline consumed
    fn take_stage(&mut self) -> Result<Stage<T>> {
        match std::mem::replace(&mut self.state, State::Consumed) {
            State::Ready(stage) => Ok(stage),
            State::Rejected { operation } => {
                Err(StreamError::UnboundedStatefulOperation { operation })
            }
            State::Consumed => Err(StreamError::PipelineReuse),
        }
    }

    fn evaluate<Tm: Terminal<T>>(&mut self, terminal: Tm) -> Result<Tm::Output> {
        let stage = self.take_stage()?;
        eval::run(stage, terminal, &self.strategy)
    }

    /// Mutable reduction with `collector`
    pub fn collect<A, R>(&mut self, collector: Collector<T, A, R>) -> Result<R>
    where
        A: Send + 'static,
        R: 'static,
    {
        let flags = collector.characteristics();
        let shared = self.strategy.is_parallel()
            && flags.contains(CollectorCharacteristics::CONCURRENT)
            && (flags.contains(CollectorCharacteristics::UNORDERED) || self.unordered);

        if shared {
            let container = collector.supply();
            if let Some(handle) = collector.share(&container) {
                self.evaluate(SharedCollect::new(handle, collector.clone()))?;
                return collector.finish(container).map_err(StreamError::callback);
            }
        }
        self.evaluate(Collect::new(collector))
    }

    /// Every element in encounter order
    pub fn to_sequence(&mut self) -> Result<Vec<T>> {
        self.evaluate(Gather)
    }

    /// Fold with `op` starting from `identity`; `op` must be associative
    pub fn reduce<F>(&mut self, identity: T, op: F) -> Result<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let fold = Arc::clone(&op);
        let reduced = self.reduce_arc(Arc::new(move |a: T, b: T| -> anyhow::Result<T> {
            Ok(fold(a, b))
        }))?;
        Ok(match reduced {
            Some(reduced) => op(identity, reduced),
            None => identity,
        })
    }

    /// Fold with `op`; `None` for an empty pipeline
    pub fn reduce_with<F>(&mut self, op: F) -> Result<Option<T>>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        self.reduce_arc(Arc::new(move |a: T, b: T| -> anyhow::Result<T> {
            Ok(op(a, b))
        }))
    }

    fn reduce_arc(
        &mut self,
        op: Arc<dyn Fn(T, T) -> anyhow::Result<T> + Send + Sync>,
    ) -> Result<Option<T>> {
        self.evaluate(Reduce::new(op))
    }

    /// Smallest element; the first of several equal minima
    pub fn min_by<F>(&mut self, compare: F) -> Result<Option<T>>
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.reduce_with(move |current, item| match compare(&item, &current) {
            Ordering::Less => item,
            _ => current,
        })
    }

    /// Largest element; the last of several equal maxima
    pub fn max_by<F>(&mut self, compare: F) -> Result<Option<T>>
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.reduce_with(move |current, item| match compare(&item, &current) {
            Ordering::Less => current,
            _ => item,
        })
    }

    pub fn min(&mut self) -> Result<Option<T>>
    where
        T: Ord,
    {
        self.min_by(T::cmp)
    }

    pub fn max(&mut self) -> Result<Option<T>>
    where
        T: Ord,
    {
        self.max_by(T::cmp)
    }

    /// Apply `action` to every element. In parallel mode elements are visited
    /// in no particular order and on several threads.
    pub fn for_each<F>(&mut self, action: F) -> Result<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.try_for_each(move |item| {
            action(item);
            Ok(())
        })
    }

    pub fn try_for_each<F>(&mut self, action: F) -> Result<()>
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.evaluate(ForEach::new(Arc::new(action)))
    }

    /// Apply `action` to every element in encounter order on the calling thread.
    ///
    /// In parallel mode the pipeline is first evaluated into a buffer, which
    /// costs memory proportional to its length.
    pub fn for_each_ordered<F>(&mut self, mut action: F) -> Result<()>
    where
        F: FnMut(T),
    {
        if self.strategy.is_parallel() {
            self.to_sequence()?.into_iter().for_each(action);
            return Ok(());
        }
        for item in self.iter() {
            action(item?);
        }
        Ok(())
    }

    pub fn count(&mut self) -> Result<u64> {
        self.evaluate(Count)
    }

    /// True if any element matches; stops at the first match
    pub fn any_match<P>(&mut self, predicate: P) -> Result<bool>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.matching(predicate, MatchKind::Any)
    }

    /// True if every element matches (vacuously for none); stops at the first mismatch
    pub fn all_match<P>(&mut self, predicate: P) -> Result<bool>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.matching(predicate, MatchKind::All)
    }

    /// True if no element matches; stops at the first match
    pub fn none_match<P>(&mut self, predicate: P) -> Result<bool>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.matching(predicate, MatchKind::None)
    }

    fn matching<P>(&mut self, predicate: P, kind: MatchKind) -> Result<bool>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(move |item: &T| -> anyhow::Result<bool> { Ok(predicate(item)) });
        self.evaluate(Match::new(predicate, kind))
    }

    /// First element in encounter order
    pub fn find_first(&mut self) -> Result<Option<T>> {
        self.evaluate(Find::first())
    }

    /// Some element; in parallel mode whichever a worker finds first
    pub fn find_any(&mut self) -> Result<Option<T>> {
        self.evaluate(Find::any())
    }

    /// Pull elements one at a time on the calling thread, regardless of the
    /// execution mode
    pub fn iter(&mut self) -> PipelineIter<T> {
        let planned = self
            .take_stage()
            .and_then(|stage| stage.plan(&PlanContext::sequential()));
        match planned {
            Ok(segment) => PipelineIter::new(segment),
            Err(error) => PipelineIter::failed(error),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Ready(_) => "ready",
            State::Rejected { .. } => "rejected",
            State::Consumed => "consumed",
        };
        f.debug_struct("Pipeline")
            .field("state", &state)
            .field("strategy", &self.strategy)
            .field("unordered", &self.unordered)
            .field("stages", &self.kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_records_stage_kinds() {
        let pipeline = Pipeline::from_container(vec![1, 2, 3])
            .map(|x| x + 1)
            .filter(|x| *x > 2)
            .limit(1);
        assert_eq!(
            pipeline.stages(),
            &[StageKind::Map, StageKind::Filter, StageKind::Limit]
        );
        assert!(!pipeline.is_parallel());
    }

    #[test]
    fn test_second_terminal_is_reuse() {
        let mut pipeline = Pipeline::from_container(vec![1, 2]);
        assert_eq!(pipeline.count().unwrap(), 2);
        assert!(matches!(pipeline.count(), Err(StreamError::PipelineReuse)));
        assert!(matches!(pipeline.validate(), Err(StreamError::PipelineReuse)));
    }

    #[test]
    fn test_derived_from_consumed_is_reuse() {
        let mut pipeline = Pipeline::from_container(vec![1, 2]);
        pipeline.to_sequence().unwrap();
        let mut derived = pipeline.map(|x| x * 2);
        assert!(matches!(derived.to_sequence(), Err(StreamError::PipelineReuse)));
    }

    #[test]
    fn test_sorted_after_infinite_source_is_rejected_eagerly() {
        let pipeline = Pipeline::iterate_unbounded(0u32, |n| n + 1).sorted();
        match pipeline.validate() {
            Err(StreamError::UnboundedStatefulOperation { operation }) => {
                assert_eq!(operation, StageKind::Sorted)
            }
            other => panic!("expected UnboundedStatefulOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_limit_bounds_infinite_source() {
        let mut pipeline = Pipeline::iterate_unbounded(5u32, |n| n - 1)
            .limit(4)
            .sorted();
        assert!(pipeline.validate().is_ok());
        assert_eq!(pipeline.to_sequence().unwrap(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_unordered_source_marks_pipeline_unordered() {
        let pipeline = Pipeline::from_container(std::collections::HashSet::from([1]));
        assert!(pipeline.unordered);
        assert!(!Pipeline::from_container(vec![1]).unordered);
    }

    #[test]
    fn test_iter_yields_pending_error_last() {
        let mut pipeline = Pipeline::from_container(vec![1, 2, 3]).try_map(|x| {
            if x == 3 {
                anyhow::bail!("three")
            }
            Ok(x)
        });
        let results: Vec<_> = pipeline.iter().collect();
        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert_eq!(*results[1].as_ref().unwrap(), 2);
        assert!(results[2].is_err());
    }
}
