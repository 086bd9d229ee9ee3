use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::Result;
use crate::eval::{BoxSegment, PlanContext};
use crate::source::BoxSource;

pub(crate) type MapFn<I, O> = Arc<dyn Fn(I) -> anyhow::Result<O> + Send + Sync>;
pub(crate) type FlatMapFn<I, O> = Arc<dyn Fn(I) -> anyhow::Result<Vec<O>> + Send + Sync>;
pub(crate) type PredicateFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<bool> + Send + Sync>;
pub(crate) type ActionFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Creates a fresh "first occurrence?" filter for one evaluation
pub(crate) type DistinctFactory<T> =
    Arc<dyn Fn() -> Box<dyn FnMut(&T) -> bool + Send> + Send + Sync>;

pub(crate) fn distinct_factory<T>() -> DistinctFactory<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    Arc::new(|| -> Box<dyn FnMut(&T) -> bool + Send> {
        let mut seen = HashSet::new();
        Box::new(move |item: &T| seen.insert(item.clone()))
    })
}

/// How much state an operation keeps between elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statefulness {
    Stateless,
    /// Keeps a counter or flag
    StatefulBounded,
    /// Must see its whole input before emitting
    StatefulUnbounded,
}

/// Kind of an intermediate operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Map,
    Filter,
    FlatMap,
    Peek,
    Sorted,
    Distinct,
    Limit,
    Skip,
    TakeWhile,
    DropWhile,
}

impl StageKind {
    pub fn statefulness(self) -> Statefulness {
        match self {
            StageKind::Map | StageKind::Filter | StageKind::FlatMap | StageKind::Peek => {
                Statefulness::Stateless
            }
            StageKind::Limit | StageKind::Skip | StageKind::TakeWhile | StageKind::DropWhile => {
                Statefulness::StatefulBounded
            }
            StageKind::Sorted | StageKind::Distinct => Statefulness::StatefulUnbounded,
        }
    }

    /// True for `limit` and `take_while`, which make an infinite input finite
    pub fn bounds_input(self) -> bool {
        matches!(self, StageKind::Limit | StageKind::TakeWhile)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Map => "map",
            StageKind::Filter => "filter",
            StageKind::FlatMap => "flat_map",
            StageKind::Peek => "peek",
            StageKind::Sorted => "sorted",
            StageKind::Distinct => "distinct",
            StageKind::Limit => "limit",
            StageKind::Skip => "skip",
            StageKind::TakeWhile => "take_while",
            StageKind::DropWhile => "drop_while",
        };
        f.write_str(name)
    }
}

/// Operation that keeps the element type
pub(crate) enum Op<T> {
    Filter(PredicateFn<T>),
    Peek(ActionFn<T>),
    Sorted(Comparator<T>),
    Distinct(DistinctFactory<T>),
    Limit(u64),
    Skip(u64),
    TakeWhile(PredicateFn<T>),
    DropWhile(PredicateFn<T>),
}

impl<T> Op<T> {
    pub(crate) fn kind(&self) -> StageKind {
        match self {
            Op::Filter(_) => StageKind::Filter,
            Op::Peek(_) => StageKind::Peek,
            Op::Sorted(_) => StageKind::Sorted,
            Op::Distinct(_) => StageKind::Distinct,
            Op::Limit(_) => StageKind::Limit,
            Op::Skip(_) => StageKind::Skip,
            Op::TakeWhile(_) => StageKind::TakeWhile,
            Op::DropWhile(_) => StageKind::DropWhile,
        }
    }
}

/// Operation that changes the element type from `I` to `O`
pub(crate) enum Conversion<I, O> {
    Map(MapFn<I, O>),
    FlatMap(FlatMapFn<I, O>),
}

/// Linked stage chain; the head is always a source
pub(crate) enum Stage<T> {
    Source(BoxSource<T>),
    Convert(Box<dyn Converted<T>>),
    Op { upstream: Box<Stage<T>>, op: Op<T> },
}

/// Type-erased stage whose upstream yields a different element type
pub(crate) trait Converted<O>: Send {
    fn plan(self: Box<Self>, context: &PlanContext<'_>) -> Result<BoxSegment<O>>;
}

pub(crate) struct ConvertStage<I, O> {
    pub(crate) upstream: Stage<I>,
    pub(crate) conversion: Conversion<I, O>,
}

impl<I, O> Converted<O> for ConvertStage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn plan(self: Box<Self>, context: &PlanContext<'_>) -> Result<BoxSegment<O>> {
        let upstream = self.upstream.plan(context)?;
        Ok(crate::eval::convert(upstream, self.conversion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statefulness_tags() {
        assert_eq!(StageKind::Map.statefulness(), Statefulness::Stateless);
        assert_eq!(StageKind::Peek.statefulness(), Statefulness::Stateless);
        assert_eq!(StageKind::Skip.statefulness(), Statefulness::StatefulBounded);
        assert_eq!(StageKind::Sorted.statefulness(), Statefulness::StatefulUnbounded);
        assert_eq!(StageKind::Distinct.statefulness(), Statefulness::StatefulUnbounded);
    }

    #[test]
    fn test_only_limit_and_take_while_bound_input() {
        assert!(StageKind::Limit.bounds_input());
        assert!(StageKind::TakeWhile.bounds_input());
        assert!(!StageKind::Skip.bounds_input());
        assert!(!StageKind::DropWhile.bounds_input());
    }

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::FlatMap.to_string(), "flat_map");
        assert_eq!(StageKind::TakeWhile.to_string(), "take_while");
    }

    #[test]
    fn test_distinct_factory_starts_fresh() {
        let factory = distinct_factory::<&str>();
        let mut first = factory();
        assert!(first(&"a"));
        assert!(!first(&"a"));

        let mut second = factory();
        assert!(second(&"a"));
    }
}
