//! Terminal operations
//!
//! A terminal evaluates leaves into partial results, merges sibling partials
//! and turns the final partial into the value returned to the caller.

use std::cmp::Ordering;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use super::{CancellationToken, Segment, drive};
use crate::collector::Collector;
use crate::error::{Result, StreamError};
use crate::pipeline::stage::{Comparator, PredicateFn};

pub(crate) type BinaryFn<T> = Arc<dyn Fn(T, T) -> anyhow::Result<T> + Send + Sync>;
pub(crate) type ConsumerFn<T> = Arc<dyn Fn(T) -> anyhow::Result<()> + Send + Sync>;

/// How a terminal may stop before seeing every element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShortCircuit {
    None,
    /// Any satisfied leaf decides the result
    Unordered,
    /// A satisfied leaf decides the result for everything to its right
    Ordered,
}

pub(crate) trait Terminal<T>: Send + Sync + 'static {
    type Partial: Send + 'static;
    type Output;

    fn name(&self) -> &'static str;

    fn short_circuit(&self) -> ShortCircuit {
        ShortCircuit::None
    }

    /// Evaluate one leaf sequentially
    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<Self::Partial>;

    /// Merge the partials of two adjacent leaves, `left` first in encounter order
    fn combine(&self, left: Self::Partial, right: Self::Partial) -> Result<Self::Partial>;

    /// True once a short-circuiting terminal has its answer
    fn satisfied(&self, _partial: &Self::Partial) -> bool {
        false
    }

    fn finish(&self, partial: Self::Partial) -> Result<Self::Output>;
}

/// Mutable reduction through a collector, one container per leaf
pub(crate) struct Collect<T, A, R> {
    collector: Collector<T, A, R>,
}

impl<T, A, R> Collect<T, A, R> {
    pub(crate) fn new(collector: Collector<T, A, R>) -> Self {
        Self { collector }
    }
}

impl<T, A, R> Terminal<T> for Collect<T, A, R>
where
    T: Send + 'static,
    A: Send + 'static,
    R: 'static,
{
    type Partial = A;
    type Output = R;

    fn name(&self) -> &'static str {
        "collect"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<A> {
        let mut container = self.collector.supply();
        drive(segment, token, &mut |item| {
            self.collector
                .accumulate(&mut container, item)
                .map_err(StreamError::callback)?;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(container)
    }

    fn combine(&self, left: A, right: A) -> Result<A> {
        self.collector
            .combine(left, right)
            .map_err(StreamError::callback)
    }

    fn finish(&self, partial: A) -> Result<R> {
        self.collector.finish(partial).map_err(StreamError::callback)
    }
}

/// Accumulation into one container shared by every leaf
///
/// The container is a cloneable handle to a concurrent structure; the caller
/// keeps the original and finishes it once evaluation is over.
pub(crate) struct SharedCollect<T, A, R> {
    handle: Mutex<A>,
    collector: Collector<T, A, R>,
}

impl<T, A, R> SharedCollect<T, A, R> {
    pub(crate) fn new(handle: A, collector: Collector<T, A, R>) -> Self {
        Self {
            handle: Mutex::new(handle),
            collector,
        }
    }
}

impl<T, A, R> Terminal<T> for SharedCollect<T, A, R>
where
    T: Send + 'static,
    A: Send + 'static,
    R: 'static,
{
    type Partial = ();
    type Output = ();

    fn name(&self) -> &'static str {
        "collect (concurrent)"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<()> {
        let shared = {
            let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            self.collector.share(&handle)
        };
        let Some(mut shared) = shared else {
            return Err(StreamError::callback(anyhow::anyhow!(
                "concurrent collector cannot share its container"
            )));
        };
        drive(segment, token, &mut |item| {
            self.collector
                .accumulate(&mut shared, item)
                .map_err(StreamError::callback)?;
            Ok(ControlFlow::Continue(()))
        })
    }

    fn combine(&self, _left: (), _right: ()) -> Result<()> {
        Ok(())
    }

    fn finish(&self, _partial: ()) -> Result<()> {
        Ok(())
    }
}

/// Fold without identity; `None` for an empty input
pub(crate) struct Reduce<T> {
    op: BinaryFn<T>,
}

impl<T> Reduce<T> {
    pub(crate) fn new(op: BinaryFn<T>) -> Self {
        Self { op }
    }

    fn fold(&self, accumulated: Option<T>, item: T) -> Result<T> {
        match accumulated {
            Some(previous) => (self.op)(previous, item).map_err(StreamError::callback),
            None => Ok(item),
        }
    }
}

impl<T: Send + 'static> Terminal<T> for Reduce<T> {
    type Partial = Option<T>;
    type Output = Option<T>;

    fn name(&self) -> &'static str {
        "reduce"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<Option<T>> {
        let mut accumulated = None;
        drive(segment, token, &mut |item| {
            accumulated = Some(self.fold(accumulated.take(), item)?);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(accumulated)
    }

    fn combine(&self, left: Option<T>, right: Option<T>) -> Result<Option<T>> {
        match right {
            Some(right) => self.fold(left, right).map(Some),
            None => Ok(left),
        }
    }

    fn finish(&self, partial: Option<T>) -> Result<Option<T>> {
        Ok(partial)
    }
}

pub(crate) struct ForEach<T> {
    action: ConsumerFn<T>,
}

impl<T> ForEach<T> {
    pub(crate) fn new(action: ConsumerFn<T>) -> Self {
        Self { action }
    }
}

impl<T: Send + 'static> Terminal<T> for ForEach<T> {
    type Partial = ();
    type Output = ();

    fn name(&self) -> &'static str {
        "for_each"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<()> {
        drive(segment, token, &mut |item| {
            (self.action)(item).map_err(StreamError::callback)?;
            Ok(ControlFlow::Continue(()))
        })
    }

    fn combine(&self, _left: (), _right: ()) -> Result<()> {
        Ok(())
    }

    fn finish(&self, _partial: ()) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct Count;

impl<T: Send + 'static> Terminal<T> for Count {
    type Partial = u64;
    type Output = u64;

    fn name(&self) -> &'static str {
        "count"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<u64> {
        let mut count = 0u64;
        drive(segment, token, &mut |_| {
            count += 1;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(count)
    }

    fn combine(&self, left: u64, right: u64) -> Result<u64> {
        Ok(left + right)
    }

    fn finish(&self, partial: u64) -> Result<u64> {
        Ok(partial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchKind {
    Any,
    All,
    None,
}

impl MatchKind {
    /// Predicate outcome that decides the match
    fn decisive(self) -> bool {
        !matches!(self, MatchKind::All)
    }
}

pub(crate) struct Match<T> {
    predicate: PredicateFn<T>,
    kind: MatchKind,
}

impl<T> Match<T> {
    pub(crate) fn new(predicate: PredicateFn<T>, kind: MatchKind) -> Self {
        Self { predicate, kind }
    }
}

impl<T: Send + 'static> Terminal<T> for Match<T> {
    /// Whether a decisive element was found
    type Partial = bool;
    type Output = bool;

    fn name(&self) -> &'static str {
        match self.kind {
            MatchKind::Any => "any_match",
            MatchKind::All => "all_match",
            MatchKind::None => "none_match",
        }
    }

    fn short_circuit(&self) -> ShortCircuit {
        ShortCircuit::Unordered
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<bool> {
        let decisive = self.kind.decisive();
        let mut found = false;
        drive(segment, token, &mut |item| {
            if (self.predicate)(&item).map_err(StreamError::callback)? == decisive {
                found = true;
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(found)
    }

    fn combine(&self, left: bool, right: bool) -> Result<bool> {
        Ok(left || right)
    }

    fn satisfied(&self, partial: &bool) -> bool {
        *partial
    }

    fn finish(&self, found: bool) -> Result<bool> {
        Ok(match self.kind {
            MatchKind::Any => found,
            MatchKind::All | MatchKind::None => !found,
        })
    }
}

pub(crate) struct Find {
    ordered: bool,
}

impl Find {
    pub(crate) fn first() -> Self {
        Self { ordered: true }
    }

    pub(crate) fn any() -> Self {
        Self { ordered: false }
    }
}

impl<T: Send + 'static> Terminal<T> for Find {
    type Partial = Option<T>;
    type Output = Option<T>;

    fn name(&self) -> &'static str {
        if self.ordered { "find_first" } else { "find_any" }
    }

    fn short_circuit(&self) -> ShortCircuit {
        if self.ordered {
            ShortCircuit::Ordered
        } else {
            ShortCircuit::Unordered
        }
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<Option<T>> {
        let mut found = None;
        drive(segment, token, &mut |item| {
            found = Some(item);
            Ok(ControlFlow::Break(()))
        })?;
        Ok(found)
    }

    fn combine(&self, left: Option<T>, right: Option<T>) -> Result<Option<T>> {
        Ok(left.or(right))
    }

    fn satisfied(&self, partial: &Option<T>) -> bool {
        partial.is_some()
    }

    fn finish(&self, partial: Option<T>) -> Result<Option<T>> {
        Ok(partial)
    }
}

/// Every element in encounter order
pub(crate) struct Gather;

impl<T: Send + 'static> Terminal<T> for Gather {
    type Partial = Vec<T>;
    type Output = Vec<T>;

    fn name(&self) -> &'static str {
        "gather"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<Vec<T>> {
        let mut items = Vec::new();
        drive(segment, token, &mut |item| {
            items.push(item);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(items)
    }

    fn combine(&self, mut left: Vec<T>, mut right: Vec<T>) -> Result<Vec<T>> {
        left.append(&mut right);
        Ok(left)
    }

    fn finish(&self, partial: Vec<T>) -> Result<Vec<T>> {
        Ok(partial)
    }
}

/// The first `limit` elements in encounter order
///
/// A leaf stops pulling once it holds `limit` elements, and a satisfied
/// prefix cancels every task to its right.
pub(crate) struct Prefix {
    limit: usize,
}

impl Prefix {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
        }
    }
}

impl<T: Send + 'static> Terminal<T> for Prefix {
    type Partial = Vec<T>;
    type Output = Vec<T>;

    fn name(&self) -> &'static str {
        "limit"
    }

    fn short_circuit(&self) -> ShortCircuit {
        ShortCircuit::Ordered
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<Vec<T>> {
        let mut items = Vec::new();
        if self.limit == 0 {
            return Ok(items);
        }
        drive(segment, token, &mut |item| {
            items.push(item);
            Ok(if items.len() >= self.limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })?;
        Ok(items)
    }

    fn combine(&self, mut left: Vec<T>, mut right: Vec<T>) -> Result<Vec<T>> {
        left.append(&mut right);
        left.truncate(self.limit);
        Ok(left)
    }

    fn satisfied(&self, partial: &Vec<T>) -> bool {
        partial.len() >= self.limit
    }

    fn finish(&self, partial: Vec<T>) -> Result<Vec<T>> {
        Ok(partial)
    }
}

/// Elements up to the first one failing `predicate`; `stopped` once it was seen
pub(crate) struct PrefixRun<T> {
    items: Vec<T>,
    stopped: bool,
}

impl<T> PrefixRun<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// The longest prefix matching `predicate`
///
/// A leaf stops at its first mismatch, which also cancels every task to its
/// right.
pub(crate) struct PrefixWhile<T> {
    predicate: PredicateFn<T>,
}

impl<T> PrefixWhile<T> {
    pub(crate) fn new(predicate: PredicateFn<T>) -> Self {
        Self { predicate }
    }
}

impl<T: Send + 'static> Terminal<T> for PrefixWhile<T> {
    type Partial = PrefixRun<T>;
    type Output = Vec<T>;

    fn name(&self) -> &'static str {
        "take_while"
    }

    fn short_circuit(&self) -> ShortCircuit {
        ShortCircuit::Ordered
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<PrefixRun<T>> {
        let mut items = Vec::new();
        let mut stopped = false;
        drive(segment, token, &mut |item| {
            if !(self.predicate)(&item).map_err(StreamError::callback)? {
                stopped = true;
                return Ok(ControlFlow::Break(()));
            }
            items.push(item);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(PrefixRun { items, stopped })
    }

    fn combine(&self, mut left: PrefixRun<T>, mut right: PrefixRun<T>) -> Result<PrefixRun<T>> {
        if left.stopped {
            return Ok(left);
        }
        left.items.append(&mut right.items);
        left.stopped = right.stopped;
        Ok(left)
    }

    fn satisfied(&self, partial: &PrefixRun<T>) -> bool {
        partial.stopped
    }

    fn finish(&self, partial: PrefixRun<T>) -> Result<Vec<T>> {
        Ok(partial.items)
    }
}

/// Sorted leaves merged pairwise; ties keep encounter order
pub(crate) struct SortRuns<T> {
    comparator: Comparator<T>,
}

impl<T> SortRuns<T> {
    pub(crate) fn new(comparator: Comparator<T>) -> Self {
        Self { comparator }
    }
}

impl<T: Send + 'static> Terminal<T> for SortRuns<T> {
    type Partial = Vec<T>;
    type Output = Vec<T>;

    fn name(&self) -> &'static str {
        "sorted"
    }

    fn leaf(&self, segment: &mut dyn Segment<T>, token: &CancellationToken) -> Result<Vec<T>> {
        let mut run = Gather.leaf(segment, token)?;
        run.sort_by(|a, b| (self.comparator)(a, b));
        Ok(run)
    }

    fn combine(&self, left: Vec<T>, right: Vec<T>) -> Result<Vec<T>> {
        Ok(merge_runs(left, right, &self.comparator))
    }

    fn finish(&self, partial: Vec<T>) -> Result<Vec<T>> {
        Ok(partial)
    }
}

fn merge_runs<T>(left: Vec<T>, right: Vec<T>, comparator: &Comparator<T>) -> Vec<T> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => comparator(r, l) != Ordering::Less,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return merged,
        };
        merged.extend(if take_left { left.next() } else { right.next() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_runs_is_stable() {
        let by_key: Comparator<(u8, char)> = Arc::new(|a: &(u8, char), b: &(u8, char)| a.0.cmp(&b.0));
        let left = vec![(1, 'a'), (2, 'b'), (2, 'c')];
        let right = vec![(0, 'x'), (2, 'y'), (3, 'z')];
        let merged = merge_runs(left, right, &by_key);
        assert_eq!(
            merged,
            vec![(0, 'x'), (1, 'a'), (2, 'b'), (2, 'c'), (2, 'y'), (3, 'z')]
        );
    }

    #[test]
    fn test_match_outcomes() {
        let positive: PredicateFn<i32> = Arc::new(|x: &i32| Ok(*x > 0));
        let any = Match::new(Arc::clone(&positive), MatchKind::Any);
        let all = Match::new(Arc::clone(&positive), MatchKind::All);
        let none = Match::new(positive, MatchKind::None);

        // found = a decisive element was seen
        assert!(Terminal::<i32>::finish(&any, true).unwrap());
        assert!(!Terminal::<i32>::finish(&all, true).unwrap());
        assert!(Terminal::<i32>::finish(&all, false).unwrap());
        assert!(Terminal::<i32>::finish(&none, false).unwrap());
    }

    #[test]
    fn test_reduce_combine_skips_empty_sides() {
        let sum = Reduce::new(Arc::new(|a: i32, b: i32| Ok(a + b)));
        assert_eq!(sum.combine(Some(2), None).unwrap(), Some(2));
        assert_eq!(sum.combine(None, Some(3)).unwrap(), Some(3));
        assert_eq!(sum.combine(Some(2), Some(3)).unwrap(), Some(5));
    }

    #[test]
    fn test_prefix_combine_truncates_to_limit() {
        let prefix = Prefix::new(3);
        let merged = Terminal::<i32>::combine(&prefix, vec![1, 2], vec![3, 4, 5]).unwrap();
        assert_eq!(merged, vec![1, 2, 3]);
        assert!(Terminal::<i32>::satisfied(&prefix, &merged));
        assert!(!Terminal::<i32>::satisfied(&prefix, &vec![1, 2]));
        assert_eq!(Terminal::<i32>::short_circuit(&prefix), ShortCircuit::Ordered);
    }

    #[test]
    fn test_prefix_while_stops_at_first_mismatch() {
        let predicate: PredicateFn<i32> = Arc::new(|x: &i32| Ok(*x < 10));
        let small = PrefixWhile::new(predicate);
        let stopped = PrefixRun { items: vec![1, 2], stopped: true };
        let open = PrefixRun { items: vec![3], stopped: false };
        let merged = small.combine(stopped, open).unwrap();
        assert_eq!(merged.items, vec![1, 2]);
        assert!(small.satisfied(&merged));

        let left = PrefixRun { items: vec![1], stopped: false };
        let right = PrefixRun { items: vec![2, 3], stopped: true };
        let merged = small.combine(left, right).unwrap();
        assert!(merged.stopped);
        assert_eq!(small.finish(merged).unwrap(), vec![1, 2, 3]);
    }
}
