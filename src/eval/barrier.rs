//! Stateful operations in parallel mode
//!
//! `sorted` and `distinct` need their whole input, and the positional
//! operations need to know what precedes each element. Each becomes a
//! synchronization point: the upstream is evaluated in parallel into an
//! ordered buffer, the operation is applied to the buffer, and planning
//! continues from a fresh array source over the result.
//!
//! `limit` and `take_while` evaluate only the prefix they keep: their leaves
//! stop pulling once decided and cancel every task to their right.
//!
//! Positional operations over an upstream of unknown size are not
//! materialized; they are chained lazily and pull their upstream
//! sequentially, which keeps `limit` usable over infinite sources.

use std::sync::Arc;

use super::fork_join;
use super::stateful;
use super::terminal::{Gather, Prefix, PrefixWhile, SortRuns};
use super::{BoxSegment, ParallelContext, SourceSegment};
use crate::error::{Result, StreamError};
use crate::pipeline::stage::{Op, PredicateFn, Statefulness};
use crate::source::{ArraySource, Characteristics};

/// Order-related flags that survive a synchronization point
const PRESERVED: Characteristics = Characteristics::ORDERED
    .union(Characteristics::DISTINCT)
    .union(Characteristics::SORTED)
    .union(Characteristics::NONNULL);

pub(super) fn synchronize<T: Send + 'static>(
    upstream: BoxSegment<T>,
    op: Op<T>,
    context: &ParallelContext,
) -> Result<BoxSegment<T>> {
    let kind = op.kind();
    let preserved = upstream.characteristics().intersection(PRESERVED);

    if kind.statefulness() != Statefulness::StatefulUnbounded && upstream.estimate_size().is_none() {
        tracing::trace!("Chaining {} sequentially over an upstream of unknown size", kind);
        return Ok(stateful::chain(upstream, op));
    }

    tracing::trace!("Synchronizing parallel evaluation at {}", kind);
    let (items, added) = match op {
        Op::Sorted(comparator) => {
            let sorted = fork_join::evaluate(upstream, Arc::new(SortRuns::new(comparator)), context)?;
            (sorted, Characteristics::ORDERED | Characteristics::SORTED)
        }
        Op::Distinct(factory) => {
            let mut first_seen = factory();
            let mut items = materialize(upstream, context)?;
            items.retain(|item| first_seen(item));
            (items, Characteristics::DISTINCT)
        }
        Op::Limit(count) => {
            let items = fork_join::evaluate(upstream, Arc::new(Prefix::new(count)), context)?;
            (items, Characteristics::empty())
        }
        Op::Skip(count) => {
            let mut items = materialize(upstream, context)?;
            let skipped = usize::try_from(count).unwrap_or(usize::MAX).min(items.len());
            items.drain(..skipped);
            (items, Characteristics::empty())
        }
        Op::TakeWhile(predicate) => {
            let run = fork_join::evaluate(upstream, Arc::new(PrefixWhile::new(predicate)), context)?;
            (run.into_items(), Characteristics::empty())
        }
        Op::DropWhile(predicate) => {
            let items = materialize(upstream, context)?;
            (drop_while(items, &predicate)?, Characteristics::empty())
        }
        op @ (Op::Filter(_) | Op::Peek(_)) => return Ok(stateful::chain(upstream, op)),
    };

    Ok(Box::new(SourceSegment::new(Box::new(
        ArraySource::with_characteristics(items, preserved | added),
    ))))
}

/// Evaluate `upstream` in parallel into a buffer in encounter order
fn materialize<T: Send + 'static>(upstream: BoxSegment<T>, context: &ParallelContext) -> Result<Vec<T>> {
    fork_join::evaluate(upstream, Arc::new(Gather), context)
}

fn drop_while<T>(items: Vec<T>, predicate: &PredicateFn<T>) -> Result<Vec<T>> {
    let mut items = items.into_iter();
    let mut kept = Vec::new();
    for item in items.by_ref() {
        if !predicate(&item).map_err(StreamError::callback)? {
            kept.push(item);
            break;
        }
    }
    kept.extend(items);
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;
    use crate::eval::stateful::drain;
    use crate::parallel::SchedulerHandle;
    use crate::pipeline::stage::{ActionFn, Comparator};
    use crate::source;

    fn synchronized(items: Vec<i32>, op: Op<i32>) -> (Vec<i32>, Characteristics) {
        let scheduler = SchedulerHandle::new(3);
        let context = ParallelContext::new(scheduler.clone());
        scheduler
            .invoke(move || {
                let upstream: BoxSegment<i32> =
                    Box::new(SourceSegment::new(source::from_container(items)));
                let mut segment = synchronize(upstream, op, &context)?;
                let flags = segment.characteristics();
                Ok::<_, StreamError>((drain(segment.as_mut())?, flags))
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_sorted_barrier_marks_sorted() {
        let comparator: Comparator<i32> = Arc::new(|a: &i32, b: &i32| b.cmp(a));
        let items: Vec<i32> = (0..2_000).collect();
        let (sorted, flags) = synchronized(items, Op::Sorted(comparator));
        assert_eq!(sorted, (0..2_000).rev().collect::<Vec<_>>());
        assert!(flags.contains(Characteristics::SORTED | Characteristics::SIZED));
    }

    #[test]
    fn test_skip_and_limit_barriers_are_positional() {
        let items: Vec<i32> = (0..1_000).collect();
        assert_eq!(synchronized(items.clone(), Op::Skip(995)).0, vec![995, 996, 997, 998, 999]);
        assert_eq!(synchronized(items.clone(), Op::Limit(3)).0, vec![0, 1, 2]);
        assert!(synchronized(items, Op::Skip(5_000)).0.is_empty());
    }

    #[test]
    fn test_drop_while_keeps_later_matches() {
        let small: PredicateFn<i32> = Arc::new(|x: &i32| Ok(*x < 3));
        let (kept, _) = synchronized(vec![1, 2, 5, 1, 2], Op::DropWhile(small));
        assert_eq!(kept, vec![5, 1, 2]);
    }

    #[test]
    fn test_take_while_propagates_callback_errors() {
        let failing: PredicateFn<i32> = Arc::new(|x: &i32| {
            if *x == 2 {
                anyhow::bail!("bad element {x}")
            }
            Ok(true)
        });
        let scheduler = SchedulerHandle::new(3);
        let context = ParallelContext::new(scheduler.clone());
        let result = scheduler
            .invoke(move || {
                let upstream: BoxSegment<i32> =
                    Box::new(SourceSegment::new(source::from_container(vec![1, 2, 3])));
                synchronize(upstream, Op::TakeWhile(failing), &context).map(|_| ())
            })
            .unwrap();
        assert!(matches!(result, Err(StreamError::Callback { .. })));
    }

    #[test]
    fn test_take_while_barrier_keeps_matching_prefix() {
        let small: PredicateFn<i32> = Arc::new(|x: &i32| Ok(*x < 1_500));
        let items: Vec<i32> = (0..1_000).chain(0..2_000).collect();
        let (kept, _) = synchronized(items, Op::TakeWhile(small));
        assert_eq!(kept, (0..1_000).chain(0..1_500).collect::<Vec<_>>());
    }

    #[test]
    fn test_limit_barrier_stops_pulling_upstream() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let counting: ActionFn<i32> = Arc::new(move |_: &i32| {
            counter.fetch_add(1, AtomicOrdering::Relaxed);
            Ok(())
        });
        let scheduler = SchedulerHandle::new(4);
        let context = ParallelContext::new(scheduler.clone());
        let kept = scheduler
            .invoke(move || {
                let source: BoxSegment<i32> =
                    Box::new(SourceSegment::new(source::from_container((0..100_000).collect::<Vec<i32>>())));
                let upstream = stateful::chain(source, Op::Peek(counting));
                let mut segment = synchronize(upstream, Op::Limit(3), &context)?;
                drain(segment.as_mut())
            })
            .unwrap()
            .unwrap();
        assert_eq!(kept, vec![0, 1, 2]);
        assert!(pulled.load(AtomicOrdering::Relaxed) < 1_000);
    }

    #[test]
    fn test_limit_zero_is_empty() {
        assert!(synchronized((0..100).collect(), Op::Limit(0)).0.is_empty());
    }
}
