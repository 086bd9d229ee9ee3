//! Splittable sources
//!
//! A [`Source`] is a pull-based cursor over a backing container that can also
//! hand off a disjoint prefix of its remaining elements through
//! [`Source::try_split`]. The fork-join evaluator splits sources recursively
//! until leaves are small enough, so the cost of a split matters:
//!
//! | Backing                | Split cost | Characteristics                         |
//! |------------------------|------------|-----------------------------------------|
//! | `Vec`, `VecDeque`, sets | midpoint, no walk | `SIZED \| SUBSIZED` (+ order flags) |
//! | `Arc<[T]>`             | O(1)       | `ORDERED \| SIZED \| SUBSIZED \| IMMUTABLE` |
//! | integer ranges         | O(1)       | everything but unknown size             |
//! | `LinkedList`           | O(n) walk  | `ORDERED \| SIZED` (no `SUBSIZED`)      |
//! | generators, iterators  | batch copy | unknown size                            |
//!
//! Sources without `SUBSIZED` advertise a linear split cost; the evaluator
//! splits them more coarsely.

mod array;
mod concat;
mod generator;
mod linked;
mod range;

pub use array::{ArraySource, SharedSource};
pub use concat::ConcatSource;
pub use generator::IterSource;
use generator::Successors;
pub use linked::LinkedSource;
pub use range::RangeSource;

use std::collections::{BTreeSet, HashSet, LinkedList, VecDeque};
use std::hash::Hash;
use std::ops::Range;
use std::sync::Arc;

use crate::shared::flag_set;

flag_set! {
    /// Static properties a [`Source`] advertises about the elements it yields
    pub struct Characteristics: u16 {
        /// Elements have a defined encounter order
        const ORDERED = 0;
        /// No two elements are equal
        const DISTINCT = 1;
        /// Elements are yielded in sorted order
        const SORTED = 2;
        /// `estimate_size` is exact
        const SIZED = 3;
        /// Both halves of a split are `SIZED`; splitting does not walk the data
        const SUBSIZED = 4;
        /// The backing container cannot change while the source is traversed
        const IMMUTABLE = 5;
        /// Elements are never absent values
        const NONNULL = 6;
    }
}

/// Splittable, single-pass cursor over elements of type `T`
pub trait Source<T>: Send {
    /// Pull the next element, or `None` once exhausted
    fn next(&mut self) -> Option<T>;

    /// Visit the next element if there is one; returns whether one was visited
    fn try_advance(&mut self, visit: &mut dyn FnMut(T)) -> bool {
        match self.next() {
            Some(item) => {
                visit(item);
                true
            }
            None => false,
        }
    }

    /// Remaining elements, `None` when unknown or infinite
    fn estimate_size(&self) -> Option<u64>;

    /// Split off a disjoint prefix of the remaining elements.
    ///
    /// On success the returned source covers the prefix and `self` covers the
    /// remainder; with `ORDERED` set, every prefix element precedes every
    /// remainder element in encounter order.
    fn try_split(&mut self) -> Option<BoxSource<T>>;

    fn characteristics(&self) -> Characteristics;

    /// True for generator-backed sources that never run out
    fn is_infinite(&self) -> bool {
        false
    }

    /// Batch growth used by [`Source::try_split`] when the size is unknown;
    /// ignored by sized sources
    fn set_batch_unit(&mut self, _unit: u64) {}

    /// Exact remaining size, only when `SIZED` is advertised
    fn exact_size(&self) -> Option<u64> {
        if self.characteristics().contains(Characteristics::SIZED) {
            self.estimate_size()
        } else {
            None
        }
    }
}

/// Boxed source, the form stored in a pipeline
pub type BoxSource<T> = Box<dyn Source<T>>;

impl<T> Source<T> for BoxSource<T> {
    fn next(&mut self) -> Option<T> {
        (**self).next()
    }

    fn try_advance(&mut self, visit: &mut dyn FnMut(T)) -> bool {
        (**self).try_advance(visit)
    }

    fn estimate_size(&self) -> Option<u64> {
        (**self).estimate_size()
    }

    fn try_split(&mut self) -> Option<BoxSource<T>> {
        (**self).try_split()
    }

    fn characteristics(&self) -> Characteristics {
        (**self).characteristics()
    }

    fn is_infinite(&self) -> bool {
        (**self).is_infinite()
    }

    fn set_batch_unit(&mut self, unit: u64) {
        (**self).set_batch_unit(unit)
    }
}

/// Conversion of a backing container into a source
pub trait IntoSource<T> {
    fn into_source(self) -> BoxSource<T>;
}

impl<T: Send + 'static> IntoSource<T> for BoxSource<T> {
    fn into_source(self) -> BoxSource<T> {
        self
    }
}

impl<T: Send + 'static> IntoSource<T> for Vec<T> {
    fn into_source(self) -> BoxSource<T> {
        Box::new(ArraySource::ordered(self))
    }
}

impl<T: Send + 'static> IntoSource<T> for VecDeque<T> {
    fn into_source(self) -> BoxSource<T> {
        Box::new(ArraySource::ordered(self))
    }
}

impl<T: Send + 'static, const N: usize> IntoSource<T> for [T; N] {
    fn into_source(self) -> BoxSource<T> {
        Box::new(ArraySource::ordered(Vec::from(self)))
    }
}

impl<T: Send + 'static> IntoSource<T> for LinkedList<T> {
    fn into_source(self) -> BoxSource<T> {
        Box::new(LinkedSource::new(self))
    }
}

impl<T: Send + Eq + Hash + 'static> IntoSource<T> for HashSet<T> {
    fn into_source(self) -> BoxSource<T> {
        // Hash iteration order is arbitrary, so no ORDERED
        let items: VecDeque<T> = self.into_iter().collect();
        Box::new(ArraySource::with_characteristics(
            items,
            Characteristics::DISTINCT,
        ))
    }
}

impl<T: Send + Ord + 'static> IntoSource<T> for BTreeSet<T> {
    fn into_source(self) -> BoxSource<T> {
        let items: VecDeque<T> = self.into_iter().collect();
        Box::new(ArraySource::with_characteristics(
            items,
            Characteristics::ORDERED | Characteristics::DISTINCT | Characteristics::SORTED,
        ))
    }
}

impl<T: Clone + Send + Sync + 'static> IntoSource<T> for Arc<[T]> {
    fn into_source(self) -> BoxSource<T> {
        Box::new(SharedSource::new(self))
    }
}

macro_rules! range_into_source {
    ($($int:ty),+) => {
        $(
            impl IntoSource<$int> for Range<$int> {
                fn into_source(self) -> BoxSource<$int> {
                    Box::new(RangeSource::new(self))
                }
            }
        )+
    };
}

range_into_source!(i32, i64, u32, u64, usize);

/// Source over any supported container
pub fn from_container<T, C: IntoSource<T>>(container: C) -> BoxSource<T> {
    container.into_source()
}

/// Infinite, unordered source calling `supplier` for every element
pub fn generate<T, F>(supplier: F) -> BoxSource<T>
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    Box::new(IterSource::infinite(
        std::iter::repeat_with(supplier),
        Characteristics::empty(),
    ))
}

/// Ordered source `seed, next(seed), next(next(seed)), …` while `has_next` holds
///
/// `next` runs only when another element is requested.
pub fn iterate<T, P, F>(seed: T, has_next: P, next: F) -> BoxSource<T>
where
    T: Clone + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
    F: FnMut(&T) -> T + Send + 'static,
{
    Box::new(IterSource::new(
        Successors::new(seed, next).take_while(has_next),
        Characteristics::ORDERED | Characteristics::IMMUTABLE,
    ))
}

/// Infinite ordered source `seed, next(seed), next(next(seed)), …`
pub fn iterate_unbounded<T, F>(seed: T, next: F) -> BoxSource<T>
where
    T: Clone + Send + 'static,
    F: FnMut(&T) -> T + Send + 'static,
{
    Box::new(IterSource::infinite(
        Successors::new(seed, next),
        Characteristics::ORDERED | Characteristics::IMMUTABLE,
    ))
}

/// Ordered source of unknown size over an arbitrary iterator
pub fn from_iter<I>(iter: I) -> BoxSource<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    Box::new(IterSource::new(iter.into_iter(), Characteristics::ORDERED))
}

/// Elements of `first` followed by the elements of `second`
pub fn concat<T: Send + 'static>(first: BoxSource<T>, second: BoxSource<T>) -> BoxSource<T> {
    Box::new(ConcatSource::new(first, second))
}

/// Source with no elements
pub fn empty<T: Send + 'static>() -> BoxSource<T> {
    Box::new(ArraySource::ordered(Vec::new()))
}
