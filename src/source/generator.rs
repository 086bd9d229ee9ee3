use std::collections::VecDeque;

use super::{ArraySource, BoxSource, Characteristics, Source};
use crate::config::DEFAULT_UNSIZED_LEAF_SIZE;

/// Largest batch pulled by a single split
const MAX_BATCH: usize = 1 << 25;

/// Source over an iterator whose size is unknown, possibly infinite.
///
/// Splitting pulls the next batch of elements into an [`ArraySource`] prefix.
/// Batches grow by the batch unit per split so that long sequences end up with
/// leaves of useful size while short ones are not over-buffered. The unit
/// defaults to the default `unsized_leaf_size`; parallel evaluation sets it
/// from the scheduler's splitting configuration.
pub struct IterSource<I> {
    iter: I,
    characteristics: Characteristics,
    infinite: bool,
    unit: usize,
    batch: usize,
    exhausted: bool,
}

impl<I: Iterator> IterSource<I> {
    /// Possibly finite iterator
    pub fn new(iter: I, characteristics: Characteristics) -> Self {
        Self::build(iter, characteristics, false)
    }

    /// Iterator that never returns `None`
    pub fn infinite(iter: I, characteristics: Characteristics) -> Self {
        Self::build(iter, characteristics, true)
    }

    fn build(iter: I, characteristics: Characteristics, infinite: bool) -> Self {
        Self {
            iter,
            // Sizes are never known up front
            characteristics: characteristics
                .without(Characteristics::SIZED | Characteristics::SUBSIZED),
            infinite,
            unit: DEFAULT_UNSIZED_LEAF_SIZE as usize,
            batch: 0,
            exhausted: false,
        }
    }
}

impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    fn next(&mut self) -> Option<I::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.iter.next();
        self.exhausted = item.is_none();
        item
    }

    fn estimate_size(&self) -> Option<u64> {
        if self.exhausted { Some(0) } else { None }
    }

    fn try_split(&mut self) -> Option<BoxSource<I::Item>> {
        if self.exhausted {
            return None;
        }
        self.batch = self.batch.saturating_add(self.unit).min(MAX_BATCH);

        let mut prefix = VecDeque::with_capacity(self.batch);
        while prefix.len() < self.batch {
            match self.next() {
                Some(item) => prefix.push_back(item),
                None => break,
            }
        }
        if prefix.is_empty() {
            return None;
        }
        // The buffered prefix is sized even though the remainder is not
        Some(Box::new(ArraySource::with_characteristics(
            prefix,
            self.characteristics,
        )))
    }

    fn characteristics(&self) -> Characteristics {
        self.characteristics
    }

    fn is_infinite(&self) -> bool {
        self.infinite
    }

    fn set_batch_unit(&mut self, unit: u64) {
        self.unit = usize::try_from(unit).unwrap_or(MAX_BATCH).clamp(1, MAX_BATCH);
    }
}

/// `seed, step(seed), step(step(seed)), …`
///
/// Unlike [`std::iter::successors`], `step` runs only when the element after
/// the last one returned is requested.
pub(crate) struct Successors<T, F> {
    seed: Option<T>,
    previous: Option<T>,
    step: F,
}

impl<T, F> Successors<T, F> {
    pub(crate) fn new(seed: T, step: F) -> Self {
        Self {
            seed: Some(seed),
            previous: None,
            step,
        }
    }
}

impl<T, F> Iterator for Successors<T, F>
where
    T: Clone,
    F: FnMut(&T) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = match self.seed.take() {
            Some(seed) => seed,
            None => (self.step)(self.previous.as_ref()?),
        };
        self.previous = Some(item.clone());
        Some(item)
    }
}
