use std::collections::VecDeque;
use std::sync::Arc;

use super::{BoxSource, Characteristics, Source};

/// Source that owns contiguous storage; splits at the midpoint
pub struct ArraySource<T> {
    items: VecDeque<T>,
    characteristics: Characteristics,
}

impl<T> ArraySource<T> {
    /// Source over a sequence that keeps its encounter order
    pub fn ordered(items: impl Into<VecDeque<T>>) -> Self {
        Self::with_characteristics(items, Characteristics::ORDERED)
    }

    /// Source with extra characteristics; `SIZED | SUBSIZED` are always added
    pub fn with_characteristics(
        items: impl Into<VecDeque<T>>,
        characteristics: Characteristics,
    ) -> Self {
        Self {
            items: items.into(),
            characteristics: characteristics | Characteristics::SIZED | Characteristics::SUBSIZED,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Send + 'static> Source<T> for ArraySource<T> {
    fn next(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn estimate_size(&self) -> Option<u64> {
        Some(self.items.len() as u64)
    }

    fn try_split(&mut self) -> Option<BoxSource<T>> {
        let len = self.items.len();
        if len < 2 {
            return None;
        }
        let remainder = self.items.split_off(len / 2);
        let prefix = std::mem::replace(&mut self.items, remainder);
        Some(Box::new(Self {
            items: prefix,
            characteristics: self.characteristics,
        }))
    }

    fn characteristics(&self) -> Characteristics {
        self.characteristics
    }
}

/// Source over shared immutable storage; splits by index in O(1) and yields clones
pub struct SharedSource<T> {
    data: Arc<[T]>,
    start: usize,
    end: usize,
}

impl<T> SharedSource<T> {
    pub fn new(data: Arc<[T]>) -> Self {
        let end = data.len();
        Self {
            data,
            start: 0,
            end,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Source<T> for SharedSource<T> {
    fn next(&mut self) -> Option<T> {
        if self.start >= self.end {
            return None;
        }
        let item = self.data[self.start].clone();
        self.start += 1;
        Some(item)
    }

    fn estimate_size(&self) -> Option<u64> {
        Some((self.end - self.start) as u64)
    }

    fn try_split(&mut self) -> Option<BoxSource<T>> {
        let mid = self.start + (self.end - self.start) / 2;
        if mid == self.start {
            return None;
        }
        let prefix = Self {
            data: Arc::clone(&self.data),
            start: self.start,
            end: mid,
        };
        self.start = mid;
        Some(Box::new(prefix))
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED
            | Characteristics::SIZED
            | Characteristics::SUBSIZED
            | Characteristics::IMMUTABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(source: &mut dyn Source<T>) -> Vec<T> {
        std::iter::from_fn(|| source.next()).collect()
    }

    #[test]
    fn test_array_split_returns_prefix() {
        let mut source = ArraySource::ordered(vec![1, 2, 3, 4, 5]);
        let mut prefix = source.try_split().expect("five elements should split");

        assert_eq!(prefix.estimate_size(), Some(2));
        assert_eq!(source.estimate_size(), Some(3));
        assert_eq!(drain(prefix.as_mut()), vec![1, 2]);
        assert_eq!(drain(&mut source), vec![3, 4, 5]);
    }

    #[test]
    fn test_array_single_element_does_not_split() {
        let mut source = ArraySource::ordered(vec![1]);
        assert!(source.try_split().is_none());
        assert_eq!(drain(&mut source), vec![1]);
    }

    #[test]
    fn test_array_split_keeps_characteristics() {
        let mut source =
            ArraySource::with_characteristics(vec![1, 2, 3, 4], Characteristics::DISTINCT);
        let prefix = source.try_split().unwrap();
        assert_eq!(prefix.characteristics(), source.characteristics());
        assert!(prefix.characteristics().contains(Characteristics::SUBSIZED));
    }

    #[test]
    fn test_shared_split_is_disjoint_and_complete() {
        let data: Arc<[u32]> = (0..10).collect::<Vec<_>>().into();
        let mut source = SharedSource::new(data);
        let mut prefix = source.try_split().unwrap();
        let mut inner = prefix.try_split().unwrap();

        let mut all = drain(inner.as_mut());
        all.extend(drain(prefix.as_mut()));
        all.extend(drain(&mut source));
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }
}
