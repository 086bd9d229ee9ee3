use std::collections::LinkedList;

use super::{BoxSource, Characteristics, Source};

/// Source over a linked list.
///
/// Splitting has to walk to the midpoint, so the source does not advertise
/// `SUBSIZED`; the evaluator splits it coarsely and callers may prefer to keep
/// such pipelines sequential.
pub struct LinkedSource<T> {
    list: LinkedList<T>,
}

impl<T> LinkedSource<T> {
    pub fn new(list: LinkedList<T>) -> Self {
        Self { list }
    }
}

impl<T: Send + 'static> Source<T> for LinkedSource<T> {
    fn next(&mut self) -> Option<T> {
        self.list.pop_front()
    }

    fn estimate_size(&self) -> Option<u64> {
        Some(self.list.len() as u64)
    }

    fn try_split(&mut self) -> Option<BoxSource<T>> {
        let len = self.list.len();
        if len < 2 {
            return None;
        }
        // O(n): walks from the nearer end to the midpoint
        let remainder = self.list.split_off(len / 2);
        let prefix = std::mem::replace(&mut self.list, remainder);
        Some(Box::new(Self { list: prefix }))
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED | Characteristics::SIZED
    }
}
