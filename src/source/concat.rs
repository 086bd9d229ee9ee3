use super::{BoxSource, Characteristics, Source};

/// Elements of one source followed by the elements of another.
///
/// The first split hands off the whole first source; afterwards splitting
/// delegates to the second.
pub struct ConcatSource<T> {
    first: Option<BoxSource<T>>,
    second: BoxSource<T>,
}

impl<T> ConcatSource<T> {
    pub fn new(first: BoxSource<T>, second: BoxSource<T>) -> Self {
        Self {
            first: Some(first),
            second,
        }
    }
}

impl<T: Send + 'static> Source<T> for ConcatSource<T> {
    fn next(&mut self) -> Option<T> {
        if let Some(first) = self.first.as_mut() {
            if let Some(item) = first.next() {
                return Some(item);
            }
            self.first = None;
        }
        self.second.next()
    }

    fn estimate_size(&self) -> Option<u64> {
        match &self.first {
            Some(first) => first
                .estimate_size()
                .zip(self.second.estimate_size())
                .map(|(a, b)| a.saturating_add(b)),
            None => self.second.estimate_size(),
        }
    }

    fn try_split(&mut self) -> Option<BoxSource<T>> {
        match self.first.take() {
            Some(first) => Some(first),
            None => self.second.try_split(),
        }
    }

    fn characteristics(&self) -> Characteristics {
        match &self.first {
            // Order, size and immutability survive concatenation; distinctness
            // and sortedness do not
            Some(first) => {
                let shared = first.characteristics() & self.second.characteristics();
                shared.intersection(
                    Characteristics::ORDERED
                        | Characteristics::SIZED
                        | Characteristics::IMMUTABLE
                        | Characteristics::NONNULL,
                )
            }
            None => self.second.characteristics(),
        }
    }

    fn is_infinite(&self) -> bool {
        self.first.as_ref().is_some_and(|first| first.is_infinite()) || self.second.is_infinite()
    }

    fn set_batch_unit(&mut self, unit: u64) {
        if let Some(first) = self.first.as_mut() {
            first.set_batch_unit(unit);
        }
        self.second.set_batch_unit(unit);
    }
}
