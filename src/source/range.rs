use std::ops::Range;

use super::{BoxSource, Characteristics, Source};

/// Source over a half-open integer range; splits arithmetically
pub struct RangeSource<N> {
    next: N,
    end: N,
}

impl<N: Copy + PartialOrd> RangeSource<N> {
    pub fn new(range: Range<N>) -> Self {
        // Normalize empty and reversed ranges
        let end = if range.end < range.start {
            range.start
        } else {
            range.end
        };
        Self {
            next: range.start,
            end,
        }
    }
}

macro_rules! range_source {
    ($($int:ty),+) => {
        $(
            impl Source<$int> for RangeSource<$int> {
                fn next(&mut self) -> Option<$int> {
                    if self.next >= self.end {
                        return None;
                    }
                    let item = self.next;
                    self.next += 1;
                    Some(item)
                }

                fn estimate_size(&self) -> Option<u64> {
                    Some(self.end.abs_diff(self.next) as u64)
                }

                fn try_split(&mut self) -> Option<BoxSource<$int>> {
                    let half = self.end.abs_diff(self.next) / 2;
                    if half == 0 {
                        return None;
                    }
                    let mid = self.next + half as $int;
                    let prefix = RangeSource { next: self.next, end: mid };
                    self.next = mid;
                    Some(Box::new(prefix))
                }

                fn characteristics(&self) -> Characteristics {
                    Characteristics::ORDERED
                        | Characteristics::SORTED
                        | Characteristics::DISTINCT
                        | Characteristics::SIZED
                        | Characteristics::SUBSIZED
                        | Characteristics::IMMUTABLE
                        | Characteristics::NONNULL
                }
            }
        )+
    };
}

range_source!(i32, i64, u32, u64, usize);
