//! Counting, summing and averaging
//!
//! Integer totals wrap on overflow. Floating-point totals use compensated
//! (Kahan) summation, which keeps the error of long sums independent of the
//! number of elements and of how the input was split.

use std::fmt::Debug;

use super::{Collector, CollectorCharacteristics};

/// Running floating-point total with Kahan compensation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
    /// Uncompensated sum; recovers infinities the compensation turns into NaN
    simple: f64,
}

impl KahanSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.simple += value;
        let corrected = value - self.compensation;
        let total = self.sum + corrected;
        self.compensation = (total - self.sum) - corrected;
        self.sum = total;
    }

    pub fn merge(&mut self, other: KahanSum) {
        self.simple += other.simple;
        self.add(other.sum);
        self.add(-other.compensation);
    }

    pub fn value(&self) -> f64 {
        let total = self.sum - self.compensation;
        if total.is_nan() && self.simple.is_infinite() {
            self.simple
        } else {
            total
        }
    }
}

/// Numeric element types the summing collectors accept
pub trait Numeric: Copy + PartialOrd + Debug + Send + Sync + 'static {
    /// Running total
    type Total: Copy + Default + Debug + Send + Sync + 'static;

    fn add_to(total: &mut Self::Total, value: Self);

    fn merge(left: Self::Total, right: Self::Total) -> Self::Total;

    fn total(total: Self::Total) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! integer_numeric {
    ($($int:ty),+) => {
        $(
            impl Numeric for $int {
                type Total = $int;

                fn add_to(total: &mut $int, value: $int) {
                    *total = total.wrapping_add(value);
                }

                fn merge(left: $int, right: $int) -> $int {
                    left.wrapping_add(right)
                }

                fn total(total: $int) -> $int {
                    total
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )+
    };
}

integer_numeric!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl Numeric for f64 {
    type Total = KahanSum;

    fn add_to(total: &mut KahanSum, value: f64) {
        total.add(value);
    }

    fn merge(mut left: KahanSum, right: KahanSum) -> KahanSum {
        left.merge(right);
        left
    }

    fn total(total: KahanSum) -> f64 {
        total.value()
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Numeric for f32 {
    type Total = KahanSum;

    fn add_to(total: &mut KahanSum, value: f32) {
        total.add(f64::from(value));
    }

    fn merge(mut left: KahanSum, right: KahanSum) -> KahanSum {
        left.merge(right);
        left
    }

    fn total(total: KahanSum) -> f32 {
        total.value() as f32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

/// Number of elements
pub fn counting<T: 'static>() -> Collector<T, u64, u64> {
    Collector::new(|| 0, |count: &mut u64, _: T| *count += 1, |a, b| a + b)
        .with_characteristics(CollectorCharacteristics::UNORDERED)
}

/// Sum of numeric elements
pub fn summing<N: Numeric>() -> Collector<N, N::Total, N> {
    summing_by(|value: &N| *value)
}

/// Sum of `mapper(element)`
pub fn summing_by<T, N, F>(mapper: F) -> Collector<T, N::Total, N>
where
    T: 'static,
    N: Numeric,
    F: Fn(&T) -> N + Send + Sync + 'static,
{
    Collector::with_finisher(
        N::Total::default,
        move |total: &mut N::Total, item: T| N::add_to(total, mapper(&item)),
        N::merge,
        N::total,
    )
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

/// Arithmetic mean of numeric elements; `0.0` for no elements
pub fn averaging<N: Numeric>() -> Collector<N, (KahanSum, u64), f64> {
    averaging_by(|value: &N| *value)
}

/// Arithmetic mean of `mapper(element)`; `0.0` for no elements
pub fn averaging_by<T, N, F>(mapper: F) -> Collector<T, (KahanSum, u64), f64>
where
    T: 'static,
    N: Numeric,
    F: Fn(&T) -> N + Send + Sync + 'static,
{
    Collector::with_finisher(
        || (KahanSum::new(), 0u64),
        move |(sum, count): &mut (KahanSum, u64), item: T| {
            sum.add(mapper(&item).to_f64());
            *count += 1;
        },
        |(mut sum, count): (KahanSum, u64), (other, other_count): (KahanSum, u64)| {
            sum.merge(other);
            (sum, count + other_count)
        },
        |(sum, count): (KahanSum, u64)| {
            if count == 0 {
                0.0
            } else {
                sum.value() / count as f64
            }
        },
    )
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

/// Count, sum, minimum, maximum and average in one pass
#[derive(Debug, Clone, Copy)]
pub struct SummaryStatistics<N: Numeric> {
    count: u64,
    total: N::Total,
    mean: KahanSum,
    min: Option<N>,
    max: Option<N>,
}

impl<N: Numeric> Default for SummaryStatistics<N> {
    fn default() -> Self {
        Self {
            count: 0,
            total: N::Total::default(),
            mean: KahanSum::new(),
            min: None,
            max: None,
        }
    }
}

impl<N: Numeric> SummaryStatistics<N> {
    pub fn accept(&mut self, value: N) {
        self.count += 1;
        N::add_to(&mut self.total, value);
        self.mean.add(value.to_f64());
        if self.min.is_none_or(|min| value < min) {
            self.min = Some(value);
        }
        if self.max.is_none_or(|max| value > max) {
            self.max = Some(value);
        }
    }

    pub fn combine(mut self, other: Self) -> Self {
        self.count += other.count;
        self.total = N::merge(self.total, other.total);
        self.mean.merge(other.mean);
        if let Some(min) = other.min {
            if self.min.is_none_or(|current| min < current) {
                self.min = Some(min);
            }
        }
        if let Some(max) = other.max {
            if self.max.is_none_or(|current| max > current) {
                self.max = Some(max);
            }
        }
        self
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> N {
        N::total(self.total)
    }

    pub fn min(&self) -> Option<N> {
        self.min
    }

    pub fn max(&self) -> Option<N> {
        self.max
    }

    /// `0.0` for no elements
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean.value() / self.count as f64
        }
    }
}

/// [`SummaryStatistics`] of `mapper(element)`
pub fn summarizing<T, N, F>(mapper: F) -> Collector<T, SummaryStatistics<N>, SummaryStatistics<N>>
where
    T: 'static,
    N: Numeric,
    F: Fn(&T) -> N + Send + Sync + 'static,
{
    Collector::new(
        SummaryStatistics::default,
        move |stats: &mut SummaryStatistics<N>, item: T| stats.accept(mapper(&item)),
        SummaryStatistics::combine,
    )
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<T, A, R>(collector: Collector<T, A, R>, items: impl IntoIterator<Item = T>) -> R {
        let mut container = collector.supply();
        for item in items {
            collector.accumulate(&mut container, item).unwrap();
        }
        collector.finish(container).unwrap()
    }

    #[test]
    fn test_summing_integers() {
        assert_eq!(run(summing::<i32>(), 1..=5), 15);
        assert_eq!(run(summing_by(|s: &&str| s.len()), ["ab", "cde"]), 5);
    }

    #[test]
    fn test_kahan_summation_is_compensated() {
        let items = std::iter::once(1.0).chain(std::iter::repeat_n(1e-16, 10_000));
        let total = run(summing::<f64>(), items);
        assert!((total - (1.0 + 1e-12)).abs() < 1e-15, "total = {total}");
    }

    #[test]
    fn test_averaging_empty_is_zero() {
        assert_eq!(run(averaging::<i64>(), []), 0.0);
        assert_eq!(run(averaging::<i64>(), [1, 2, 3, 4]), 2.5);
    }

    #[test]
    fn test_counting() {
        assert_eq!(run(counting(), ["a", "b", "c"]), 3);
    }

    #[test]
    fn test_summarizing() {
        let stats = run(summarizing(|x: &i32| *x), [4, -2, 7]);
        assert_eq!(stats.count(), 3);
        assert_eq!(stats.sum(), 9);
        assert_eq!(stats.min(), Some(-2));
        assert_eq!(stats.max(), Some(7));
        assert_eq!(stats.average(), 3.0);

        let empty = run(summarizing(|x: &f64| *x), []);
        assert_eq!(empty.min(), None);
        assert_eq!(empty.average(), 0.0);
    }

    #[test]
    fn test_summary_combine() {
        let mut left = SummaryStatistics::<u32>::default();
        left.accept(5);
        let mut right = SummaryStatistics::default();
        right.accept(1);
        right.accept(9);
        let combined = left.combine(right);
        assert_eq!(combined.count(), 3);
        assert_eq!(combined.min(), Some(1));
        assert_eq!(combined.max(), Some(9));
        assert_eq!(combined.sum(), 15);
    }
}
