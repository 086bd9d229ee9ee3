//! Property tests: parallel evaluation agrees with sequential evaluation

use std::sync::OnceLock;

use proptest::prelude::*;
use streamfork::{Pipeline, SchedulerHandle, collectors};

fn scheduler() -> &'static SchedulerHandle {
    static SCHEDULER: OnceLock<SchedulerHandle> = OnceLock::new();
    SCHEDULER.get_or_init(|| SchedulerHandle::new(3))
}

fn both_modes<R, F>(build: F) -> (R, R)
where
    F: Fn(bool) -> streamfork::Result<R>,
{
    (build(false).unwrap(), build(true).unwrap())
}

fn pipeline(items: &[i32], parallel: bool) -> Pipeline<i32> {
    let pipeline = Pipeline::from_container(items.to_vec());
    if parallel {
        pipeline.parallel_on(scheduler())
    } else {
        pipeline
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_stateless_chain_equivalence(items in prop::collection::vec(-1000i32..1000, 0..2000)) {
        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel)
                .filter(|x| x % 2 == 0)
                .map(|x| i64::from(x) * 3)
                .flat_map(|x| [x, -x])
                .to_sequence()
        });
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_stateful_chain_equivalence(
        items in prop::collection::vec(0i32..50, 0..1500),
        skip in 0u64..100,
        limit in 0u64..400,
    ) {
        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel)
                .distinct()
                .sorted_by(|a, b| b.cmp(a))
                .skip(skip)
                .limit(limit)
                .to_sequence()
        });
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_distinct_is_idempotent(items in prop::collection::vec(0i32..20, 0..500)) {
        let once = pipeline(&items, true).distinct().to_sequence().unwrap();
        let twice = pipeline(&items, true).distinct().distinct().to_sequence().unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_sorted_matches_stable_sort(items in prop::collection::vec((0u8..8, any::<u16>()), 0..1000)) {
        let mut expected = items.clone();
        expected.sort_by_key(|pair| pair.0);
        let sorted = Pipeline::from_container(items)
            .parallel_on(scheduler())
            .sorted_by_key(|pair| pair.0)
            .to_sequence()
            .unwrap();
        prop_assert_eq!(sorted, expected);
    }

    #[test]
    fn test_positional_ops_equivalence(items in prop::collection::vec(0i32..100, 0..1000), bound in 0i32..100) {
        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel)
                .take_while(move |x| *x != bound)
                .to_sequence()
        });
        prop_assert_eq!(sequential, parallel);

        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel)
                .drop_while(move |x| *x != bound)
                .to_sequence()
        });
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_reductions_equivalence(items in prop::collection::vec(-500i32..500, 0..3000)) {
        let (sequential, parallel) = both_modes(|parallel| pipeline(&items, parallel).count());
        prop_assert_eq!(sequential, parallel);

        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel).collect(collectors::summing::<i32>())
        });
        prop_assert_eq!(sequential, parallel);

        let (sequential, parallel) = both_modes(|parallel| pipeline(&items, parallel).find_first());
        prop_assert_eq!(sequential, parallel);

        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel).min_by(|a, b| a.abs().cmp(&b.abs()))
        });
        prop_assert_eq!(sequential, parallel);

        let (sequential, parallel) = both_modes(|parallel| {
            pipeline(&items, parallel)
                .collect(collectors::grouping_by_ordered(|x: &i32| x.rem_euclid(7), collectors::to_vec()))
        });
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_partition_is_total(items in prop::collection::vec(any::<i32>(), 0..1000)) {
        let partition = pipeline(&items, true)
            .collect(collectors::partitioning_by(|x: &i32| x % 2 == 0, collectors::counting()))
            .unwrap();
        prop_assert_eq!(partition.when_true + partition.when_false, items.len() as u64);
    }
}
