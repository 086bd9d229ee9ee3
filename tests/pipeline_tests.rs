//! Integration tests for lazy pipelines

use std::collections::{BTreeSet, LinkedList};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use streamfork::{Pipeline, StageKind, StreamError, source};

/// Test nothing runs before a terminal operation
#[test]
fn test_chaining_is_lazy() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut pipeline = Pipeline::from_container(vec![1, 2, 3]).map(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        x
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(pipeline.count().unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Test a consumed pipeline reports reuse
#[test]
fn test_second_terminal_fails_with_reuse() {
    let mut pipeline = Pipeline::from_container(vec!["a", "b"]);
    pipeline.for_each(|_| {}).unwrap();
    assert!(matches!(pipeline.to_sequence(), Err(StreamError::PipelineReuse)));
}

#[test]
fn test_filter_then_map_keeps_order() {
    let doubled = Pipeline::from_container(vec![3, 1, 2])
        .filter(|x| *x > 0)
        .map(|x| x * 2)
        .to_sequence()
        .unwrap();
    assert_eq!(doubled, vec![6, 2, 4]);
}

#[test]
fn test_flat_map_expands_in_order() {
    let letters = Pipeline::from_container(vec!["ab", "", "cde"])
        .flat_map(|word| word.chars().collect::<Vec<_>>())
        .to_sequence()
        .unwrap();
    assert_eq!(letters, vec!['a', 'b', 'c', 'd', 'e']);
}

/// Test operations on an empty source
#[test]
fn test_empty_source() {
    assert_eq!(Pipeline::<i32>::empty().count().unwrap(), 0);
    assert_eq!(Pipeline::<i32>::empty().find_first().unwrap(), None);
    assert_eq!(Pipeline::<i32>::empty().reduce(7, |a, b| a + b).unwrap(), 7);
    assert!(Pipeline::<i32>::empty().all_match(|_| false).unwrap());
    assert!(!Pipeline::<i32>::empty().any_match(|_| true).unwrap());
    assert!(Pipeline::<i32>::empty().none_match(|_| true).unwrap());
}

#[test]
fn test_skip_and_limit() {
    let window = Pipeline::from_container(0i32..10)
        .skip(3)
        .limit(4)
        .to_sequence()
        .unwrap();
    assert_eq!(window, vec![3, 4, 5, 6]);

    assert_eq!(Pipeline::from_container(0i32..10).limit(0).count().unwrap(), 0);
    assert_eq!(Pipeline::from_container(0i32..3).skip(5).count().unwrap(), 0);
}

#[test]
fn test_take_while_and_drop_while() {
    let items = vec![1, 2, 5, 1, 7];
    let prefix = Pipeline::from_container(items.clone())
        .take_while(|x| *x < 3)
        .to_sequence()
        .unwrap();
    assert_eq!(prefix, vec![1, 2]);

    let rest = Pipeline::from_container(items)
        .drop_while(|x| *x < 3)
        .to_sequence()
        .unwrap();
    assert_eq!(rest, vec![5, 1, 7]);
}

/// Test sorted is stable for equal keys
#[test]
fn test_sorted_by_key_is_stable() {
    let pairs = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
    let sorted = Pipeline::from_container(pairs)
        .sorted_by_key(|pair| pair.0)
        .to_sequence()
        .unwrap();
    assert_eq!(sorted, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
}

#[test]
fn test_distinct_keeps_first_occurrence() {
    let unique = Pipeline::from_container(vec![3, 1, 3, 2, 1])
        .distinct()
        .to_sequence()
        .unwrap();
    assert_eq!(unique, vec![3, 1, 2]);
}

/// Test short-circuiting terminals finish on an infinite generator
#[test]
fn test_short_circuit_on_infinite_generator() {
    let mut next = 0u64;
    let found = Pipeline::generate(move || {
        next += 1;
        next
    })
    .any_match(|x| *x > 1000)
    .unwrap();
    assert!(found);

    let first = Pipeline::iterate_unbounded(1u64, |n| n * 3)
        .filter(|n| *n > 100)
        .find_first()
        .unwrap();
    assert_eq!(first, Some(243));

    let head = Pipeline::iterate_unbounded(0u32, |n| n + 2)
        .limit(3)
        .to_sequence()
        .unwrap();
    assert_eq!(head, vec![0, 2, 4]);
}

/// Test a satisfied match stops pulling from an infinite generator
#[test]
fn test_any_match_visits_only_up_to_first_match() {
    let visited = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visited);
    let mut next = 0u64;
    let found = Pipeline::generate(move || {
        next += 1;
        next
    })
    .peek(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .any_match(|x| *x == 5)
    .unwrap();
    assert!(found);
    assert_eq!(visited.load(Ordering::SeqCst), 5);
}

/// Test limit pulls exactly as many elements as it keeps
#[test]
fn test_limit_visits_only_kept_elements() {
    let visited = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visited);
    let head = Pipeline::iterate_unbounded(0u64, |n| n + 1)
        .peek(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .limit(4)
        .to_sequence()
        .unwrap();
    assert_eq!(head, vec![0, 1, 2, 3]);
    assert_eq!(visited.load(Ordering::SeqCst), 4);
}

/// Test the successor function runs only for elements that are requested
#[test]
fn test_iterate_unbounded_calls_next_on_demand() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let head = Pipeline::iterate_unbounded(1u64, move |n| {
        counter.fetch_add(1, Ordering::SeqCst);
        n + 1
    })
    .limit(3)
    .to_sequence()
    .unwrap();
    assert_eq!(head, vec![1, 2, 3]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let countdown = Pipeline::iterate_unbounded(5u32, |n| n - 1)
        .limit(6)
        .to_sequence()
        .unwrap();
    assert_eq!(countdown, vec![5, 4, 3, 2, 1, 0]);
}

/// Test unbounded stateful operations on an infinite source are rejected
#[test]
fn test_sorted_on_infinite_source_is_rejected() {
    let mut pipeline = Pipeline::iterate_unbounded(0i64, |n| n + 1).distinct();
    match pipeline.count() {
        Err(StreamError::UnboundedStatefulOperation { operation }) => {
            assert_eq!(operation, StageKind::Distinct)
        }
        other => panic!("expected UnboundedStatefulOperation, got {other:?}"),
    }

    let bounded = Pipeline::iterate_unbounded(0i64, |n| n + 1)
        .take_while(|n| *n < 4)
        .sorted_by(|a, b| b.cmp(a))
        .to_sequence()
        .unwrap();
    assert_eq!(bounded, vec![3, 2, 1, 0]);
}

#[test]
fn test_iterate_with_condition_is_finite() {
    let powers = Pipeline::iterate(1u32, |n| *n <= 64, |n| n * 2)
        .sorted()
        .to_sequence()
        .unwrap();
    assert_eq!(powers, vec![1, 2, 4, 8, 16, 32, 64]);
}

/// Test callback errors surface from the terminal operation
#[test]
fn test_callback_error_propagates() {
    let result = Pipeline::from_container(vec!["1", "2", "x", "4"])
        .try_map(|s| Ok(s.parse::<i32>()?))
        .to_sequence();
    match result {
        Err(StreamError::Callback { .. }) => {}
        other => panic!("expected callback error, got {other:?}"),
    }
}

#[test]
fn test_try_for_each_stops_at_first_error() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let result = Pipeline::from_container(0i32..100).try_for_each(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        if x == 10 {
            anyhow::bail!("stop at {x}");
        }
        Ok(())
    });
    assert!(result.is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 11);
}

#[test]
fn test_min_max_and_reduce() {
    assert_eq!(Pipeline::from_container(vec![4, -1, 9]).min().unwrap(), Some(-1));
    assert_eq!(Pipeline::from_container(vec![4, -1, 9]).max().unwrap(), Some(9));
    assert_eq!(
        Pipeline::from_container(1i32..6).reduce(0, |a, b| a + b).unwrap(),
        15
    );
    assert_eq!(
        Pipeline::from_container(vec![2, 3]).reduce_with(|a, b| a * b).unwrap(),
        Some(6)
    );
}

#[test]
fn test_min_by_prefers_first_max_by_prefers_last() {
    let words = vec!["bb", "a", "c", "dd"];
    let shortest = Pipeline::from_container(words.clone())
        .min_by(|a, b| a.len().cmp(&b.len()))
        .unwrap();
    assert_eq!(shortest, Some("a"));
    let longest = Pipeline::from_container(words)
        .max_by(|a, b| a.len().cmp(&b.len()))
        .unwrap();
    assert_eq!(longest, Some("dd"));
}

#[test]
fn test_iter_pulls_lazily() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut pipeline = Pipeline::iterate_unbounded(0u32, |n| n + 1).peek(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let first: Vec<u32> = pipeline.iter().take(3).map(|r| r.unwrap()).collect();
    assert_eq!(first, vec![0, 1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_for_each_ordered_visits_in_order() {
    let mut visited = Vec::new();
    Pipeline::from_container(vec![5, 6, 7])
        .for_each_ordered(|x| visited.push(x))
        .unwrap();
    assert_eq!(visited, vec![5, 6, 7]);
}

/// Test every container kind can back a pipeline
#[test]
fn test_container_sources() {
    let list: LinkedList<i32> = (1..=4).collect();
    assert_eq!(Pipeline::from_container(list).count().unwrap(), 4);

    let set: BTreeSet<i32> = [3, 1, 2].into_iter().collect();
    assert_eq!(
        Pipeline::from_container(set).to_sequence().unwrap(),
        vec![1, 2, 3]
    );

    assert_eq!(Pipeline::from_container([1u8, 2, 3]).count().unwrap(), 3);

    let chained = Pipeline::concat(source::from_container(vec![1, 2]), source::from_container(3..5))
        .to_sequence()
        .unwrap();
    assert_eq!(chained, vec![1, 2, 3, 4]);

    let lines = Pipeline::of(source::from_iter(vec!["x", "y"])).count().unwrap();
    assert_eq!(lines, 2);
}
