use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use super::{Collector, CollectorCharacteristics};
use crate::error::StreamError;

/// Every element in encounter order
pub fn to_vec<T: 'static>() -> Collector<T, Vec<T>, Vec<T>> {
    Collector::new(
        Vec::new,
        |items: &mut Vec<T>, item| items.push(item),
        |mut left, mut right| {
            left.append(&mut right);
            left
        },
    )
}

/// Alias of [`to_vec`]
pub fn to_sequence<T: 'static>() -> Collector<T, Vec<T>, Vec<T>> {
    to_vec()
}

pub fn to_set<T: Eq + Hash + 'static>() -> Collector<T, HashSet<T>, HashSet<T>> {
    Collector::new(
        HashSet::new,
        |set: &mut HashSet<T>, item| {
            set.insert(item);
        },
        |mut left, right| {
            left.extend(right);
            left
        },
    )
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

/// Any default-constructible, extendable collection
///
/// ```rust
/// use std::collections::BTreeSet;
/// use streamfork::{Pipeline, collectors};
///
/// let set = Pipeline::from_container(vec![3, 1, 3])
///     .collect(collectors::to_collection::<_, BTreeSet<i32>>())
///     .unwrap();
/// assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 3]);
/// ```
pub fn to_collection<T, C>() -> Collector<T, C, C>
where
    T: 'static,
    C: Default + Extend<T> + IntoIterator<Item = T> + 'static,
{
    Collector::new(
        C::default,
        |collection: &mut C, item| collection.extend(std::iter::once(item)),
        |mut left, right| {
            left.extend(right);
            left
        },
    )
}

fn insert_unique<K, V>(map: &mut HashMap<K, V>, key: K, value: V) -> anyhow::Result<()>
where
    K: Eq + Hash + Debug,
    V: Debug,
{
    match map.entry(key) {
        Entry::Occupied(existing) => Err(StreamError::duplicate_key(
            existing.key(),
            existing.get(),
            &value,
        )
        .into()),
        Entry::Vacant(vacant) => {
            vacant.insert(value);
            Ok(())
        }
    }
}

/// Map from `key(element)` to `value(element)`
///
/// A key produced twice fails the collection with
/// [`StreamError::DuplicateKey`], reporting the key and both values.
pub fn to_map<T, K, V, KF, VF>(key: KF, value: VF) -> Collector<T, HashMap<K, V>, HashMap<K, V>>
where
    T: 'static,
    K: Eq + Hash + Debug + 'static,
    V: Debug + 'static,
    KF: Fn(&T) -> K + Send + Sync + 'static,
    VF: Fn(T) -> V + Send + Sync + 'static,
{
    Collector::try_new(
        HashMap::new,
        move |map: &mut HashMap<K, V>, item: T| {
            let key = key(&item);
            insert_unique(map, key, value(item))
        },
        |mut left, right| {
            for (key, value) in right {
                insert_unique(&mut left, key, value)?;
            }
            Ok(left)
        },
    )
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

fn insert_merging<K: Eq + Hash, V>(
    map: &mut HashMap<K, V>,
    key: K,
    value: V,
    merge: &(dyn Fn(V, V) -> V + Send + Sync),
) {
    let value = match map.remove(&key) {
        Some(existing) => merge(existing, value),
        None => value,
    };
    map.insert(key, value);
}

/// Like [`to_map`], combining the values of a repeated key with `merge(existing, incoming)`
pub fn to_map_merging<T, K, V, KF, VF, M>(
    key: KF,
    value: VF,
    merge: M,
) -> Collector<T, HashMap<K, V>, HashMap<K, V>>
where
    T: 'static,
    K: Eq + Hash + 'static,
    V: 'static,
    KF: Fn(&T) -> K + Send + Sync + 'static,
    VF: Fn(T) -> V + Send + Sync + 'static,
    M: Fn(V, V) -> V + Send + Sync + 'static,
{
    let merge: Arc<dyn Fn(V, V) -> V + Send + Sync> = Arc::new(merge);
    let combine_merge = Arc::clone(&merge);
    Collector::new(
        HashMap::new,
        move |map: &mut HashMap<K, V>, item: T| {
            let key = key(&item);
            insert_merging(map, key, value(item), merge.as_ref());
        },
        move |mut left, right| {
            for (key, value) in right {
                insert_merging(&mut left, key, value, combine_merge.as_ref());
            }
            left
        },
    )
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

/// `prefix`, the elements separated by `delimiter`, then `suffix`
pub fn joining<T>(
    delimiter: impl Into<String>,
    prefix: impl Into<String>,
    suffix: impl Into<String>,
) -> Collector<T, Vec<String>, String>
where
    T: AsRef<str> + 'static,
{
    let delimiter = delimiter.into();
    let prefix = prefix.into();
    let suffix = suffix.into();
    Collector::with_finisher(
        Vec::new,
        |parts: &mut Vec<String>, item: T| parts.push(item.as_ref().to_owned()),
        |mut left, mut right| {
            left.append(&mut right);
            left
        },
        move |parts| format!("{prefix}{}{suffix}", parts.join(delimiter.as_str())),
    )
}

/// Fold mapped elements with `op`, starting from `identity`
///
/// `identity` is applied once to the combined result, so it only has to be
/// an identity of `op` for the result to match a sequential fold.
pub fn reducing<T, U, M, F>(identity: U, mapper: M, op: F) -> Collector<T, Option<U>, U>
where
    T: 'static,
    U: Clone + Send + Sync + 'static,
    M: Fn(T) -> U + Send + Sync + 'static,
    F: Fn(U, U) -> U + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let finish_op = Arc::clone(&op);
    mapping(mapper, reducing_arc(op)).and_then(move |reduced| match reduced {
        Some(reduced) => finish_op(identity.clone(), reduced),
        None => identity.clone(),
    })
}

/// Fold without identity; `None` for no elements
pub fn reducing_with<T, F>(op: F) -> Collector<T, Option<T>, Option<T>>
where
    T: 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    reducing_arc(Arc::new(op))
}

fn reducing_arc<T, F>(op: Arc<F>) -> Collector<T, Option<T>, Option<T>>
where
    T: 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let combine_op = Arc::clone(&op);
    Collector::new(
        || None,
        move |accumulated: &mut Option<T>, item: T| {
            *accumulated = Some(match accumulated.take() {
                Some(previous) => op(previous, item),
                None => item,
            });
        },
        move |left, right| match (left, right) {
            (Some(left), Some(right)) => Some(combine_op(left, right)),
            (left, right) => left.or(right),
        },
    )
}

/// Smallest element; the first of several equal minima
pub fn min_by<T, F>(compare: F) -> Collector<T, Option<T>, Option<T>>
where
    T: 'static,
    F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
{
    reducing_with(move |current, item| match compare(&item, &current) {
        Ordering::Less => item,
        _ => current,
    })
}

/// Largest element; the last of several equal maxima
pub fn max_by<T, F>(compare: F) -> Collector<T, Option<T>, Option<T>>
where
    T: 'static,
    F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
{
    reducing_with(move |current, item| match compare(&item, &current) {
        Ordering::Less => current,
        _ => item,
    })
}

/// Apply `mapper` before accumulating into `downstream`
pub fn mapping<T, U, A, R, M>(mapper: M, downstream: Collector<U, A, R>) -> Collector<T, A, R>
where
    T: 'static,
    U: 'static,
    A: 'static,
    R: 'static,
    M: Fn(T) -> U + Send + Sync + 'static,
{
    let characteristics = downstream.characteristics();
    let (supplier, accumulator, combiner, finisher) = downstream.parts();
    Collector::from_parts(
        supplier,
        Arc::new(move |container: &mut A, item: T| accumulator(container, mapper(item))),
        combiner,
        finisher,
        characteristics,
    )
}

/// Accumulate only the elements matching `predicate` into `downstream`
pub fn filtering<T, A, R, P>(predicate: P, downstream: Collector<T, A, R>) -> Collector<T, A, R>
where
    T: 'static,
    A: 'static,
    R: 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let characteristics = downstream.characteristics();
    let (supplier, accumulator, combiner, finisher) = downstream.parts();
    Collector::from_parts(
        supplier,
        Arc::new(move |container: &mut A, item: T| {
            if predicate(&item) {
                accumulator(container, item)
            } else {
                Ok(())
            }
        }),
        combiner,
        finisher,
        characteristics,
    )
}

/// Feed every element to two collectors and merge their results
pub fn teeing<T, A1, R1, A2, R2, R, M>(
    first: Collector<T, A1, R1>,
    second: Collector<T, A2, R2>,
    merger: M,
) -> Collector<T, (A1, A2), R>
where
    T: Clone + 'static,
    A1: 'static,
    A2: 'static,
    R1: 'static,
    R2: 'static,
    R: 'static,
    M: Fn(R1, R2) -> R + Send + Sync + 'static,
{
    let unordered = first
        .characteristics()
        .intersection(second.characteristics())
        .intersection(CollectorCharacteristics::UNORDERED);
    let (supply_first, accumulate_first, combine_first, finish_first) = first.parts();
    let (supply_second, accumulate_second, combine_second, finish_second) = second.parts();
    Collector::from_parts(
        Arc::new(move || (supply_first(), supply_second())),
        Arc::new(move |(a, b): &mut (A1, A2), item: T| {
            accumulate_first(a, item.clone())?;
            accumulate_second(b, item)
        }),
        Arc::new(move |(left_a, left_b): (A1, A2), (right_a, right_b): (A1, A2)| {
            Ok((combine_first(left_a, right_a)?, combine_second(left_b, right_b)?))
        }),
        Arc::new(move |(a, b): (A1, A2)| Ok(merger(finish_first(a)?, finish_second(b)?))),
        unordered,
    )
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

    /// Accumulate `split` halves separately, then combine
    fn run_split<T, A, R>(collector: Collector<T, A, R>, left: Vec<T>, right: Vec<T>) -> R {
        let mut first = collector.supply();
        for item in left {
            collector.accumulate(&mut first, item).unwrap();
        }
        let mut second = collector.supply();
        for item in right {
            collector.accumulate(&mut second, item).unwrap();
        }
        let combined = collector.combine(first, second).unwrap();
        collector.finish(combined).unwrap()
    }

    #[test]
    fn test_to_map_reports_duplicate_key() {
        let collector = to_map(|s: &&str| s.to_string(), |_| 1);
        let mut container = collector.supply();
        collector.accumulate(&mut container, "a").unwrap();
        let error = collector.accumulate(&mut container, "a").unwrap_err();
        let error = StreamError::callback(error);
        match error {
            StreamError::DuplicateKey { key, existing, incoming } => {
                assert_eq!(key, "\"a\"");
                assert_eq!(existing, "1");
                assert_eq!(incoming, "1");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn test_to_map_duplicate_across_containers() {
        let collector = to_map(|x: &i32| *x, |x| x * 10);
        let left = run(collector.clone(), [1, 2]);
        let right = run(collector.clone(), [2]);
        assert!(collector.combine(left, right).is_err());
    }

    #[test]
    fn test_to_map_merging_sums_values() {
        let collector = to_map_merging(|(k, _): &(&str, i32)| k.to_string(), |(_, v)| v, |a, b| a + b);
        let map = run_split(collector, vec![("a", 1)], vec![("a", 2)]);
        assert_eq!(map, HashMap::from([("a".to_string(), 3)]));
    }

    #[test]
    fn test_joining_with_affixes() {
        assert_eq!(run(joining(", ", "[", "]"), ["a", "b", "c"]), "[a, b, c]");
        assert_eq!(run(joining::<&str>("-", "<", ">"), []), "<>");
    }

    #[test]
    fn test_reducing_applies_identity_once() {
        let collector = reducing(100, |x: i32| x, |a, b| a + b);
        assert_eq!(run_split(collector.clone(), vec![1, 2], vec![3]), 106);
        assert_eq!(run(collector, []), 100);
    }

    #[test]
    fn test_min_and_max_tie_breaking() {
        let by_len = |a: &&str, b: &&str| a.len().cmp(&b.len());
        assert_eq!(run(min_by(by_len), ["bb", "a", "c"]), Some("a"));
        assert_eq!(run(max_by(by_len), ["bb", "cc", "a"]), Some("cc"));
        assert_eq!(run(min_by(by_len), []), None);
    }

    #[test]
    fn test_mapping_and_filtering() {
        let lengths = mapping(|s: &str| s.len(), to_vec());
        assert_eq!(run(lengths, ["ab", "c"]), vec![2, 1]);

        let evens = filtering(|x: &i32| x % 2 == 0, to_vec());
        assert_eq!(run_split(evens, vec![1, 2], vec![3, 4]), vec![2, 4]);
    }

    #[test]
    fn test_teeing_merges_both_results() {
        let collector = teeing(to_vec(), reducing_with(|a: i32, b| a.max(b)), |all, max| {
            (all.len(), max)
        });
        assert_eq!(run_split(collector, vec![3, 9], vec![4]), (3, Some(9)));
    }

    #[test]
    fn test_to_collection_into_btree_set() {
        use std::collections::BTreeSet;
        let set = run(to_collection::<_, BTreeSet<i32>>(), [3, 1, 3]);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }
}
