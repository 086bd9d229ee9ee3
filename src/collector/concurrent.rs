//! Collectors over one shared `scc` map
//!
//! The container is an `Arc<scc::HashMap>`; every leaf of a parallel
//! evaluation accumulates into a clone of the same handle, and entry updates
//! hold the bucket lock so concurrent accumulation of the same key is atomic.
//! Merge and downstream functions must be commutative: the order in which
//! leaves reach a key is arbitrary.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use scc::hash_map::Entry;

use super::{Collector, CollectorCharacteristics};
use crate::error::StreamError;

type SharedMap<K, V> = Arc<scc::HashMap<K, V>>;

/// Move every entry out of a map no other handle refers to any more
fn drain<K: Eq + Hash, V>(map: SharedMap<K, V>) -> anyhow::Result<HashMap<K, V>> {
    let map = Arc::try_unwrap(map)
        .map_err(|_| anyhow::anyhow!("concurrent container is still shared after evaluation"))?;
    let mut drained = HashMap::with_capacity(map.len());
    while let Some(entry) = map.first_entry() {
        let (key, value) = entry.remove_entry();
        drained.insert(key, value);
    }
    Ok(drained)
}

fn insert_unique<K, V>(map: &scc::HashMap<K, V>, key: K, value: V) -> anyhow::Result<()>
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
            vacant.insert_entry(value);
            Ok(())
        }
    }
}

fn insert_merging<K, V>(map: &scc::HashMap<K, V>, key: K, value: V, merge: &(dyn Fn(V, V) -> V + Send + Sync))
where
    K: Eq + Hash,
    V: Clone,
{
    match map.entry(key) {
        Entry::Occupied(mut existing) => {
            let merged = merge(existing.get().clone(), value);
            *existing.get_mut() = merged;
        }
        Entry::Vacant(vacant) => {
            vacant.insert_entry(value);
        }
    }
}

fn reinsert<K: Eq + Hash, V>(map: &scc::HashMap<K, V>, key: K, value: V) -> anyhow::Result<()> {
    map.insert(key, value)
        .map_err(|_| anyhow::anyhow!("concurrent map changed while combining"))
}

/// Concurrent [`to_map`](super::collectors::to_map): a key produced twice
/// fails with [`StreamError::DuplicateKey`]
pub fn to_concurrent_map<T, K, V, KF, VF>(
    key: KF,
    value: VF,
) -> Collector<T, SharedMap<K, V>, HashMap<K, V>>
where
    T: 'static,
    K: Eq + Hash + Debug + Send + Sync + 'static,
    V: Debug + Send + Sync + 'static,
    KF: Fn(&T) -> K + Send + Sync + 'static,
    VF: Fn(T) -> V + Send + Sync + 'static,
{
    Collector::try_new(
        || Arc::new(scc::HashMap::new()),
        move |map: &mut SharedMap<K, V>, item: T| {
            let key = key(&item);
            insert_unique(map, key, value(item))
        },
        |left: SharedMap<K, V>, right: SharedMap<K, V>| {
            for (key, value) in drain(right)? {
                insert_unique(&left, key, value)?;
            }
            Ok(left)
        },
    )
    .try_and_then(drain)
    .with_characteristics(CollectorCharacteristics::UNORDERED)
    .into_concurrent()
}

/// Concurrent [`to_map_merging`](super::collectors::to_map_merging)
pub fn to_concurrent_map_merging<T, K, V, KF, VF, M>(
    key: KF,
    value: VF,
    merge: M,
) -> Collector<T, SharedMap<K, V>, HashMap<K, V>>
where
    T: 'static,
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    KF: Fn(&T) -> K + Send + Sync + 'static,
    VF: Fn(T) -> V + Send + Sync + 'static,
    M: Fn(V, V) -> V + Send + Sync + 'static,
{
    let merge: Arc<dyn Fn(V, V) -> V + Send + Sync> = Arc::new(merge);
    let combine_merge = Arc::clone(&merge);
    Collector::try_new(
        || Arc::new(scc::HashMap::new()),
        move |map: &mut SharedMap<K, V>, item: T| {
            let key = key(&item);
            insert_merging(map, key, value(item), merge.as_ref());
            Ok(())
        },
        move |left: SharedMap<K, V>, right: SharedMap<K, V>| {
            for (key, value) in drain(right)? {
                insert_merging(&left, key, value, combine_merge.as_ref());
            }
            Ok(left)
        },
    )
    .try_and_then(drain)
    .with_characteristics(CollectorCharacteristics::UNORDERED)
    .into_concurrent()
}

/// Concurrent [`grouping_by`](super::collectors::grouping_by)
///
/// Each group's container is updated under its entry lock, so `downstream`
/// itself does not have to be concurrent; its result must not depend on
/// encounter order.
pub fn grouping_by_concurrent<T, K, A, D, F>(
    classifier: F,
    downstream: Collector<T, A, D>,
) -> Collector<T, SharedMap<K, A>, HashMap<K, D>>
where
    T: 'static,
    K: Eq + Hash + Send + Sync + 'static,
    A: Send + Sync + 'static,
    D: 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let accumulate = downstream.clone();
    let combine = downstream.clone();
    Collector::try_new(
        || Arc::new(scc::HashMap::new()),
        move |groups: &mut SharedMap<K, A>, item: T| {
            let mut group = groups
                .entry(classifier(&item))
                .or_insert_with(|| accumulate.supply());
            accumulate.accumulate(group.get_mut(), item)
        },
        move |left: SharedMap<K, A>, right: SharedMap<K, A>| {
            for (key, group) in drain(right)? {
                match left.remove(&key) {
                    Some((key, existing)) => {
                        reinsert(&left, key, combine.combine(existing, group)?)?;
                    }
                    None => reinsert(&left, key, group)?,
                }
            }
            Ok(left)
        },
    )
    .try_and_then(move |groups| {
        drain(groups)?
            .into_iter()
            .map(|(key, group)| Ok((key, downstream.finish(group)?)))
            .collect()
    })
    .with_characteristics(CollectorCharacteristics::UNORDERED)
    .into_concurrent()
}
