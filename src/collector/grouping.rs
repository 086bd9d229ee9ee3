use std::collections::hash_map;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use super::{Collector, CollectorCharacteristics};

/// Map that iterates in first-insertion order
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Clone + Eq + Hash, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    /// Value for `key`, inserting `create()` at the end when absent
    pub fn get_or_insert_with(&mut self, key: K, create: impl FnOnce() -> V) -> &mut V {
        let position = match self.index.entry(key) {
            hash_map::Entry::Occupied(entry) => *entry.get(),
            hash_map::Entry::Vacant(entry) => {
                let position = self.entries.len();
                self.entries.push((entry.key().clone(), create()));
                entry.insert(position);
                position
            }
        };
        &mut self.entries[position].1
    }

    /// Replace the value of an existing key in place, or append a new entry
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.index.get(&key) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Apply `f` to every value, keeping the key order
    pub fn try_map_values<U, E>(self, mut f: impl FnMut(V) -> Result<U, E>) -> Result<OrderedMap<K, U>, E> {
        let entries = self
            .entries
            .into_iter()
            .map(|(key, value)| Ok((key, f(value)?)))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(OrderedMap {
            entries,
            index: self.index,
        })
    }
}

impl<K, V> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Result of [`partitioning_by`]: both groups are always present
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition<V> {
    pub when_true: V,
    pub when_false: V,
}

impl<V> Partition<V> {
    pub fn get(&self, key: bool) -> &V {
        if key { &self.when_true } else { &self.when_false }
    }

    fn slot(&mut self, key: bool) -> &mut V {
        if key { &mut self.when_true } else { &mut self.when_false }
    }
}

/// Group elements by `classifier`, collecting each group with `downstream`
pub fn grouping_by<T, K, A, D, F>(
    classifier: F,
    downstream: Collector<T, A, D>,
) -> Collector<T, HashMap<K, A>, HashMap<K, D>>
where
    T: 'static,
    K: Eq + Hash + 'static,
    A: 'static,
    D: 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let accumulate = downstream.clone();
    let combine = downstream.clone();
    Collector::try_new(
        HashMap::new,
        move |groups: &mut HashMap<K, A>, item: T| {
            let group = groups
                .entry(classifier(&item))
                .or_insert_with(|| accumulate.supply());
            accumulate.accumulate(group, item)
        },
        move |mut left: HashMap<K, A>, right: HashMap<K, A>| {
            for (key, group) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => combine.combine(existing, group)?,
                    None => group,
                };
                left.insert(key, merged);
            }
            Ok(left)
        },
    )
    .try_and_then(move |groups| {
        groups
            .into_iter()
            .map(|(key, group)| Ok((key, downstream.finish(group)?)))
            .collect()
    })
    .with_characteristics(CollectorCharacteristics::UNORDERED)
}

/// Like [`grouping_by`], with groups in the encounter order of their first element
pub fn grouping_by_ordered<T, K, A, D, F>(
    classifier: F,
    downstream: Collector<T, A, D>,
) -> Collector<T, OrderedMap<K, A>, OrderedMap<K, D>>
where
    T: 'static,
    K: Clone + Eq + Hash + 'static,
    A: 'static,
    D: 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let accumulate = downstream.clone();
    let combine = downstream.clone();
    Collector::try_new(
        OrderedMap::new,
        move |groups: &mut OrderedMap<K, A>, item: T| {
            let group = groups.get_or_insert_with(classifier(&item), || accumulate.supply());
            accumulate.accumulate(group, item)
        },
        move |left: OrderedMap<K, A>, right: OrderedMap<K, A>| {
            let right_keys: Vec<K> = right.keys().cloned().collect();
            let mut pending: HashMap<K, A> = right.into_iter().collect();
            let mut merged = OrderedMap::new();
            for (key, group) in left {
                let group = match pending.remove(&key) {
                    Some(later) => combine.combine(group, later)?,
                    None => group,
                };
                merged.insert(key, group);
            }
            for key in right_keys {
                if let Some(group) = pending.remove(&key) {
                    merged.insert(key, group);
                }
            }
            Ok(merged)
        },
    )
    .try_and_then(move |groups| groups.try_map_values(|group| downstream.finish(group)))
}

/// Like [`grouping_by`], with groups sorted by key
pub fn grouping_by_sorted<T, K, A, D, F>(
    classifier: F,
    downstream: Collector<T, A, D>,
) -> Collector<T, BTreeMap<K, A>, BTreeMap<K, D>>
where
    T: 'static,
    K: Ord + 'static,
    A: 'static,
    D: 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let accumulate = downstream.clone();
    let combine = downstream.clone();
    Collector::try_new(
        BTreeMap::new,
        move |groups: &mut BTreeMap<K, A>, item: T| {
            let group = groups
                .entry(classifier(&item))
                .or_insert_with(|| accumulate.supply());
            accumulate.accumulate(group, item)
        },
        move |mut left: BTreeMap<K, A>, right: BTreeMap<K, A>| {
            for (key, group) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => combine.combine(existing, group)?,
                    None => group,
                };
                left.insert(key, merged);
            }
            Ok(left)
        },
    )
    .try_and_then(move |groups| {
        groups
            .into_iter()
            .map(|(key, group)| Ok((key, downstream.finish(group)?)))
            .collect()
    })
}

/// Split elements by `predicate`; both groups are present even when empty
pub fn partitioning_by<T, A, D, P>(
    predicate: P,
    downstream: Collector<T, A, D>,
) -> Collector<T, Partition<A>, Partition<D>>
where
    T: 'static,
    A: 'static,
    D: 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let characteristics = downstream
        .characteristics()
        .intersection(CollectorCharacteristics::UNORDERED);
    let supply = downstream.clone();
    let accumulate = downstream.clone();
    let combine = downstream.clone();
    Collector::from_parts(
        Arc::new(move || Partition {
            when_true: supply.supply(),
            when_false: supply.supply(),
        }),
        Arc::new(move |partition: &mut Partition<A>, item: T| {
            let key = predicate(&item);
            accumulate.accumulate(partition.slot(key), item)
        }),
        Arc::new(move |left: Partition<A>, right: Partition<A>| {
            Ok(Partition {
                when_true: combine.combine(left.when_true, right.when_true)?,
                when_false: combine.combine(left.when_false, right.when_false)?,
            })
        }),
        Arc::new(move |partition: Partition<A>| {
            Ok(Partition {
                when_true: downstream.finish(partition.when_true)?,
                when_false: downstream.finish(partition.when_false)?,
            })
        }),
        characteristics,
    )
}
