//! Shared collections that phase-1 jobs append to, and the sorting and
//! grouping applied to them before phase 2 reads them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A mutex-guarded list that many jobs append to concurrently, along with a
/// flag recording whether any appending job actually did work.
///
/// Each item carries its discovery index (its position in the directory
/// listing that produced it) so that ties can be broken deterministically no
/// matter what order the jobs finished in. Cloning a [`Collection`] clones a
/// handle; all clones share the same list.
pub struct Collection<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    items: Vec<(usize, T)>,
    changed: bool,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            inner: Arc::new(Mutex::new(Inner {
                items: Vec::new(),
                changed: false,
            })),
        }
    }
}

impl<T> Collection<T> {
    pub fn new() -> Collection<T> {
        Collection::default()
    }

    /// Appends `item`, discovered at position `order`. `executed` is the
    /// result of the job that produced it; any `true` marks the collection
    /// changed.
    pub fn push(&self, order: usize, item: T, executed: bool) {
        let mut inner = self.lock();
        inner.items.push((order, item));
        inner.changed |= executed;
    }

    /// Marks the collection changed without adding anything.
    pub fn mark_changed(&self) {
        self.lock().changed = true;
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the items in discovery order. Fails if any other handle to the
    /// collection is still alive, i.e. a job that appends to it hasn't
    /// finished.
    pub fn into_aggregate(self) -> Result<Aggregate<T>, StillShared> {
        let inner = Arc::try_unwrap(self.inner)
            .map_err(|_| StillShared)?
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut items = inner.items;
        items.sort_by_key(|(order, _)| *order);
        Ok(Aggregate {
            items: items.into_iter().map(|(_, item)| item).collect(),
            changed: inner.changed,
        })
    }

    /// Takes the items sorted by `key`, largest first. Items with equal keys
    /// keep their discovery order.
    pub fn into_sorted_by<K, F>(self, key: F) -> Result<Aggregate<T>, StillShared>
    where
        K: Ord,
        F: Fn(&T) -> K,
    {
        let mut aggregate = self.into_aggregate()?;
        sort_descending(&mut aggregate.items, key);
        Ok(aggregate)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The settled contents of a [`Collection`] after its phase's barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate<T> {
    pub items: Vec<T>,
    pub changed: bool,
}

/// Sorts `items` by `key`, largest first. The sort is stable, so sorting an
/// already sorted slice leaves it untouched.
pub fn sort_descending<T, K, F>(items: &mut [T], key: F)
where
    K: Ord,
    F: Fn(&T) -> K,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// A run of consecutive items sharing a year.
#[derive(Debug, PartialEq)]
pub struct YearGroup<'a, T> {
    pub year: i32,
    pub items: Vec<&'a T>,
}

/// Walks `items` once, starting a new group whenever the year differs from
/// the previous item's. `items` must already be sorted by date, otherwise the
/// same year shows up in several groups.
pub fn group_by_year<'a, T, F>(items: &'a [T], year: F) -> Vec<YearGroup<'a, T>>
where
    F: Fn(&T) -> i32,
{
    let mut groups: Vec<YearGroup<'a, T>> = Vec::new();
    for item in items {
        let y = year(item);
        match groups.last_mut() {
            Some(group) if group.year == y => group.items.push(item),
            _ => groups.push(YearGroup {
                year: y,
                items: vec![item],
            }),
        }
    }
    groups
}

/// Returned when a [`Collection`] is taken while a job still holds it.
#[derive(Debug)]
pub struct StillShared;

impl fmt::Display for StillShared {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "collection is still held by a running job")
    }
}

impl std::error::Error for StillShared {}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_sort_is_descending_and_stable() {
        let mut items = vec![(2020, "a"), (2021, "b"), (2020, "c"), (2021, "d")];
        sort_descending(&mut items, |(year, _)| *year);
        assert_eq!(vec![(2021, "b"), (2021, "d"), (2020, "a"), (2020, "c")], items);

        let sorted = items.clone();
        sort_descending(&mut items, |(year, _)| *year);
        assert_eq!(sorted, items);
    }

    #[test]
    fn test_ties_follow_discovery_order() -> Result<(), StillShared> {
        let collection = Collection::new();
        // pushed out of order, as concurrent jobs would
        collection.push(2, (2020, "c"), false);
        collection.push(0, (2020, "a"), false);
        collection.push(1, (2021, "b"), true);

        let aggregate = collection.into_sorted_by(|(year, _)| *year)?;
        assert!(aggregate.changed);
        assert_eq!(vec![(2021, "b"), (2020, "a"), (2020, "c")], aggregate.items);
        Ok(())
    }

    #[test]
    fn test_concurrent_pushes() -> Result<(), StillShared> {
        let collection = Collection::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let collection = collection.clone();
                thread::spawn(move || collection.push(i, i, false))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let aggregate = collection.into_aggregate()?;
        assert_eq!((0..16).collect::<Vec<_>>(), aggregate.items);
        assert!(!aggregate.changed);
        Ok(())
    }

    #[test]
    fn test_shared_collection_cannot_be_taken() {
        let collection: Collection<u8> = Collection::new();
        let _held = collection.clone();
        assert!(collection.into_aggregate().is_err());
    }

    #[test]
    fn test_group_by_year_round_trip() {
        let items = vec![2021, 2021, 2020, 2018, 2018, 2018];
        let groups = group_by_year(&items, |y| *y);
        assert_eq!(
            vec![2021, 2020, 2018],
            groups.iter().map(|g| g.year).collect::<Vec<_>>()
        );
        let flattened: Vec<i32> = groups
            .iter()
            .flat_map(|g| g.items.iter().map(|y| **y))
            .collect();
        assert_eq!(items, flattened);
    }

    #[test]
    fn test_group_by_year_unsorted_splits() {
        let items = vec![2021, 2020, 2021];
        assert_eq!(3, group_by_year(&items, |y| *y).len());
    }
}
