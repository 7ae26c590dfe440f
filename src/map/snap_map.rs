use super::{
    builder::SnapMapBuilder,
    entry::{Entry, NewValue, Slot},
    iter::Iter,
    snapshot::{self, EntryTable, Overflow, Snapshot},
};

#[cfg(feature = "logging")]
use crate::common::logging;
use crate::common::logging::PromotionCause;

use std::{
    borrow::Borrow,
    collections::{hash_map::RandomState, HashMap},
    fmt,
    hash::{BuildHasher, Hash},
    ops::ControlFlow,
    sync::atomic::Ordering,
};

use crossbeam_epoch::{Atomic, Guard, Owned};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use triomphe::Arc as TrioArc;

/// A concurrent hash map for read-mostly workloads.
///
/// `SnapMap` keeps two tables. The _snapshot_ is an immutable table that is read
/// without taking any lock. The _overflow_ table sits behind a single mutex and
/// holds keys that were inserted since the snapshot was published. Once reads
/// have missed the snapshot as many times as the overflow table has keys, the
/// overflow table is promoted to become the new snapshot.
///
/// Reading a key, and overwriting or deleting a key that is already in the
/// snapshot, never blocks. Inserting a brand-new key, iterating over a map with
/// pending keys, and the batch operations take the lock.
///
/// This makes `SnapMap` a good fit when entries are written once and read many
/// times, or when threads operate on disjoint key sets. For write-heavy
/// workloads a sharded map will do better.
///
/// Values are returned as clones. Wrap expensive values in `std::sync::Arc`.
///
/// # Examples
///
/// ```rust
/// use snapmap::SnapMap;
///
/// use std::{sync::Arc, thread};
///
/// let map = Arc::new(SnapMap::new());
///
/// let threads: Vec<_> = (0..4u32)
///     .map(|i| {
///         let my_map = Arc::clone(&map);
///         thread::spawn(move || {
///             my_map.store(i, format!("value {i}"));
///             assert_eq!(my_map.load(&i), Some(format!("value {i}")));
///         })
///     })
///     .collect();
///
/// threads.into_iter().for_each(|t| t.join().expect("Failed"));
///
/// assert_eq!(map.iter().count(), 4);
/// ```
pub struct SnapMap<K, V, S = RandomState> {
    snapshot: CachePadded<Atomic<Snapshot<K, V, S>>>,
    overflow: Mutex<Overflow<K, V, S>>,
    pub(super) build_hasher: S,
    name: Option<String>,
}

impl<K, V> SnapMap<K, V, RandomState>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new, empty `SnapMap<K, V>`.
    ///
    /// To set a name or an initial capacity, use the
    /// [`SnapMapBuilder`][builder-struct].
    ///
    /// [builder-struct]: ./struct.SnapMapBuilder.html
    pub fn new() -> Self {
        Self::with_everything(None, None, RandomState::default())
    }

    /// Returns a [`SnapMapBuilder`][builder-struct], which can build a `SnapMap`
    /// with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.SnapMapBuilder.html
    pub fn builder() -> SnapMapBuilder<K, V> {
        SnapMapBuilder::default()
    }
}

impl<K, V, S> Default for SnapMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> SnapMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Constructs a new, empty `SnapMap<K, V, S>` that hashes keys with
    /// `build_hasher`.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_everything(None, None, build_hasher)
    }

    pub(crate) fn with_everything(
        name: Option<String>,
        initial_capacity: Option<usize>,
        build_hasher: S,
    ) -> Self {
        let table = HashMap::with_capacity_and_hasher(
            initial_capacity.unwrap_or_default(),
            build_hasher.clone(),
        );
        Self {
            snapshot: CachePadded::new(Atomic::new(Snapshot::new(table, false))),
            overflow: Mutex::new(Overflow::empty()),
            build_hasher,
            name,
        }
    }

    /// Returns the name of this map, if one was given to the builder.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns a _clone_ of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash` and
    /// `Eq` on the borrowed form _must_ match those for the key type.
    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &crossbeam_epoch::pin();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(key) {
            return entry.load(guard);
        }
        if !snapshot.amended {
            return None;
        }
        self.find_recording_miss(key, guard)?.load(guard)
    }

    /// Sets the value for a key.
    ///
    /// Unlike [`swap`](#method.swap), this does not clone the previous value.
    pub fn store(&self, key: K, value: V) {
        self.put(key, value, |_| ())
    }

    /// Sets the value for a key and returns the previous value, if any.
    pub fn swap(&self, key: K, value: V) -> Option<V> {
        self.put(key, value, Slot::cloned_value)
    }

    fn put<R>(&self, key: K, value: V, read: impl Fn(&Slot<V>) -> R) -> R
    where
        R: Default,
    {
        let guard = &crossbeam_epoch::pin();
        let value = NewValue::new(value);
        let value = match self.snapshot(guard).entries.get(&key) {
            Some(entry) => match entry.try_put(value, guard, &read) {
                Ok(previous) => return previous,
                Err(value) => value,
            },
            None => value,
        };

        // The key is either new or expunged.
        let mut overflow = self.overflow.lock();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(&key) {
            if entry.unexpunge_locked(guard) {
                // Entries are only expunged while an overflow table exists.
                debug_assert!(overflow.entries.is_some());
                self.overflow_table_locked(&mut overflow, snapshot, guard)
                    .insert(key, TrioArc::clone(entry));
            }
            entry.put_locked(value, guard, read)
        } else if let Some(entry) = overflow.entries.as_ref().and_then(|t| t.get(&key)) {
            entry.put_locked(value, guard, read)
        } else {
            self.insert_locked(&mut overflow, snapshot, key, Entry::from_new_value(value), guard);
            R::default()
        }
    }

    /// Replaces the value for a key with `new` if the current value equals
    /// `old`. Returns `true` if the value was replaced.
    ///
    /// A deleted or absent key never compares equal to anything.
    pub fn compare_and_swap<Q>(&self, key: &Q, old: &V, new: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &crossbeam_epoch::pin();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(key) {
            return entry.try_compare_and_swap(old, new, guard);
        }
        if !snapshot.amended {
            return false;
        }

        let mut overflow = self.overflow.lock();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(key) {
            entry.try_compare_and_swap(old, new, guard)
        } else if let Some(entry) = overflow.entries.as_ref().and_then(|t| t.get(key)) {
            let swapped = entry.try_compare_and_swap(old, new, guard);
            self.miss_locked(&mut overflow, guard);
            swapped
        } else {
            false
        }
    }

    /// Returns the existing value for the key if present. Otherwise, stores
    /// `value` and returns it.
    ///
    /// The `bool` is `true` if the value was loaded, and `false` if it was
    /// stored.
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool) {
        let guard = &crossbeam_epoch::pin();
        let value = match self.snapshot(guard).entries.get(&key) {
            Some(entry) => match entry.try_load_or_store(value, guard) {
                Ok(result) => return result,
                Err(value) => value,
            },
            None => value,
        };

        let mut overflow = self.overflow.lock();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(&key) {
            if entry.unexpunge_locked(guard) {
                // Entries are only expunged while an overflow table exists.
                debug_assert!(overflow.entries.is_some());
                self.overflow_table_locked(&mut overflow, snapshot, guard)
                    .insert(key, TrioArc::clone(entry));
            }
            load_or_store_locked(entry, value, guard)
        } else if let Some(entry) = overflow.entries.as_ref().and_then(|t| t.get(&key)) {
            let result = load_or_store_locked(entry, value, guard);
            self.miss_locked(&mut overflow, guard);
            result
        } else {
            self.insert_locked(&mut overflow, snapshot, key, Entry::new(value.clone()), guard);
            (value, false)
        }
    }

    /// Deletes the value for a key if it equals `old`. Returns `true` if the
    /// value was deleted.
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &crossbeam_epoch::pin();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(key) {
            return entry.compare_and_delete(old, guard);
        }
        if !snapshot.amended {
            return false;
        }
        match self.find_recording_miss(key, guard) {
            Some(entry) => entry.compare_and_delete(old, guard),
            None => false,
        }
    }

    /// Deletes the value for a key, returning the previous value if any.
    pub fn load_and_delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &crossbeam_epoch::pin();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(key) {
            return entry.delete(guard);
        }
        if !snapshot.amended {
            return None;
        }

        let entry = {
            let mut overflow = self.overflow.lock();
            let snapshot = self.snapshot(guard);
            if let Some(entry) = snapshot.entries.get(key) {
                Some(TrioArc::clone(entry))
            } else if snapshot.amended {
                // A key that was never promoted can be dropped from the overflow
                // table right away.
                let entry = overflow.entries.as_mut().and_then(|t| t.remove(key));
                self.miss_locked(&mut overflow, guard);
                entry
            } else {
                None
            }
        };
        entry?.delete(guard)
    }

    /// Deletes the value for a key.
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _ = self.load_and_delete(key);
    }

    /// Calls `visit` for each live key-value pair, until it returns
    /// `ControlFlow::Break`.
    ///
    /// All pairs are read from a single generation of the map. If keys are
    /// pending in the overflow table, they are promoted first, which takes the
    /// lock once. Keys stored while `range` runs may or may not be visited.
    ///
    /// No lock is held while `visit` runs, so it may call back into the map.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> ControlFlow<()>,
    {
        let guard = &crossbeam_epoch::pin();
        let snapshot = self.promoted_snapshot(guard);
        for (key, entry) in snapshot.entries.iter() {
            if let Some(value) = entry.load(guard) {
                if visit(key, &value).is_break() {
                    break;
                }
            }
        }
    }

    /// Creates an iterator visiting all live key-value pairs in arbitrary
    /// order. The iterator element type is `(K, V)`, both clones.
    ///
    /// Like [`range`](#method.range), the iterator covers a single generation
    /// of the map, taken when this method is called. Values are read as the
    /// iterator advances, so a value updated in the meantime is seen in its
    /// updated form, and a key deleted in the meantime is skipped.
    pub fn iter(&self) -> Iter<K, V> {
        let guard = &crossbeam_epoch::pin();
        let snapshot = self.promoted_snapshot(guard);
        Iter::new(
            snapshot
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), TrioArc::clone(e)))
                .collect(),
        )
    }
}

// Internal machinery shared with the batch operations.
impl<K, V, S> SnapMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    #[inline]
    pub(super) fn snapshot<'g>(&self, guard: &'g Guard) -> &'g Snapshot<K, V, S> {
        let ptr = self.snapshot.load(Ordering::Acquire, guard);
        // Safety: the snapshot pointer is never null, and retired snapshots are
        // destroyed only after every guard pinned before their retirement is gone.
        unsafe { ptr.deref() }
    }

    pub(super) fn lock_overflow(&self) -> parking_lot::MutexGuard<'_, Overflow<K, V, S>> {
        self.overflow.lock()
    }

    /// Replaces the current snapshot. The lock must be held.
    pub(super) fn publish(&self, snapshot: Snapshot<K, V, S>, guard: &Guard) {
        let old = self
            .snapshot
            .swap(Owned::new(snapshot), Ordering::AcqRel, guard);
        // Safety: `old` is no longer reachable from the map.
        unsafe { guard.defer_destroy(old) };
    }

    pub(super) fn new_table(&self, capacity: usize) -> EntryTable<K, V, S> {
        HashMap::with_capacity_and_hasher(capacity, self.build_hasher.clone())
    }

    /// Copies the live entries of `table` into a new overflow table, expunging
    /// the soft-deleted ones. The lock must be held.
    pub(super) fn live_copy_locked(
        &self,
        table: &EntryTable<K, V, S>,
        guard: &Guard,
    ) -> EntryTable<K, V, S> {
        #[cfg(feature = "logging")]
        logging::log_overflow_built(self.name(), table.len());
        snapshot::without_expunged(table, &self.build_hasher, guard)
    }

    pub(super) fn overflow_table_locked<'o>(
        &self,
        overflow: &'o mut Overflow<K, V, S>,
        snapshot: &Snapshot<K, V, S>,
        guard: &Guard,
    ) -> &'o mut EntryTable<K, V, S> {
        overflow
            .entries
            .get_or_insert_with(|| self.live_copy_locked(&snapshot.entries, guard))
    }

    /// Publishes the overflow table as the new snapshot, leaving the overflow
    /// table empty. The lock must be held.
    pub(super) fn promote_locked(
        &self,
        overflow: &mut Overflow<K, V, S>,
        guard: &Guard,
        #[allow(unused_variables)] cause: PromotionCause,
    ) {
        let snapshot = match overflow.entries.take() {
            Some(entries) => Snapshot::new(entries, false),
            None => {
                // Nothing is pending; republish the current table as is.
                let current = self.snapshot(guard);
                Snapshot {
                    entries: TrioArc::clone(&current.entries),
                    amended: false,
                }
            }
        };
        #[cfg(feature = "logging")]
        logging::log_promotion(self.name(), snapshot.entries.len(), cause);

        overflow.misses = 0;
        self.publish(snapshot, guard);
    }

    fn miss_locked(&self, overflow: &mut Overflow<K, V, S>, guard: &Guard) {
        overflow.misses += 1;
        // An empty overflow table is promoted on the very first miss.
        if overflow.misses < overflow.len() {
            return;
        }
        self.promote_locked(overflow, guard, PromotionCause::Misses);
    }

    fn insert_locked(
        &self,
        overflow: &mut Overflow<K, V, S>,
        snapshot: &Snapshot<K, V, S>,
        key: K,
        entry: Entry<V>,
        guard: &Guard,
    ) {
        self.overflow_table_locked(overflow, snapshot, guard)
            .insert(key, TrioArc::new(entry));
        if !snapshot.amended {
            // The first new key since the last promotion.
            self.publish(snapshot.to_amended(), guard);
        }
    }

    /// Looks a key up under the lock, recording a miss if the overflow table
    /// had to be consulted.
    fn find_recording_miss<Q>(&self, key: &Q, guard: &Guard) -> Option<TrioArc<Entry<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut overflow = self.overflow.lock();
        let snapshot = self.snapshot(guard);
        if let Some(entry) = snapshot.entries.get(key) {
            return Some(TrioArc::clone(entry));
        }
        if !snapshot.amended {
            return None;
        }
        let entry = overflow
            .entries
            .as_ref()
            .and_then(|t| t.get(key))
            .map(TrioArc::clone);
        self.miss_locked(&mut overflow, guard);
        entry
    }

    fn promoted_snapshot<'g>(&self, guard: &'g Guard) -> &'g Snapshot<K, V, S> {
        let snapshot = self.snapshot(guard);
        if !snapshot.amended {
            return snapshot;
        }
        let mut overflow = self.overflow.lock();
        if self.snapshot(guard).amended {
            self.promote_locked(&mut overflow, guard, PromotionCause::Iteration);
        }
        self.snapshot(guard)
    }

    #[cfg(test)]
    pub(crate) fn is_amended(&self) -> bool {
        let guard = &crossbeam_epoch::pin();
        self.snapshot(guard).amended
    }

    #[cfg(test)]
    pub(crate) fn snapshot_len(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.snapshot(guard).entries.len()
    }

    #[cfg(test)]
    pub(crate) fn overflow_len_and_misses(&self) -> (Option<usize>, usize) {
        let overflow = self.overflow.lock();
        (overflow.entries.as_ref().map(HashMap::len), overflow.misses)
    }
}

/// `load_or_store` on an entry reached under the lock.
fn load_or_store_locked<V: Clone>(entry: &Entry<V>, value: V, guard: &Guard) -> (V, bool) {
    // The lock holder is the only one that expunges entries, and it has just
    // made sure this one is not.
    let result = entry.try_load_or_store(value, guard);
    debug_assert!(result.is_ok(), "expunged entry reached under the lock");
    result.unwrap_or_else(|value| (value, false))
}

impl<K, V, S> Drop for SnapMap<K, V, S> {
    fn drop(&mut self) {
        // `&mut self` guarantees that no thread is using this map. Readers that
        // are still pinned on older snapshots hold no reference to the current
        // one.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let ptr = self.snapshot.load(Ordering::Relaxed, guard);
        if !ptr.is_null() {
            drop(unsafe { ptr.into_owned() });
        }
    }
}

impl<K, V, S> fmt::Debug for SnapMap<K, V, S>
where
    K: fmt::Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: fmt::Debug + Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d_map = f.debug_map();
        self.range(|k, v| {
            d_map.entry(k, v);
            ControlFlow::Continue(())
        });
        d_map.finish()
    }
}
