//! Operations over several keys at once.
//!
//! A batch takes the map lock and first moves its target keys out of the
//! snapshot: the overflow table, minus the targets, is published as an interim
//! snapshot flagged as amended. From then on, any thread that looks up a target
//! key misses the snapshot and has to wait for the lock. The batch then works on
//! the overflow table alone and finally publishes it as the new snapshot.
//!
//! A batch is atomic with respect to promotions, other batches, and locked
//! operations on the same keys. Readers of unrelated keys may see the interim
//! snapshot or the final one.

use super::{
    entry::{Entry, NewValue, Slot},
    snap_map::SnapMap,
    snapshot::{EntryTable, Overflow, Snapshot},
};

#[cfg(feature = "logging")]
use crate::common::logging;
use crate::common::logging::PromotionCause;

use std::{
    collections::{HashMap, HashSet},
    hash::{BuildHasher, Hash},
};

use crossbeam_epoch::Guard;
use triomphe::Arc as TrioArc;

impl<K, V, S> SnapMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Sets the values for several keys at once, returning the previous value
    /// of each key (`None` if it had none).
    ///
    /// If a key appears more than once in `pairs`, the last value wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use snapmap::SnapMap;
    ///
    /// let map = SnapMap::new();
    /// map.store("y", 5);
    ///
    /// let previous = map.swap_multiple([("x", 10), ("y", 20)]);
    /// assert_eq!(previous.get("x"), Some(&None));
    /// assert_eq!(previous.get("y"), Some(&Some(5)));
    ///
    /// assert_eq!(map.load("x"), Some(10));
    /// assert_eq!(map.load("y"), Some(20));
    /// ```
    pub fn swap_multiple<I>(&self, pairs: I) -> HashMap<K, Option<V>, S>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut targets = HashMap::with_hasher(self.build_hasher.clone());
        targets.extend(pairs);
        let mut previous =
            HashMap::with_capacity_and_hasher(targets.len(), self.build_hasher.clone());
        if targets.is_empty() {
            return previous;
        }

        let guard = &crossbeam_epoch::pin();
        let mut overflow = self.lock_overflow();
        let table = self.isolate_locked(&mut overflow, |k| targets.contains_key(k), guard);
        for (key, value) in targets {
            let old = match table.get(&key) {
                Some(entry) => entry.put_locked(NewValue::new(value), guard, Slot::cloned_value),
                None => {
                    table.insert(key.clone(), TrioArc::new(Entry::new(value)));
                    None
                }
            };
            previous.insert(key, old);
        }
        self.republish_locked(&mut overflow, guard);
        previous
    }

    /// Returns a _clone_ of the value of each key (`None` if it has none), all
    /// read while no other writer can touch those keys through the lock.
    pub fn load_multiple<I>(&self, keys: I) -> HashMap<K, Option<V>, S>
    where
        I: IntoIterator<Item = K>,
    {
        let targets = self.target_set(keys);
        let mut values =
            HashMap::with_capacity_and_hasher(targets.len(), self.build_hasher.clone());
        if targets.is_empty() {
            return values;
        }

        let guard = &crossbeam_epoch::pin();
        let mut overflow = self.lock_overflow();
        let table = self.isolate_locked(&mut overflow, |k| targets.contains(k), guard);
        for key in targets {
            let value = table.get(&key).and_then(|entry| entry.load(guard));
            values.insert(key, value);
        }
        self.republish_locked(&mut overflow, guard);
        values
    }

    /// Deletes several keys at once, returning the value each key held (`None`
    /// if it had none).
    pub fn delete_multiple<I>(&self, keys: I) -> HashMap<K, Option<V>, S>
    where
        I: IntoIterator<Item = K>,
    {
        let targets = self.target_set(keys);
        let mut deleted =
            HashMap::with_capacity_and_hasher(targets.len(), self.build_hasher.clone());
        if targets.is_empty() {
            return deleted;
        }

        let guard = &crossbeam_epoch::pin();
        let mut overflow = self.lock_overflow();
        let table = self.isolate_locked(&mut overflow, |k| targets.contains(k), guard);
        for key in targets {
            // Older snapshots may still hold the entry. Expunging it sends any
            // writer that reaches it through them to the lock.
            let value = table
                .remove(&key)
                .and_then(|entry| entry.delete_and_expunge_locked(guard));
            deleted.insert(key, value);
        }
        self.republish_locked(&mut overflow, guard);
        deleted
    }

    fn target_set<I>(&self, keys: I) -> HashSet<K, S>
    where
        I: IntoIterator<Item = K>,
    {
        let mut targets = HashSet::with_hasher(self.build_hasher.clone());
        targets.extend(keys);
        targets
    }

    /// Publishes an interim snapshot without the target keys and returns an
    /// overflow table holding every live entry, targets included. The lock must
    /// be held.
    fn isolate_locked<'o>(
        &self,
        overflow: &'o mut Overflow<K, V, S>,
        is_target: impl Fn(&K) -> bool,
        guard: &Guard,
    ) -> &'o mut EntryTable<K, V, S> {
        let snapshot = self.snapshot(guard);
        let current = match overflow.entries.take() {
            Some(entries) => entries,
            None => self.live_copy_locked(&snapshot.entries, guard),
        };

        let mut untargeted = self.new_table(current.len());
        let mut targeted = self.new_table(0);
        for (key, entry) in current {
            if is_target(&key) {
                targeted.insert(key, entry);
            } else {
                untargeted.insert(key, entry);
            }
        }

        #[cfg(feature = "logging")]
        logging::log_isolation(self.name(), targeted.len(), untargeted.len());

        let interim = Snapshot::new(untargeted, true);
        let mut rebuilt = self.live_copy_locked(&interim.entries, guard);
        rebuilt.extend(targeted);
        self.publish(interim, guard);

        overflow.misses = 0;
        overflow.entries.insert(rebuilt)
    }

    /// Publishes the overflow table as the new snapshot and rebuilds the
    /// overflow table from it. The lock must be held.
    fn republish_locked(&self, overflow: &mut Overflow<K, V, S>, guard: &Guard) {
        self.promote_locked(overflow, guard, PromotionCause::Batch);
        let snapshot = self.snapshot(guard);
        overflow.entries = Some(self.live_copy_locked(&snapshot.entries, guard));
    }
}
