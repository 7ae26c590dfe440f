use crate::SnapMap;

use std::{
    collections::HashMap,
    hash::{BuildHasher, Hash},
    ops::ControlFlow,
};

/// A shared key-value store, as seen by the components that publish and look
/// up shared state through it.
///
/// Takes `&self` everywhere; implementations use interior mutability.
pub trait KvStore<K, V> {
    /// The hasher of the maps returned by the batch operations.
    type Hasher: BuildHasher;

    /// Returns a clone of the value for the key.
    fn get(&self, key: &K) -> Option<V>;

    /// Sets the value for the key.
    fn set(&self, key: K, value: V);

    /// Removes the key.
    fn delete(&self, key: &K);

    /// Returns the value already present for the key, or sets `value`. The
    /// `bool` is `true` if a value was already present.
    fn get_or_set(&self, key: K, value: V) -> (V, bool);

    /// Removes the key, returning its value.
    fn get_and_delete(&self, key: &K) -> Option<V>;

    /// Replaces the value for the key with `new` if it currently equals `old`.
    fn compare_and_swap(&self, key: &K, old: &V, new: V) -> bool
    where
        V: PartialEq;

    /// Calls `visit` for each key-value pair until it returns `false`.
    fn iter<F>(&self, visit: F)
    where
        F: FnMut(&K, &V) -> bool;

    /// Sets several keys at once, returning their previous values.
    fn swap_multiple(
        &self,
        pairs: HashMap<K, V, Self::Hasher>,
    ) -> HashMap<K, Option<V>, Self::Hasher>;

    /// Reads several keys at once.
    fn load_multiple(&self, keys: &[K]) -> HashMap<K, Option<V>, Self::Hasher>;

    /// Deletes several keys at once, returning the values they held.
    fn delete_multiple(&self, keys: &[K]) -> HashMap<K, Option<V>, Self::Hasher>;
}

impl<K, V, S> KvStore<K, V> for SnapMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    type Hasher = S;

    fn get(&self, key: &K) -> Option<V> {
        self.load(key)
    }

    fn set(&self, key: K, value: V) {
        self.store(key, value);
    }

    fn delete(&self, key: &K) {
        SnapMap::delete(self, key);
    }

    fn get_or_set(&self, key: K, value: V) -> (V, bool) {
        self.load_or_store(key, value)
    }

    fn get_and_delete(&self, key: &K) -> Option<V> {
        self.load_and_delete(key)
    }

    fn compare_and_swap(&self, key: &K, old: &V, new: V) -> bool
    where
        V: PartialEq,
    {
        SnapMap::compare_and_swap(self, key, old, new)
    }

    fn iter<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.range(|k, v| {
            if visit(k, v) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        });
    }

    fn swap_multiple(&self, pairs: HashMap<K, V, S>) -> HashMap<K, Option<V>, S> {
        SnapMap::swap_multiple(self, pairs)
    }

    fn load_multiple(&self, keys: &[K]) -> HashMap<K, Option<V>, S> {
        SnapMap::load_multiple(self, keys.iter().cloned())
    }

    fn delete_multiple(&self, keys: &[K]) -> HashMap<K, Option<V>, S> {
        SnapMap::delete_multiple(self, keys.iter().cloned())
    }
}
