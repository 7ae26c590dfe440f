use super::SnapMap;

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

/// Builds a [`SnapMap`][map-struct] with various configuration knobs.
///
/// [map-struct]: ./struct.SnapMap.html
///
/// # Examples
///
/// ```rust
/// use snapmap::SnapMap;
///
/// let map = SnapMap::builder()
///     // Used as a prefix of the log messages of this map.
///     .name("capabilities")
///     // Room for 1,000 entries in the initial snapshot.
///     .initial_capacity(1_000)
///     .build();
///
/// map.store("answer", 42);
/// assert_eq!(map.name(), Some("capabilities"));
/// assert_eq!(map.load("answer"), Some(42));
/// ```
///
#[must_use]
pub struct SnapMapBuilder<K, V> {
    name: Option<String>,
    initial_capacity: Option<usize>,
    map_type: PhantomData<SnapMap<K, V>>,
}

impl<K, V> Default for SnapMapBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            name: None,
            initial_capacity: None,
            map_type: PhantomData::default(),
        }
    }
}

impl<K, V> SnapMapBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Sets the name of the map. The name is shown in log messages.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the initial capacity (number of entries) of the first snapshot.
    pub fn initial_capacity(self, number_of_entries: usize) -> Self {
        Self {
            initial_capacity: Some(number_of_entries),
            ..self
        }
    }

    /// Builds a `SnapMap<K, V>`.
    pub fn build(self) -> SnapMap<K, V, RandomState> {
        SnapMap::with_everything(self.name, self.initial_capacity, RandomState::default())
    }

    /// Builds a `SnapMap<K, V, S>` with the given `hasher`.
    pub fn build_with_hasher<S>(self, hasher: S) -> SnapMap<K, V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        SnapMap::with_everything(self.name, self.initial_capacity, hasher)
    }
}
