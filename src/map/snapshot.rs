use super::entry::Entry;

use std::{
    collections::HashMap,
    hash::{BuildHasher, Hash},
};

use crossbeam_epoch::Guard;
use triomphe::Arc as TrioArc;

pub(crate) type EntryTable<K, V, S> = HashMap<K, TrioArc<Entry<V>>, S>;

/// An immutable generation of the read path.
///
/// The table itself is reference counted so that re-publishing the same
/// generation with a different `amended` flag does not copy it.
pub(crate) struct Snapshot<K, V, S> {
    pub(crate) entries: TrioArc<EntryTable<K, V, S>>,
    /// `true` if the overflow table holds keys that are missing from `entries`.
    pub(crate) amended: bool,
}

impl<K, V, S> Snapshot<K, V, S> {
    pub(crate) fn new(entries: EntryTable<K, V, S>, amended: bool) -> Self {
        Self {
            entries: TrioArc::new(entries),
            amended,
        }
    }

    /// The same generation, flagged as having pending keys in the overflow table.
    pub(crate) fn to_amended(&self) -> Self {
        Self {
            entries: TrioArc::clone(&self.entries),
            amended: true,
        }
    }
}

/// The lock-protected part of a map.
pub(crate) struct Overflow<K, V, S> {
    /// `None` means "identical to the snapshot". When present, holds every
    /// non-expunged entry of the snapshot plus every key not yet promoted.
    pub(crate) entries: Option<EntryTable<K, V, S>>,
    /// Number of reads that had to consult `entries` since the last promotion.
    pub(crate) misses: usize,
}

impl<K, V, S> Overflow<K, V, S> {
    pub(crate) fn empty() -> Self {
        Self {
            entries: None,
            misses: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, HashMap::len)
    }
}

/// Copies `table`, expunging soft-deleted entries and leaving every expunged
/// entry out of the copy. The map lock must be held.
pub(crate) fn without_expunged<K, V, S>(
    table: &EntryTable<K, V, S>,
    build_hasher: &S,
    guard: &Guard,
) -> EntryTable<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
{
    let mut copy = HashMap::with_capacity_and_hasher(table.len(), build_hasher.clone());
    copy.extend(
        table
            .iter()
            .filter(|(_, entry)| !entry.try_expunge_locked(guard))
            .map(|(key, entry)| (key.clone(), TrioArc::clone(entry))),
    );
    copy
}
