use super::entry::Entry;

use triomphe::Arc as TrioArc;

/// An iterator over the live key-value pairs of a [`SnapMap`][map-struct].
///
/// Created by the [`iter`][iter-method] method. The iterator holds on to the
/// entries of the generation that was current when it was created, and reads
/// their values lazily as it advances.
///
/// [map-struct]: ./struct.SnapMap.html
/// [iter-method]: ./struct.SnapMap.html#method.iter
pub struct Iter<K, V> {
    entries: std::vec::IntoIter<(K, TrioArc<Entry<V>>)>,
}

impl<K, V> Iter<K, V> {
    pub(crate) fn new(entries: Vec<(K, TrioArc<Entry<V>>)>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl<K, V> Iterator for Iter<K, V>
where
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let guard = &crossbeam_epoch::pin();
        for (key, entry) in self.entries.by_ref() {
            if let Some(value) = entry.load(guard) {
                return Some((key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // Deleted entries are skipped.
        (0, Some(self.entries.len()))
    }
}
