use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

/// The logical content of an [`Entry`].
///
/// A slot is never mutated in place. Every state change allocates a new `Slot`
/// and installs it with a compare-and-swap; the replaced one is retired through
/// the epoch collector.
#[derive(Debug)]
pub(crate) enum Slot<V> {
    Present(V),
    /// The key was deleted but the entry is still reachable from both the
    /// snapshot and the overflow table. A later store revives it in place.
    SoftDeleted,
    /// The entry is reachable only from the snapshot and is missing from the
    /// overflow table. It cannot be stored into without first registering it
    /// in the overflow table under the lock.
    Expunged,
}

impl<V> Slot<V> {
    fn value(&self) -> Option<&V> {
        match self {
            Slot::Present(v) => Some(v),
            _ => None,
        }
    }

    fn is_expunged(&self) -> bool {
        matches!(self, Slot::Expunged)
    }

    fn is_soft_deleted(&self) -> bool {
        matches!(self, Slot::SoftDeleted)
    }
}

impl<V: Clone> Slot<V> {
    pub(crate) fn cloned_value(&self) -> Option<V> {
        self.value().cloned()
    }
}

/// A value boxed into a `Present` slot, ready to be installed into an entry.
///
/// A refused store hands it back unchanged, so that the caller can retry under
/// the lock without allocating again.
pub(crate) struct NewValue<V>(Owned<Slot<V>>);

impl<V> NewValue<V> {
    pub(crate) fn new(value: V) -> Self {
        Self(Owned::new(Slot::Present(value)))
    }
}

/// An atomically updatable value slot shared between snapshot generations and
/// the overflow table.
pub(crate) struct Entry<V> {
    slot: Atomic<Slot<V>>,
}

impl<V> Entry<V> {
    pub(crate) fn new(value: V) -> Self {
        Self::from_new_value(NewValue::new(value))
    }

    pub(crate) fn from_new_value(value: NewValue<V>) -> Self {
        Self {
            slot: Atomic::from(value.0),
        }
    }

    #[inline]
    fn current<'g>(&self, guard: &'g Guard) -> (Shared<'g, Slot<V>>, &'g Slot<V>) {
        let ptr = self.slot.load(Ordering::Acquire, guard);
        // Safety: the slot pointer is never null, and the slot it points to is
        // only destroyed after every guard pinned before its retirement is gone.
        (ptr, unsafe { ptr.deref() })
    }

    /// Installs `new` if the slot still holds `current`. On success the old
    /// slot is retired; on failure `new` is handed back for another attempt.
    #[inline]
    fn replace<'g>(
        &self,
        current: Shared<'g, Slot<V>>,
        new: Owned<Slot<V>>,
        guard: &'g Guard,
    ) -> Result<(), Owned<Slot<V>>> {
        match self
            .slot
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire, guard)
        {
            Ok(_) => {
                // Safety: `current` has been unlinked and is no longer reachable
                // from this entry.
                unsafe { guard.defer_destroy(current) };
                Ok(())
            }
            Err(e) => Err(e.new),
        }
    }

    /// Stores `value` unless the entry has been expunged, and returns what
    /// `read` makes of the replaced slot. An expunged entry gives the value
    /// back in `Err`.
    pub(crate) fn try_put<R>(
        &self,
        value: NewValue<V>,
        guard: &Guard,
        read: impl Fn(&Slot<V>) -> R,
    ) -> Result<R, NewValue<V>> {
        let mut new = value.0;
        loop {
            let (ptr, slot) = self.current(guard);
            if slot.is_expunged() {
                return Err(NewValue(new));
            }
            match self.replace(ptr, new, guard) {
                Ok(()) => return Ok(read(slot)),
                Err(n) => new = n,
            }
        }
    }

    /// Stores `value` unconditionally and returns what `read` makes of the
    /// replaced slot. Must be called with the map lock held on an entry known
    /// not to be expunged.
    pub(crate) fn put_locked<R>(
        &self,
        value: NewValue<V>,
        guard: &Guard,
        read: impl FnOnce(&Slot<V>) -> R,
    ) -> R {
        let old = self.slot.swap(value.0, Ordering::AcqRel, guard);
        // Safety: the pointer is never null and is unlinked by the swap above.
        // The guard keeps the slot alive until `read` is done with it.
        unsafe { guard.defer_destroy(old) };
        read(unsafe { old.deref() })
    }
}

impl<V: Clone> Entry<V> {
    /// Returns a clone of the value, or `None` when the entry is deleted.
    pub(crate) fn load(&self, guard: &Guard) -> Option<V> {
        self.current(guard).1.cloned_value()
    }

    /// Replaces the value with `new` if it currently equals `old`.
    pub(crate) fn try_compare_and_swap(&self, old: &V, new: V, guard: &Guard) -> bool
    where
        V: PartialEq,
    {
        let (mut ptr, mut slot) = self.current(guard);
        if slot.value() != Some(old) {
            return false;
        }
        let mut new = Owned::new(Slot::Present(new));
        loop {
            match self.replace(ptr, new, guard) {
                Ok(()) => return true,
                Err(n) => new = n,
            }
            (ptr, slot) = self.current(guard);
            if slot.value() != Some(old) {
                return false;
            }
        }
    }

    /// Loads the value if present, otherwise stores `value`.
    ///
    /// Returns `Ok((actual, loaded))`, or gives `value` back in `Err` when the
    /// entry is expunged.
    pub(crate) fn try_load_or_store(&self, value: V, guard: &Guard) -> Result<(V, bool), V> {
        let (mut ptr, mut slot) = self.current(guard);
        match slot {
            Slot::Expunged => return Err(value),
            Slot::Present(v) => return Ok((v.clone(), true)),
            Slot::SoftDeleted => (),
        }

        let mut new = Owned::new(Slot::Present(value.clone()));
        loop {
            match self.replace(ptr, new, guard) {
                Ok(()) => return Ok((value, false)),
                Err(n) => new = n,
            }
            (ptr, slot) = self.current(guard);
            match slot {
                Slot::Expunged => return Err(value),
                Slot::Present(v) => return Ok((v.clone(), true)),
                Slot::SoftDeleted => (),
            }
        }
    }

    /// Marks the entry as deleted, returning the value it held.
    pub(crate) fn delete(&self, guard: &Guard) -> Option<V> {
        let mut new = Owned::new(Slot::SoftDeleted);
        loop {
            let (ptr, slot) = self.current(guard);
            let value = slot.cloned_value()?;
            match self.replace(ptr, new, guard) {
                Ok(()) => return Some(value),
                Err(n) => new = n,
            }
        }
    }

    /// Marks the entry as deleted if its value equals `old`.
    pub(crate) fn compare_and_delete(&self, old: &V, guard: &Guard) -> bool
    where
        V: PartialEq,
    {
        let mut new = Owned::new(Slot::SoftDeleted);
        loop {
            let (ptr, slot) = self.current(guard);
            if slot.value() != Some(old) {
                return false;
            }
            match self.replace(ptr, new, guard) {
                Ok(()) => return true,
                Err(n) => new = n,
            }
        }
    }

    /// Expunges the entry whatever its state, returning the value it held.
    ///
    /// For entries that are being dropped from the overflow table while older
    /// snapshots may still hold them. A writer that reaches the entry through
    /// such a snapshot is then sent to the lock instead of storing into an
    /// entry that no table will ever see again. Lock must be held.
    pub(crate) fn delete_and_expunge_locked(&self, guard: &Guard) -> Option<V> {
        let mut new = Owned::new(Slot::Expunged);
        loop {
            let (ptr, slot) = self.current(guard);
            if slot.is_expunged() {
                return None;
            }
            let value = slot.cloned_value();
            match self.replace(ptr, new, guard) {
                Ok(()) => return value,
                Err(n) => new = n,
            }
        }
    }
}

impl<V> Entry<V> {
    /// Turns an expunged entry back into a soft-deleted one so that it can be
    /// stored into. Returns `true` if the entry was expunged, in which case the
    /// caller must register it in the overflow table. Lock must be held.
    pub(crate) fn unexpunge_locked(&self, guard: &Guard) -> bool {
        let (ptr, slot) = self.current(guard);
        if !slot.is_expunged() {
            return false;
        }
        // Only the lock holder moves entries into or out of the expunged state,
        // so this cannot race with another unexpunge.
        self.replace(ptr, Owned::new(Slot::SoftDeleted), guard).is_ok()
    }

    /// Expunges a soft-deleted entry. Returns `true` if the entry is expunged
    /// after the call. Lock must be held.
    pub(crate) fn try_expunge_locked(&self, guard: &Guard) -> bool {
        let mut new = Owned::new(Slot::Expunged);
        loop {
            let (ptr, slot) = self.current(guard);
            if !slot.is_soft_deleted() {
                return slot.is_expunged();
            }
            match self.replace(ptr, new, guard) {
                Ok(()) => return true,
                Err(n) => new = n,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_expunged(&self, guard: &Guard) -> bool {
        self.current(guard).1.is_expunged()
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        // The last handle to this entry is gone, and every snapshot that held
        // one was retired through the epoch collector, so no reader can still be
        // looking at the slot.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let ptr = self.slot.load(Ordering::Relaxed, guard);
        if !ptr.is_null() {
            drop(unsafe { ptr.into_owned() });
        }
    }
}
