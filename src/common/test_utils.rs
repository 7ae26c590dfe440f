use std::{
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use crossbeam_epoch::Owned;

/// Counts the `Value`s created and dropped through one map's lifetime.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    value_created: AtomicU32,
    value_dropped: AtomicU32,
}

impl Counters {
    pub(crate) fn value_created(&self) -> u32 {
        self.value_created.load(Ordering::Acquire)
    }

    pub(crate) fn value_dropped(&self) -> u32 {
        self.value_dropped.load(Ordering::Acquire)
    }

    pub(crate) fn incl_value_created(&self) {
        self.value_created.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn incl_value_dropped(&self) {
        self.value_dropped.fetch_add(1, Ordering::AcqRel);
    }
}

/// A value that reports its creation, clones and drops to `Counters`.
#[derive(Debug)]
pub(crate) struct Value {
    id: u32,
    counters: Arc<Counters>,
}

impl Value {
    pub(crate) fn new(id: u32, counters: &Arc<Counters>) -> Self {
        counters.incl_value_created();
        Self {
            id,
            counters: Arc::clone(counters),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Self::new(self.id, &self.counters)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.id.hash(hasher);
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        self.counters.incl_value_dropped();
    }
}

/// Pins and flushes the current thread repeatedly so that the global epoch
/// advances and garbage retired by earlier operations gets destroyed.
pub(crate) fn run_deferred() {
    for _ in 0..65536 {
        let guard = crossbeam_epoch::pin();

        unsafe { guard.defer_destroy(Owned::new(0).into_shared(&guard)) };

        guard.flush();
    }
}
