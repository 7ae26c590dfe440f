use std::fmt;

/// Why the overflow table was published as a new snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PromotionCause {
    /// Reads missed the snapshot as many times as the overflow table has keys.
    Misses,
    /// An iteration needed a single consistent generation.
    Iteration,
    /// A batch operation finished.
    Batch,
}

impl fmt::Display for PromotionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Misses => "misses",
            Self::Iteration => "iteration",
            Self::Batch => "batch",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "logging")]
fn prefix(map_name: Option<&str>) -> String {
    map_name.map(|name| format!("[{name}] ")).unwrap_or_default()
}

#[cfg(feature = "logging")]
pub(crate) fn log_promotion(map_name: Option<&str>, len: usize, cause: PromotionCause) {
    let mn = prefix(map_name);
    log::debug!("{mn}Promoted {len} overflow entries to a new snapshot ({cause})");
}

#[cfg(feature = "logging")]
pub(crate) fn log_isolation(map_name: Option<&str>, targets: usize, untargeted: usize) {
    let mn = prefix(map_name);
    log::trace!(
        "{mn}Isolated {targets} keys from the read path; interim snapshot holds {untargeted} entries"
    );
}

#[cfg(feature = "logging")]
pub(crate) fn log_overflow_built(map_name: Option<&str>, len: usize) {
    let mn = prefix(map_name);
    log::trace!("{mn}Built an overflow table from a snapshot of {len} entries");
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::{prefix, PromotionCause};
    use crate::SnapMap;

    use std::{cell::RefCell, sync::Once};

    thread_local! {
        static RECORDS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Keeps the messages logged by each test thread apart.
    struct ThreadLogger;

    impl log::Log for ThreadLogger {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            RECORDS.with(|r| r.borrow_mut().push(record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static LOGGER: ThreadLogger = ThreadLogger;
    static INIT: Once = Once::new();

    fn take_records() -> Vec<String> {
        RECORDS.with(|r| r.borrow_mut().drain(..).collect())
    }

    fn start_capture() {
        INIT.call_once(|| {
            log::set_logger(&LOGGER).expect("Failed to set the logger");
            log::set_max_level(log::LevelFilter::Trace);
        });
        take_records();
    }

    #[test]
    fn names_and_causes() {
        assert_eq!(prefix(None), "");
        assert_eq!(prefix(Some("caps")), "[caps] ");
        assert_eq!(PromotionCause::Misses.to_string(), "misses");
        assert_eq!(PromotionCause::Iteration.to_string(), "iteration");
        assert_eq!(PromotionCause::Batch.to_string(), "batch");
    }

    #[test]
    fn batch_logs_every_overflow_build() {
        let map = SnapMap::builder().name("batch").build();
        map.store(1, 1);
        map.store(2, 2);
        let _ = map.iter();

        start_capture();
        let _ = map.delete_multiple([1]);
        let records = take_records();

        // One copy of the snapshot to split the targets off, one of the interim
        // snapshot, and one of the republished snapshot.
        let builds = records
            .iter()
            .filter(|r| r.starts_with("[batch] Built an overflow table"))
            .count();
        assert_eq!(builds, 3, "{records:?}");
        assert!(records
            .iter()
            .any(|r| r == "[batch] Isolated 1 keys from the read path; interim snapshot holds 1 entries"));
        assert!(records
            .iter()
            .any(|r| r == "[batch] Promoted 1 overflow entries to a new snapshot (batch)"));
    }

    #[test]
    fn first_pending_key_logs_an_overflow_build() {
        let map = SnapMap::builder().name("single").build();
        map.store("a", 1);
        let _ = map.iter();

        start_capture();
        map.store("b", 2);
        assert_eq!(
            take_records(),
            vec!["[single] Built an overflow table from a snapshot of 1 entries"]
        );
    }
}
