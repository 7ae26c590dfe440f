#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A concurrent hash map for read-mostly workloads.
//!
//! [`SnapMap`] serves reads from an immutable snapshot table that is swapped
//! atomically as a whole, so a read never takes a lock. Keys that are new since
//! the snapshot was published live in an overflow table behind a single mutex.
//! When enough reads have missed the snapshot, the overflow table is promoted
//! to become the next snapshot, so the cost of rebuilding it is amortized over
//! those misses.
//!
//! Besides the usual single-key operations (`load`, `store`, `swap`,
//! `compare_and_swap`, `load_or_store`, `compare_and_delete`,
//! `load_and_delete`, `delete`), the map provides batch operations
//! (`swap_multiple`, `load_multiple`, `delete_multiple`) that operate on a set
//! of keys without any other writer touching those keys mid-batch.
//!
//! # Example
//!
//! ```rust
//! use snapmap::SnapMap;
//!
//! let map = SnapMap::new();
//!
//! map.store("a", 1);
//! assert_eq!(map.load("a"), Some(1));
//!
//! assert_eq!(map.load_or_store("b", 5), (5, false));
//! assert_eq!(map.load_or_store("b", 9), (5, true));
//!
//! assert!(map.compare_and_swap("a", &1, 2));
//! assert!(!map.compare_and_swap("a", &1, 3));
//! assert_eq!(map.load("a"), Some(2));
//!
//! map.delete("a");
//! assert_eq!(map.load("a"), None);
//! ```
//!
//! # Logging
//!
//! With the `logging` feature (enabled by default), maps emit `debug` records
//! through the [`log`](https://docs.rs/log) crate when they promote their
//! overflow table, and `trace` records when batch operations rebuild it.
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust version (MSRV) is 1.65.

pub(crate) mod common;
pub(crate) mod kv_store;
pub(crate) mod map;

pub use kv_store::KvStore;
pub use map::{Iter, SnapMap, SnapMapBuilder};
