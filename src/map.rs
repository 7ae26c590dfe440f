//! A read-mostly concurrent hash map.

mod batch;
mod builder;
mod entry;
mod iter;
mod snap_map;
mod snapshot;

pub use {builder::SnapMapBuilder, iter::Iter, snap_map::SnapMap};
