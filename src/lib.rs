#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

// Renamed so the `alloc` module below doesn't shadow the crate.
extern crate alloc as alloc_crate;

/// The allocator seam for the table's slot array.
///
/// This module provides the `TableAlloc` trait plus the `Global` default
/// implementation backed by the registered global allocator.
pub mod alloc;

/// A hash map built on the open-addressing `HashTable`.
///
/// This module provides a `HashMap` that wraps the `HashTable` and exposes
/// a key-value interface with configurable hashers and allocators.
pub mod hash_map;

/// The core open-addressing table.
///
/// This module provides the hash-and-predicate driven `HashTable`: linear
/// probing, tombstone deletion, `2^k - 1` capacities, and an entry API the
/// map and set façades build on.
pub mod hash_table;

/// A hash set built on the open-addressing `HashTable`.
///
/// This module provides a `HashSet` that wraps the `HashTable` and exposes
/// a set interface with configurable hashers and allocators.
pub mod hash_set;

pub use alloc::Global;
pub use alloc::TableAlloc;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use hash_table::HashTable;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The default hasher builder, backed by `foldhash`.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The default hasher builder, backed by the standard library's
        /// `RandomState`.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    }
}
