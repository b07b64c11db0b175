//! A module for `Key`, `Value` stores that hold their data in memory and
//! are generic for values of type `T`.
//!
//! A `KVStore` is a very simple in-memory database (with no persistence)
//! that stores data as a collection of key-value pairs where a `Key` is a
//! unique identifier to a `Value`. Each `Key` also names the execution unit
//! that 'owns' the value, which the `Executor` uses to decide where work on
//! that value runs first.
//!
//! Internally `KVStore`s store their data in memory as serialized blobs
//! (a `Value` aka a `Vec<u8>`), exactly as it would be shipped between
//! machines. The `KVStore` caches deserialized `Value`s into their type `T`
//! on a least-recently used basis, bounded both by the number of entries
//! and by their total deep size in bytes.
//!
//! ## Provided `KVStore` Functionality
//! - `get`: Retrieve the deserialized data for a `Key`, from the cache if
//!    possible
//! - `put`: Store a `Key`, `Value` pair
//! - `remove`: Drop the data for a `Key`, both the blob and any cached copy
//! - `contains`: Check whether data is stored for a `Key`
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

mod kv_store;

/// A `Key` defines where in a `KVStore` a `Value` is stored, as well as
/// which execution unit 'owns' the `Value`
#[derive(PartialEq, Eq, Hash, Serialize, Deserialize, Debug, Clone)]
pub struct Key {
    /// Defines where in a `KVStore` a value is stored
    pub name: String,
    /// Defines which execution unit 'owns' the associated `Value`
    pub home: usize,
}

/// A serialized blob of data. Is associated with a `Key` which defines where
/// this `Value` is stored in a `KVStore`, as well as its 'owner'
pub type Value = Vec<u8>;

/// Defines methods for a `Key`
impl Key {
    /// Creates a new `Key` that is owned by the execution unit with the id
    /// `home`. The given `name` defines where in the `KVStore` the value is
    /// stored.
    pub fn new(name: &str, home: usize) -> Self {
        Key {
            name: String::from(name),
            home,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.home)
    }
}

/// An in-memory `Key`, `Value` store which is generic for type `T`.
///
/// Internally `KVStore`s store their data in memory as serialized blobs
/// (`Vec<u8>`). The `KVStore` caches deserialized `Value`s into their type
/// `T` on a least-recently used basis.
#[derive(Debug)]
pub struct KVStore<T> {
    /// The data owned by this `KVStore`
    data: RwLock<HashMap<Key, Value>>,
    /// An `LRU` cache of deserialized values of type `T`
    cache: Mutex<LruCache<Key, Arc<T>>>,
    /// The total amount of memory (in bytes) this `KVStore` is allowed
    /// to keep in its cache
    max_cache_size: u64,
}
