//! The `KVStore`
use crate::config::StoreConfig;
use crate::error::LiquidError;
use crate::kv::{KVStore, Key, Value};
use bincode::{deserialize, serialize};
use deepsize::DeepSizeOf;
use log::{debug, info, warn};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use sysinfo::{RefreshKind, System, SystemExt};
use tokio::sync::{Mutex, RwLock};

const CACHE_MEMORY_FRACTION: f64 = 0.33;
const BYTES_PER_GB: f64 = 1_073_741_824.0;

impl<T: Serialize + DeserializeOwned + Sync + Send + DeepSizeOf + 'static>
    KVStore<T>
{
    /// Creates a new `KVStore`, sizing its cache from the given `config`.
    /// When `config.max_cache_bytes` is `None`, the cache may use a third
    /// of this machine's memory.
    pub fn new(config: &StoreConfig) -> Self {
        let max_cache_size = match config.max_cache_bytes {
            Some(bytes) => bytes,
            None => {
                let memo_info_kind = RefreshKind::new().with_memory();
                let sys = System::new_with_specifics(memo_info_kind);
                (sys.total_memory() as f64 * CACHE_MEMORY_FRACTION) as u64
            }
        };
        info!(
            "KVStore has a max cache size of {:.3} GB",
            max_cache_size as f64 / BYTES_PER_GB
        );
        let max_entries = NonZeroUsize::new(config.max_cached_values)
            .unwrap_or(NonZeroUsize::MIN);
        KVStore {
            data: RwLock::new(HashMap::new()),
            cache: Mutex::new(LruCache::new(max_entries)),
            max_cache_size,
        }
    }

    /// Used to retrieve the deserialized `Value` associated with the given
    /// `key`, from the cache if it is there and from the stored blob
    /// otherwise.
    ///
    /// ## Errors
    /// If nothing is stored under `key`, then the error
    /// `Err(LiquidError::NotPresent)` is returned
    pub async fn get(&self, key: &Key) -> Result<Arc<T>, LiquidError> {
        if let Some(val) = { self.cache.lock().await.get(key).cloned() } {
            return Ok(val);
        }

        let serialized_val = self.get_raw(key).await?;
        let value: Arc<T> = Arc::new(deserialize(&serialized_val[..])?);
        self.add_to_cache(key.clone(), value.clone()).await;
        Ok(value)
    }

    /// Puts the data held in `value` into this `KVStore` under `key`.
    ///
    /// If this `KVStore` did not have this `key` present, `Ok(None)` is
    /// returned.
    ///
    /// If this `KVStore` does have this `key` present, the `Value` is
    /// updated, and `Ok(Some<Value>)` of the old `Value` is returned.
    pub async fn put(
        &self,
        key: Key,
        value: T,
    ) -> Result<Option<Value>, LiquidError> {
        let serial = serialize(&value)?;
        debug!("Put key {} ({} bytes) into KVStore", key, serial.len());
        let opt_old_data =
            { self.data.write().await.insert(key.clone(), serial) };
        if opt_old_data.is_some() {
            // a stale deserialized copy must not outlive its blob
            self.cache.lock().await.pop(&key);
        }
        self.add_to_cache(key, Arc::new(value)).await;
        Ok(opt_old_data)
    }

    /// Removes the data for `key`, returning its serialized blob if there
    /// was one. Cached copies are dropped too.
    pub async fn remove(&self, key: &Key) -> Option<Value> {
        self.cache.lock().await.pop(key);
        self.data.write().await.remove(key)
    }

    /// Whether data is stored under `key`
    pub async fn contains(&self, key: &Key) -> bool {
        self.data.read().await.contains_key(key)
    }

    /// The number of values stored in this `KVStore`
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// The number of deserialized values currently cached
    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn get_raw(&self, key: &Key) -> Result<Value, LiquidError> {
        match { self.data.read().await.get(key).cloned() } {
            Some(serialized_blob) => Ok(serialized_blob),
            None => Err(LiquidError::NotPresent(key.clone())),
        }
    }

    async fn add_to_cache(&self, key: Key, value: Arc<T>) {
        let v_size = value.deep_size_of() as u64;
        if v_size > self.max_cache_size {
            warn!(
                "Not caching {} of size {} bytes, larger than the max cache \
                 size of {} bytes",
                key, v_size, self.max_cache_size
            );
            return;
        }
        let mut unlocked = self.cache.lock().await;
        let mut cache_size = unlocked
            .iter()
            .filter(|(k, _)| **k != key)
            .fold(0, |acc, (_, v)| acc + v.deep_size_of())
            as u64;
        while cache_size + v_size > self.max_cache_size {
            match unlocked.pop_lru() {
                Some((_, temp)) => {
                    let temp_size = temp.deep_size_of();
                    info!("Popped cached value of size {} bytes", temp_size);
                    cache_size = cache_size.saturating_sub(temp_size as u64);
                }
                None => break,
            }
        }
        debug!("Added value of size {} bytes to cache", v_size);
        unlocked.put(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_cached_values: usize, max_cache_bytes: u64) -> StoreConfig {
        StoreConfig {
            max_cached_values,
            max_cache_bytes: Some(max_cache_bytes),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_put_get() {
        let kv: KVStore<Vec<u64>> = KVStore::new(&config(4, 1 << 20));
        let key = Key::new("a", 0);
        assert!(kv.put(key.clone(), vec![1, 2, 3]).await.unwrap().is_none());
        assert_eq!(*kv.get(&key).await.unwrap(), vec![1, 2, 3]);
        let old = kv.put(key.clone(), vec![4]).await.unwrap();
        assert!(old.is_some());
        assert_eq!(*kv.get(&key).await.unwrap(), vec![4]);
        assert_eq!(kv.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let kv: KVStore<Vec<u64>> = KVStore::new(&config(4, 1 << 20));
        match kv.get(&Key::new("nope", 1)).await {
            Err(LiquidError::NotPresent(k)) => assert_eq!(k.name, "nope"),
            other => panic!("expected NotPresent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cache_evicts_by_count_and_size() {
        let kv: KVStore<Vec<u64>> = KVStore::new(&config(2, 1 << 20));
        for i in 0..5 {
            kv.put(Key::new(&i.to_string(), 0), vec![i]).await.unwrap();
        }
        assert_eq!(kv.cached_len().await, 2);
        // evicted values are still served from their blobs
        assert_eq!(*kv.get(&Key::new("0", 0)).await.unwrap(), vec![0]);

        let kv: KVStore<Vec<u64>> = KVStore::new(&config(100, 1000));
        for i in 0..5 {
            kv.put(Key::new(&i.to_string(), 0), vec![i; 50]).await.unwrap();
        }
        assert_eq!(kv.cached_len().await, 2);
        assert_eq!(kv.len().await, 5);
    }

    #[tokio::test]
    async fn test_oversized_value_served_uncached() {
        let kv: KVStore<Vec<u64>> = KVStore::new(&config(4, 100));
        let key = Key::new("big", 0);
        kv.put(key.clone(), vec![7; 50]).await.unwrap();
        assert_eq!(kv.cached_len().await, 0);
        assert_eq!(*kv.get(&key).await.unwrap(), vec![7; 50]);
        assert_eq!(kv.cached_len().await, 0);

        kv.put(Key::new("small", 0), vec![1]).await.unwrap();
        assert_eq!(kv.cached_len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let kv: KVStore<Vec<u64>> = KVStore::new(&config(4, 1 << 20));
        let key = Key::new("a", 2);
        kv.put(key.clone(), vec![1]).await.unwrap();
        assert!(kv.contains(&key).await);
        assert!(kv.remove(&key).await.is_some());
        assert!(!kv.contains(&key).await);
        assert!(kv.get(&key).await.is_err());
        assert!(kv.is_empty().await);
    }
}
