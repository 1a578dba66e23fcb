//! TTL cache for computed statistics
//!
//! Entries live in the injected key-value store under
//! [`CacheKey::storage_key`]. Expiry is checked when an entry is read;
//! [`StatisticsCache::clear_expired_cache`] purges what reads left behind.
//!
//! Reads never fail: any store, timeout or decoding problem is a miss.
//! Writes report failure as `false`. Concurrent writers to one key follow
//! last-writer-wins.
//!
//! Every mutation made through one `StatisticsCache` holds its write lock,
//! so a revalidation or purge never acts on an entry that a concurrent
//! write has already replaced. Share the cache through an `Arc` rather than
//! building several caches over the same store.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tally_core::{with_timeout, CacheSettings, Clock, KeyValueStore, SharedClock};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::{CacheKey, Period, StatType, CACHE_KEY_PREFIX};

/// Default freshness window
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Cache of computed statistics keyed by `(user, statistic type, period)`
pub struct StatisticsCache {
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    /// Bound for each store call
    timeout: Duration,
    freshness_window: Duration,
    /// Serializes read-modify-write sequences against plain writes
    writes: Mutex<()>,
}

impl StatisticsCache {
    /// Create a cache over `store`
    pub fn new(store: Arc<dyn KeyValueStore>, clock: SharedClock, timeout: Duration) -> Self {
        Self {
            store,
            clock,
            timeout,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            writes: Mutex::new(()),
        }
    }

    /// Create a cache using the freshness window from configuration
    pub fn with_settings(
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        timeout: Duration,
        settings: &CacheSettings,
    ) -> Self {
        Self::new(store, clock, timeout).with_freshness_window(settings.freshness_window())
    }

    /// Override the freshness window
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Store `data` for `ttl`, replacing any previous value for the key
    ///
    /// Returns false if the payload cannot be serialized, would not read
    /// back as `T` (non-finite floats become JSON `null`), or the store
    /// write fails.
    pub async fn cache_statistic<T>(
        &self,
        user_id: &str,
        stat_type: StatType,
        data: &T,
        period: Period,
        ttl: Duration,
    ) -> bool
    where
        T: Serialize + DeserializeOwned,
    {
        let key = CacheKey::new(user_id, stat_type, period).storage_key();

        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize statistic {}: {}", key, e);
                return false;
            }
        };
        if let Err(e) = serde_json::from_value::<T>(value.clone()) {
            warn!("Refusing statistic {} that would not read back: {}", key, e);
            return false;
        }

        let bytes = match CacheEntry::new(value, self.clock.now(), ttl).to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize statistic {}: {}", key, e);
                return false;
            }
        };

        let _writes = self.writes.lock().await;
        match with_timeout(self.timeout, self.store.put(&key, bytes)).await {
            Ok(()) => {
                debug!("Cached statistic {} for {:?}", key, ttl);
                true
            }
            Err(e) => {
                warn!("Failed to cache statistic {}: {}", key, e);
                false
            }
        }
    }

    /// Cached value for the key if present and unexpired
    pub async fn get_cached_statistic<T>(
        &self,
        user_id: &str,
        stat_type: StatType,
        period: Period,
    ) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let key = CacheKey::new(user_id, stat_type, period).storage_key();
        let entry = self.live_entry(&key).await?;

        match serde_json::from_value(entry.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Cached statistic {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Whether an unexpired entry exists and was validated within the freshness window
    pub async fn is_cache_valid(&self, user_id: &str, stat_type: StatType, period: Period) -> bool {
        let key = CacheKey::new(user_id, stat_type, period).storage_key();
        match self.live_entry(&key).await {
            Some(entry) => entry.is_fresh_at(self.clock.now(), self.freshness_window),
            None => false,
        }
    }

    /// Mark an unexpired entry as confirmed current
    ///
    /// Does not extend its TTL. Returns false if there is no live entry or
    /// the write fails.
    pub async fn revalidate(&self, user_id: &str, stat_type: StatType, period: Period) -> bool {
        let key = CacheKey::new(user_id, stat_type, period).storage_key();
        let _writes = self.writes.lock().await;
        let Some(mut entry) = self.live_entry(&key).await else {
            return false;
        };

        entry.validated_at = self.clock.now();
        let bytes = match entry.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize statistic {}: {}", key, e);
                return false;
            }
        };

        match with_timeout(self.timeout, self.store.put(&key, bytes)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to revalidate statistic {}: {}", key, e);
                false
            }
        }
    }

    /// Remove every period of one statistic type for a user
    pub async fn invalidate_cache(&self, user_id: &str, stat_type: StatType) -> Result<usize> {
        let removed = self
            .remove_prefix(&CacheKey::stat_prefix(user_id, stat_type))
            .await?;
        debug!("Invalidated {} {} entries for {}", removed, stat_type, user_id);
        Ok(removed)
    }

    /// Remove every cached statistic of a user
    pub async fn invalidate_all_cache(&self, user_id: &str) -> Result<usize> {
        let removed = self.remove_prefix(&CacheKey::user_prefix(user_id)).await?;
        debug!("Invalidated {} entries for {}", removed, user_id);
        Ok(removed)
    }

    /// Remove expired entries across all users
    ///
    /// Entries that can no longer be decoded are removed as well.
    pub async fn clear_expired_cache(&self) -> Result<usize> {
        let keys = with_timeout(self.timeout, self.store.keys_with_prefix(CACHE_KEY_PREFIX)).await?;
        let now = self.clock.now();
        let mut removed = 0;

        for key in keys {
            let _writes = self.writes.lock().await;
            let Some(bytes) = with_timeout(self.timeout, self.store.get(&key)).await? else {
                continue;
            };

            let purge = match CacheEntry::from_bytes(&bytes) {
                Ok(entry) => entry.is_expired_at(now),
                Err(e) => {
                    warn!("Purging undecodable cache entry {}: {}", key, e);
                    true
                }
            };

            if purge && with_timeout(self.timeout, self.store.delete(&key)).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Cleared {} expired statistics", removed);
        }
        Ok(removed)
    }

    /// Unexpired entry under `key`; every failure is a miss
    async fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        let bytes = match with_timeout(self.timeout, self.store.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                return None;
            }
        };

        let entry = match CacheEntry::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache entry {} is corrupt: {}", key, e);
                return None;
            }
        };

        if entry.is_expired_at(self.clock.now()) {
            debug!("Cache entry {} expired at {}", key, entry.expires_at());
            return None;
        }
        Some(entry)
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let _writes = self.writes.lock().await;
        let keys = with_timeout(self.timeout, self.store.keys_with_prefix(prefix)).await?;
        let mut removed = 0;
        for key in keys {
            if with_timeout(self.timeout, self.store.delete(&key)).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
