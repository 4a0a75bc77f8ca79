// Copyright 2025 strata Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Debug, marker::PhantomData, sync::Arc, time::Duration};

use strata_common::{
    clock::{Clock, SystemClock},
    code::{Key, Value, Version, VersionComparator},
    config::{RegionConfig, MAX_LOCK_LEASE_DURATION},
    error::Result,
    store::{Processor, Store},
};
use strata_memory::{MemoryStore, MemoryStoreBuilder};

use crate::{
    access::{Access, AccessType},
    metrics::Metrics,
    value::CacheValue,
};

/// Builder of [`Region`].
#[derive(Debug)]
pub struct RegionBuilder {
    name: String,
    config: RegionConfig,
    clock: Arc<dyn Clock>,
}

impl RegionBuilder {
    /// Create a new region builder.
    ///
    /// The name of the region is used to name its store and to label its metrics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: RegionConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace all configurations with `config`, e.g. one built with [`RegionConfig::from_properties`].
    pub fn with_config(mut self, config: RegionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum time a soft lock may remain outstanding before it is treated as abandoned.
    ///
    /// Durations longer than `i32::MAX` milliseconds are capped.
    ///
    /// Default: 60s.
    pub fn with_lock_lease_duration(mut self, lock_lease_duration: Duration) -> Self {
        self.config.lock_lease_duration = lock_lease_duration;
        self
    }

    /// Set whether loads from the data source skip keys that are already cached.
    ///
    /// Default: `true`.
    pub fn with_minimal_puts(mut self, minimal_puts: bool) -> Self {
        self.config.minimal_puts = minimal_puts;
        self
    }

    /// Set the clock used to timestamp values and soft locks.
    ///
    /// All processes sharing a store must use clocks that agree with each other.
    ///
    /// Default: [`SystemClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the shard count of the in-memory store built by [`RegionBuilder::build`].
    ///
    /// Default: 16.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.config.shards = shards;
        self
    }

    /// Build the region on a new in-memory store.
    pub fn build<K, V, Ver>(self) -> Result<Region<K, V, Ver>>
    where
        K: Key,
        V: Value,
        Ver: Version,
    {
        let store = MemoryStoreBuilder::new(self.name.clone())
            .with_shards(self.config.shards)
            .build()?;
        self.build_with_store(store)
    }

    /// Build the region on the given store.
    pub fn build_with_store<K, V, Ver, S>(self, store: S) -> Result<Region<K, V, Ver, S>>
    where
        K: Key,
        V: Value,
        Ver: Version,
        S: Store<Key = K, Value = CacheValue<V, Ver>>,
    {
        let mut lock_lease_duration = self.config.lock_lease_duration;
        if lock_lease_duration > MAX_LOCK_LEASE_DURATION {
            tracing::debug!(
                "[region]: cap lock lease duration of region {} at {:?}",
                self.name,
                MAX_LOCK_LEASE_DURATION
            );
            lock_lease_duration = MAX_LOCK_LEASE_DURATION;
        }

        let metrics = Metrics::new(&self.name);

        tracing::info!(
            "[region]: build region {} on store {}, lock lease duration: {:?}, minimal puts: {}",
            self.name,
            store.name(),
            lock_lease_duration,
            self.config.minimal_puts
        );

        let inner = RegionInner {
            name: self.name,
            store,
            lock_lease_duration,
            minimal_puts: self.config.minimal_puts,
            clock: self.clock,
            metrics,
        };

        Ok(Region {
            inner: Arc::new(inner),
            _marker: PhantomData,
        })
    }
}

struct RegionInner<S> {
    name: String,
    store: S,
    lock_lease_duration: Duration,
    minimal_puts: bool,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

/// A named cache region: one store of [`CacheValue`]s plus the settings every access strategy on it shares.
///
/// `Region` is cheap to clone. All clones share the same store.
pub struct Region<K, V, Ver, S = MemoryStore<K, CacheValue<V, Ver>>>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    inner: Arc<RegionInner<S>>,
    _marker: PhantomData<fn() -> (K, V, Ver)>,
}

impl<K, V, Ver, S> Clone for Region<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V, Ver, S> Debug for Region<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.inner.name)
            .field("store", &self.inner.store.name())
            .field("lock_lease_duration", &self.inner.lock_lease_duration)
            .field("minimal_puts", &self.inner.minimal_puts)
            .field("clock", &self.inner.clock)
            .finish()
    }
}

impl<K, V, Ver, S> Region<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    /// Name of the region.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The store of the region.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Soft lock lease duration.
    pub fn lock_lease_duration(&self) -> Duration {
        self.inner.lock_lease_duration
    }

    /// Returns `true` if loads from the data source skip keys that are already cached by default.
    pub fn is_minimal_puts_enabled(&self) -> bool {
        self.inner.minimal_puts
    }

    /// The current time of the region clock in milliseconds.
    pub fn next_timestamp(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    /// Expiration time for a soft lock acquired now.
    pub fn new_soft_lock_expiration_time(&self) -> i64 {
        let lease = self.inner.lock_lease_duration.as_millis() as i64;
        self.next_timestamp().saturating_add(lease)
    }

    /// Get the raw cache value stored under `key`, including its soft lock state.
    pub fn get_value(&self, key: &K) -> Result<Option<CacheValue<V, Ver>>> {
        self.inner.store.get(key)
    }

    /// Store a raw cache value under `key` unconditionally.
    pub fn put_value(&self, key: K, value: CacheValue<V, Ver>) -> Result<()> {
        self.inner.store.put(key, value)
    }

    /// Execute a processor on the cache value stored under `key`.
    pub fn invoke<P>(&self, key: &K, processor: P) -> Result<P::Output>
    where
        P: Processor<CacheValue<V, Ver>>,
    {
        self.inner.store.invoke(key, processor)
    }

    /// Remove the cache value stored under `key`, whatever its soft lock state.
    pub fn evict(&self, key: &K) -> Result<()> {
        tracing::debug!("[region]: evict {:?} from region {}", key, self.inner.name);
        self.inner.store.remove(key)?;
        self.inner.metrics.evict.increment(1);
        Ok(())
    }

    /// Remove all cache values.
    pub fn evict_all(&self) -> Result<()> {
        tracing::debug!("[region]: evict all from region {}", self.inner.name);
        self.inner.store.clear()?;
        self.inner.metrics.evict.increment(1);
        Ok(())
    }

    /// Try to take the region-wide lock. Returns `false` if it is held by someone else.
    pub fn lock_cache(&self) -> Result<bool> {
        self.inner.store.lock_all()
    }

    /// Release the region-wide lock.
    pub fn unlock_cache(&self) -> Result<()> {
        self.inner.store.unlock_all()
    }

    /// Returns `true` if a cache value is stored under `key`.
    pub fn contains(&self, key: &K) -> Result<bool> {
        self.inner.store.contains(key)
    }

    /// Count of cache values in the region.
    pub fn element_count(&self) -> Result<usize> {
        self.inner.store.len()
    }

    /// Release the store of the region. Every later store operation fails.
    pub fn destroy(&self) {
        if self.inner.store.is_released() {
            return;
        }
        self.inner.store.release();
        tracing::info!("[region]: region {} destroyed", self.inner.name);
    }

    /// Create an access strategy of the given type on the region.
    ///
    /// Versioned values are only compared if a comparator is supplied with
    /// [`Region::access_with_comparator`].
    pub fn access(&self, access_type: AccessType) -> Result<Access<K, V, Ver, S>> {
        Access::new(access_type, self.clone(), None)
    }

    /// Create an access strategy of the given type on the region that orders versions with `comparator`.
    pub fn access_with_comparator(
        &self,
        access_type: AccessType,
        comparator: Arc<dyn VersionComparator<Ver>>,
    ) -> Result<Access<K, V, Ver, S>> {
        Access::new(access_type, self.clone(), Some(comparator))
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}
