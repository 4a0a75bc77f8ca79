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

use std::{
    fmt::Debug,
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;
use strata_common::{
    code::{Key, Value},
    config::DEFAULT_SHARDS,
    error::{Error, Result},
    store::{Entry, Processor, Store},
};

/// Builder of [`MemoryStore`].
pub struct MemoryStoreBuilder<K, V, S = RandomState>
where
    K: Key,
    V: Value,
    S: BuildHasher + Send + Sync + 'static,
{
    name: String,
    shards: usize,
    hash_builder: S,
    _marker: std::marker::PhantomData<fn() -> (K, V)>,
}

impl<K, V> MemoryStoreBuilder<K, V, RandomState>
where
    K: Key,
    V: Value,
{
    /// Create a new memory store builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shards: DEFAULT_SHARDS,
            hash_builder: RandomState::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, S> MemoryStoreBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Set the shard count. Entries will be distributed to different shards based on their hash.
    /// Operations on different shards can be parallelized.
    ///
    /// Default: 16.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the hash builder used to pick the shard of a key.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> MemoryStoreBuilder<K, V, OS>
    where
        OS: BuildHasher + Send + Sync + 'static,
    {
        MemoryStoreBuilder {
            name: self.name,
            shards: self.shards,
            hash_builder,
            _marker: std::marker::PhantomData,
        }
    }

    /// Build the memory store.
    pub fn build(self) -> Result<MemoryStore<K, V, S>> {
        if self.shards == 0 {
            return Err(Error::config("memory store requires at least one shard").with_context("store", &self.name));
        }

        let shards = (0..self.shards).map(|_| Mutex::new(HashMap::new())).collect();

        tracing::debug!("[memory store]: build store {} with {} shards", self.name, self.shards);

        Ok(MemoryStore {
            name: self.name,
            shards,
            hash_builder: self.hash_builder,
            locked: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }
}

/// In-memory, hash-partitioned key/value store.
pub struct MemoryStore<K, V, S = RandomState>
where
    K: Key,
    V: Value,
    S: BuildHasher + Send + Sync + 'static,
{
    name: String,
    shards: Vec<Mutex<HashMap<K, V>>>,
    hash_builder: S,

    locked: AtomicBool,
    released: AtomicBool,
}

impl<K, V, S> Debug for MemoryStore<K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .field("locked", &self.locked.load(Ordering::Relaxed))
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V, S> MemoryStore<K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Shard count of the store.
    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    /// Returns `true` if the store-wide lock is held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn shard(&self, key: &K) -> &Mutex<HashMap<K, V>> {
        let hash = self.hash_builder.hash_one(key);
        &self.shards[hash as usize % self.shards.len()]
    }

    fn check(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::released(&self.name));
        }
        Ok(())
    }
}

impl<K, V, S> Store for MemoryStore<K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    fn name(&self) -> &str {
        &self.name
    }

    fn invoke<P>(&self, key: &K, processor: P) -> Result<P::Output>
    where
        P: Processor<V>,
    {
        self.check()?;

        let mut shard = self.shard(key).lock();
        // The slot stays in place while the processor runs.
        let mut entry = Entry::new(shard.get(key).cloned());
        let output = processor.process(&mut entry);
        if entry.is_dirty() {
            match entry.into_value() {
                Some(value) => {
                    shard.insert(key.clone(), value);
                }
                None => {
                    shard.remove(key);
                }
            }
        }
        drop(shard);

        Ok(output)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.check()?;
        Ok(self.shard(key).lock().get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        self.check()?;
        self.shard(&key).lock().insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.check()?;
        Ok(self.shard(key).lock().remove(key))
    }

    fn contains(&self, key: &K) -> Result<bool> {
        self.check()?;
        Ok(self.shard(key).lock().contains_key(key))
    }

    fn len(&self) -> Result<usize> {
        self.check()?;
        Ok(self.shards.iter().map(|shard| shard.lock().len()).sum())
    }

    fn clear(&self) -> Result<()> {
        self.check()?;

        // Do not deallocate data within the lock section.
        let mut garbages = Vec::with_capacity(self.shards.len());
        for shard in self.shards.iter() {
            garbages.push(std::mem::take(&mut *shard.lock()));
        }
        drop(garbages);

        Ok(())
    }

    fn lock_all(&self) -> Result<bool> {
        self.check()?;
        Ok(self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    fn unlock_all(&self) -> Result<()> {
        self.check()?;
        self.locked.store(false, Ordering::Release);
        Ok(())
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
        tracing::info!("[memory store]: store {} released", self.name);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
