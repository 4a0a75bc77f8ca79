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

use strata_common::{
    code::{Key, Value, Version},
    error::Result,
    store::Store,
};

use super::{AccessCore, AccessStrategy, AccessType};
use crate::{
    processor::PutFromLoadProcessor,
    value::{CacheValue, SoftLock},
};

/// Access strategy for data that is rarely updated and may be served stale for a short while.
///
/// Inserts and updates never populate the cache. Updates evict the item so that the next read loads it again.
#[derive(Debug)]
pub struct NonstrictReadWriteAccess<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    core: AccessCore<K, V, Ver, S>,
}

impl<K, V, Ver, S> NonstrictReadWriteAccess<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    pub(super) fn new(core: AccessCore<K, V, Ver, S>) -> Self {
        Self { core }
    }
}

impl<K, V, Ver, S> AccessStrategy for NonstrictReadWriteAccess<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    type Key = K;
    type Value = V;
    type Version = Ver;
    type Store = S;

    fn core(&self) -> &AccessCore<K, V, Ver, S> {
        &self.core
    }

    fn access_type(&self) -> AccessType {
        AccessType::NonstrictReadWrite
    }

    fn get(&self, key: &K, tx_timestamp: i64) -> Result<Option<V>> {
        tracing::debug!("[nonstrict]: get {:?} at {}", key, tx_timestamp);
        let value = self.core.region().get_value(key)?.and_then(CacheValue::into_value);
        Ok(self.core.record_get(value))
    }

    fn put_from_load_with_override(
        &self,
        key: K,
        value: V,
        tx_timestamp: i64,
        version: Option<Ver>,
        minimal_puts: bool,
    ) -> Result<bool> {
        tracing::debug!("[nonstrict]: put from load {:?} at {}", key, tx_timestamp);
        let processor = PutFromLoadProcessor::new(minimal_puts, self.core.new_cache_value(value, version));
        let written = self.core.region().invoke(&key, processor)?;
        Ok(self.core.record_put(written))
    }

    fn after_insert(&self, key: K, _: V, _: Option<Ver>) -> Result<bool> {
        tracing::debug!("[nonstrict]: after insert {:?}, leave it to the next read", key);
        Ok(false)
    }

    fn update(&self, key: &K, _: &V, _: Option<&Ver>, _: Option<&Ver>) -> Result<bool> {
        tracing::debug!("[nonstrict]: update {:?}", key);
        Ok(false)
    }

    fn after_update(&self, key: K, _: V, _: Option<Ver>, _: Option<Ver>, lock: Option<SoftLock>) -> Result<bool> {
        tracing::debug!("[nonstrict]: after update {:?}, evict", key);
        self.evict(&key)?;
        self.unlock_item(&key, lock)?;
        Ok(false)
    }

    fn lock_item(&self, _: &K, _: Option<&Ver>) -> Result<Option<SoftLock>> {
        Ok(None)
    }

    fn unlock_item(&self, _: &K, _: Option<SoftLock>) -> Result<()> {
        Ok(())
    }
}
