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
    processor::{
        AfterInsertProcessor, AfterUpdateProcessor, GetProcessor, ReadWritePutFromLoadProcessor, SoftLockProcessor,
        SoftUnlockProcessor,
    },
    value::{CacheValue, SoftLock},
};

/// Access strategy that soft-locks items while they are updated.
///
/// Soft-locked items read as misses, and loads may only replace them once every lock has been released or has
/// expired. An update in progress is therefore never overwritten by a stale concurrent load.
#[derive(Debug)]
pub struct ReadWriteAccess<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    core: AccessCore<K, V, Ver, S>,
}

impl<K, V, Ver, S> ReadWriteAccess<K, V, Ver, S>
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

impl<K, V, Ver, S> AccessStrategy for ReadWriteAccess<K, V, Ver, S>
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
        AccessType::ReadWrite
    }

    fn get(&self, key: &K, tx_timestamp: i64) -> Result<Option<V>> {
        tracing::debug!("[read-write]: get {:?} at {}", key, tx_timestamp);
        let value = self.core.region().invoke(key, GetProcessor)?;
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
        tracing::debug!(
            "[read-write]: put from load {:?} at {}, minimal puts: {}",
            key,
            tx_timestamp,
            minimal_puts
        );
        let processor = ReadWritePutFromLoadProcessor::new(
            minimal_puts,
            tx_timestamp,
            self.core.new_cache_value(value, version),
            self.core.comparator().cloned(),
        );
        let written = self.core.region().invoke(&key, processor)?;
        Ok(self.core.record_put(written))
    }

    fn after_insert(&self, key: K, value: V, version: Option<Ver>) -> Result<bool> {
        tracing::debug!("[read-write]: after insert {:?}", key);
        let processor = AfterInsertProcessor::new(self.core.new_cache_value(value, version));
        let inserted = self.core.region().invoke(&key, processor)?;
        if inserted {
            self.core.region().metrics().insert.increment(1);
        }
        Ok(inserted)
    }

    fn update(&self, key: &K, _: &V, _: Option<&Ver>, _: Option<&Ver>) -> Result<bool> {
        tracing::debug!("[read-write]: update {:?}", key);
        Ok(false)
    }

    fn after_update(
        &self,
        key: K,
        value: V,
        current_version: Option<Ver>,
        _: Option<Ver>,
        lock: Option<SoftLock>,
    ) -> Result<bool> {
        let Some(lock) = lock else {
            // Concurrent loads were not fenced off while the data source was written.
            tracing::debug!("[read-write]: after update {:?} without lock, evict", key);
            self.evict(&key)?;
            return Ok(false);
        };
        tracing::debug!("[read-write]: after update {:?} with {:?}", key, lock);
        let release_time = self.core.region().next_timestamp();
        let replacement = CacheValue::new(value, current_version, release_time);
        let processor = AfterUpdateProcessor::new(replacement, lock, release_time);
        let updated = self.core.region().invoke(&key, processor)?;
        self.core.region().metrics().unlock.increment(1);
        if updated {
            self.core.region().metrics().update.increment(1);
        }
        Ok(updated)
    }

    fn lock_item(&self, key: &K, version: Option<&Ver>) -> Result<Option<SoftLock>> {
        let lock = self.core.next_soft_lock();
        tracing::debug!("[read-write]: lock {:?} with {:?}", key, lock);
        let value_if_absent = CacheValue::placeholder(version.cloned(), self.core.region().next_timestamp());
        self.core
            .region()
            .invoke(key, SoftLockProcessor::new(lock, value_if_absent))?;
        self.core.region().metrics().lock.increment(1);
        Ok(Some(lock))
    }

    fn unlock_item(&self, key: &K, lock: Option<SoftLock>) -> Result<()> {
        let Some(lock) = lock else {
            return Ok(());
        };
        tracing::debug!("[read-write]: unlock {:?} with {:?}", key, lock);
        let release_time = self.core.region().next_timestamp();
        self.core
            .region()
            .invoke(key, SoftUnlockProcessor::new(lock, release_time))?;
        self.core.region().metrics().unlock.increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use strata_common::{clock::ManualClock, code::natural_order, error::Error};

    use super::*;
    use crate::{
        access::Access,
        region::{Region, RegionBuilder},
    };

    type TestAccess = Access<u64, String, u64, strata_memory::MemoryStore<u64, CacheValue<String, u64>>>;

    fn region_for_test(clock: Arc<ManualClock>) -> Region<u64, String, u64> {
        RegionBuilder::new("entities")
            .with_lock_lease_duration(Duration::from_millis(1000))
            .with_minimal_puts(false)
            .with_clock(clock)
            .build()
            .unwrap()
    }

    fn access_for_test(region: &Region<u64, String, u64>) -> TestAccess {
        region
            .access_with_comparator(AccessType::ReadWrite, Arc::new(natural_order::<u64>))
            .unwrap()
    }

    #[test_log::test]
    fn test_lock_masks_and_blocks_loads() {
        let clock = Arc::new(ManualClock::new(100));
        let region = region_for_test(clock.clone());
        let access = access_for_test(&region);

        assert!(access.put_from_load(1, "a".to_string(), 100, Some(1)).unwrap());
        assert_eq!(access.get(&1, 100).unwrap(), Some("a".to_string()));

        let lock = access.lock_item(&1, Some(&1)).unwrap().unwrap();
        assert_eq!(lock.expiration_time(), 1100);
        assert_eq!(lock.acquirer_id(), access.core().acquirer_id());
        assert_eq!(access.get(&1, 200).unwrap(), None);

        // A concurrent load of a newer version loses against the live lock.
        assert!(!access.put_from_load(1, "b".to_string(), 500, Some(2)).unwrap());
        assert_eq!(
            region.get_value(&1).unwrap().and_then(|v| v.into_value()),
            Some("a".to_string())
        );

        clock.set(600);
        assert!(access
            .after_update(1, "c".to_string(), Some(2), Some(1), Some(lock))
            .unwrap());
        assert_eq!(access.get(&1, 600).unwrap(), Some("c".to_string()));

        let value = region.get_value(&1).unwrap().unwrap();
        assert!(!value.is_soft_locked());
        assert_eq!(value.version(), Some(&2));
        assert_eq!(value.time_of_soft_lock_release(), 600);
    }

    #[test_log::test]
    fn test_lock_on_absent_key() {
        let clock = Arc::new(ManualClock::new(100));
        let region = region_for_test(clock.clone());
        let access = access_for_test(&region);

        let lock = access.lock_item(&1, None).unwrap().unwrap();
        let value = region.get_value(&1).unwrap().unwrap();
        assert!(value.is_soft_locked());
        assert_eq!(value.value(), None);

        assert_eq!(access.get(&1, 100).unwrap(), None);
        assert!(!access.put_from_load(1, "a".to_string(), 500, Some(1)).unwrap());

        clock.set(300);
        access.unlock_item(&1, Some(lock)).unwrap();
        assert!(!access.put_from_load(1, "a".to_string(), 300, Some(1)).unwrap());
        assert!(access.put_from_load(1, "a".to_string(), 301, Some(1)).unwrap());
        assert_eq!(access.get(&1, 400).unwrap(), Some("a".to_string()));
    }

    #[test_log::test]
    fn test_abandoned_lock_self_heals() {
        let clock = Arc::new(ManualClock::new(100));
        let region = region_for_test(clock.clone());
        let access = access_for_test(&region);

        access.after_insert(1, "a".to_string(), Some(1)).unwrap();
        let _abandoned = access.lock_item(&1, Some(&1)).unwrap().unwrap();

        clock.set(1100);
        assert!(!access.put_from_load(1, "b".to_string(), 1100, Some(2)).unwrap());

        clock.set(1101);
        let loaded = access
            .read_through(&1, 1101, || Ok::<_, Error>(Some(("b".to_string(), Some(2)))))
            .unwrap();
        assert_eq!(loaded, Some("b".to_string()));
        assert_eq!(access.get(&1, 1101).unwrap(), Some("b".to_string()));
    }

    #[test_log::test]
    fn test_concurrent_locks_last_release_wins() {
        let clock = Arc::new(ManualClock::new(100));
        let region = region_for_test(clock.clone());
        let a = access_for_test(&region);
        let b = access_for_test(&region);

        a.after_insert(1, "v1".to_string(), Some(1)).unwrap();
        let la = a.lock_item(&1, Some(&1)).unwrap().unwrap();
        let lb = b.lock_item(&1, Some(&1)).unwrap().unwrap();
        assert_ne!(la, lb);

        clock.set(200);
        assert!(!a.after_update(1, "v2".to_string(), Some(2), Some(1), Some(la)).unwrap());
        assert_eq!(a.get(&1, 200).unwrap(), None);

        clock.set(300);
        assert!(b.after_update(1, "v3".to_string(), Some(3), Some(1), Some(lb)).unwrap());
        assert_eq!(a.get(&1, 300).unwrap(), Some("v3".to_string()));
    }

    #[test_log::test]
    fn test_failed_write_only_unlocks() {
        let clock = Arc::new(ManualClock::new(100));
        let region = region_for_test(clock.clone());
        let access = access_for_test(&region);
        access.after_insert(1, "a".to_string(), Some(1)).unwrap();

        clock.set(200);
        let res: std::result::Result<(), Error> =
            access.update_through(1, "b".to_string(), Some(2), Some(1), || {
                Err(Error::new(strata_common::error::ErrorKind::External, "constraint violation"))
            });
        assert_eq!(res.unwrap_err().message(), "constraint violation");

        let value = region.get_value(&1).unwrap().unwrap();
        assert!(!value.is_soft_locked());
        assert_eq!(value.value(), Some(&"a".to_string()));
        assert_eq!(value.time_of_soft_lock_release(), 200);
        assert_eq!(access.get(&1, 200).unwrap(), Some("a".to_string()));

        let res: std::result::Result<(), Error> = access.update_through(1, "b".to_string(), Some(2), Some(1), || Ok(()));
        res.unwrap();
        assert_eq!(access.get(&1, 200).unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_after_insert_does_not_overwrite() {
        let region = region_for_test(Arc::new(ManualClock::new(100)));
        let access = access_for_test(&region);
        assert!(access.after_insert(1, "a".to_string(), Some(1)).unwrap());
        assert!(!access.after_insert(1, "b".to_string(), Some(1)).unwrap());
        assert_eq!(access.get(&1, 100).unwrap(), Some("a".to_string()));
    }

    #[test_log::test]
    fn test_after_update_without_lock_evicts() {
        let region = region_for_test(Arc::new(ManualClock::new(100)));
        let access = access_for_test(&region);
        access.after_insert(1, "a".to_string(), Some(1)).unwrap();
        assert!(!access.after_update(1, "b".to_string(), Some(2), Some(1), None).unwrap());
        assert!(!region.contains(&1).unwrap());
        assert_eq!(access.get(&1, 100).unwrap(), None);

        let loaded = access
            .read_through(&1, 100, || Ok::<_, Error>(Some(("b".to_string(), Some(2)))))
            .unwrap();
        assert_eq!(loaded, Some("b".to_string()));
        assert_eq!(access.get(&1, 100).unwrap(), Some("b".to_string()));
    }

    #[test_log::test]
    fn test_abandoned_lock_heals_with_minimal_puts() {
        let clock = Arc::new(ManualClock::new(100));
        let region: Region<u64, String, u64> = RegionBuilder::new("entities")
            .with_lock_lease_duration(Duration::from_millis(1000))
            .with_clock(clock.clone())
            .build()
            .unwrap();
        assert!(region.is_minimal_puts_enabled());
        let access = access_for_test(&region);

        access.after_insert(1, "a".to_string(), Some(1)).unwrap();
        let _abandoned = access.lock_item(&1, Some(&1)).unwrap().unwrap();

        // Explicit loads keep honoring minimal puts.
        clock.set(5000);
        assert!(!access.put_from_load(1, "b".to_string(), 5000, Some(2)).unwrap());
        assert!(region.get_value(&1).unwrap().unwrap().is_soft_locked());

        let loaded = access
            .read_through(&1, 5000, || Ok::<_, Error>(Some(("b".to_string(), Some(2)))))
            .unwrap();
        assert_eq!(loaded, Some("b".to_string()));
        assert!(!region.get_value(&1).unwrap().unwrap().is_soft_locked());
        assert_eq!(access.get(&1, 5000).unwrap(), Some("b".to_string()));
    }
}
