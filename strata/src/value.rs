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
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};
use strata_common::{code::VersionComparator, strict_assert};
use uuid::Uuid;

/// A claim on a cache value by a writer whose transaction is in progress.
///
/// The identity of a soft lock is its acquirer and sequence number. The expiration time takes no part in it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SoftLock {
    acquirer_id: Uuid,
    sequence_number: i64,
    expiration_time: i64,
}

impl SoftLock {
    /// Create a soft lock.
    pub fn new(acquirer_id: Uuid, sequence_number: i64, expiration_time: i64) -> Self {
        Self {
            acquirer_id,
            sequence_number,
            expiration_time,
        }
    }

    /// Id of the access strategy instance that acquired the lock.
    pub fn acquirer_id(&self) -> Uuid {
        self.acquirer_id
    }

    /// Sequence number of the lock among the locks of its acquirer.
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    /// Time in milliseconds after which the lock is considered abandoned.
    pub fn expiration_time(&self) -> i64 {
        self.expiration_time
    }
}

impl PartialEq for SoftLock {
    fn eq(&self, other: &Self) -> bool {
        self.acquirer_id == other.acquirer_id && self.sequence_number == other.sequence_number
    }
}

impl Eq for SoftLock {}

impl Hash for SoftLock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.acquirer_id.hash(state);
        self.sequence_number.hash(state);
    }
}

/// The versioned, soft-lock aware value stored under each key of a region.
///
/// Equality and hashing only consider the payload, the version and the timestamp. The soft lock state is coordination
/// metadata and never part of the identity of a cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheValue<V, Ver> {
    value: Option<V>,
    version: Option<Ver>,
    timestamp: i64,
    soft_locks: Vec<SoftLock>,
    time_of_soft_lock_expiration: i64,
    time_of_soft_lock_release: i64,
}

impl<V, Ver> CacheValue<V, Ver> {
    /// Create an unlocked cache value.
    pub fn new(value: V, version: Option<Ver>, timestamp: i64) -> Self {
        Self::with_value(Some(value), version, timestamp)
    }

    /// Create the payload-less value that stands in for an absent key while it is soft-locked.
    pub fn placeholder(version: Option<Ver>, timestamp: i64) -> Self {
        Self::with_value(None, version, timestamp)
    }

    fn with_value(value: Option<V>, version: Option<Ver>, timestamp: i64) -> Self {
        Self {
            value,
            version,
            timestamp,
            soft_locks: vec![],
            time_of_soft_lock_expiration: 0,
            time_of_soft_lock_release: 0,
        }
    }

    /// The cached payload. `None` for a placeholder.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Consume the cache value and return its payload.
    pub fn into_value(self) -> Option<V> {
        self.value
    }

    /// The application-level version of the payload.
    pub fn version(&self) -> Option<&Ver> {
        self.version.as_ref()
    }

    /// The logical write time of the payload in milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Outstanding soft locks in acquisition order.
    pub fn soft_locks(&self) -> &[SoftLock] {
        &self.soft_locks
    }

    /// Returns `true` if any soft lock is outstanding.
    pub fn is_soft_locked(&self) -> bool {
        !self.soft_locks.is_empty()
    }

    /// Expiration time of the most recently added soft lock.
    pub fn time_of_soft_lock_expiration(&self) -> i64 {
        self.time_of_soft_lock_expiration
    }

    /// Time the last outstanding soft lock was released, or 0 if the value has never been unlocked.
    pub fn time_of_soft_lock_release(&self) -> i64 {
        self.time_of_soft_lock_release
    }

    /// Add a soft lock.
    ///
    /// The expiration time of the value is overwritten with the expiration time of the new lock. With a constant lease
    /// duration locks are added in expiration order, so the last lock added expires last.
    pub fn add_soft_lock(&mut self, lock: SoftLock) {
        self.soft_locks.push(lock);
        self.time_of_soft_lock_expiration = lock.expiration_time;
    }

    /// Release a soft lock.
    ///
    /// Releasing a lock that is not held is a no-op, so duplicate or late releases are harmless. When the last
    /// outstanding lock is released the release time is recorded.
    pub fn release_soft_lock(&mut self, lock: &SoftLock, release_time: i64) {
        let Some(index) = self.soft_locks.iter().position(|l| l == lock) else {
            return;
        };
        self.soft_locks.remove(index);
        if self.soft_locks.is_empty() {
            self.time_of_soft_lock_release = release_time;
        }
        strict_assert!(self.soft_locks.iter().all(|l| l != lock));
    }

    pub(crate) fn set_time_of_soft_lock_release(&mut self, release_time: i64) {
        strict_assert!(!self.is_soft_locked());
        self.time_of_soft_lock_release = release_time;
    }

    /// Returns `true` if a value loaded from the data source by a transaction started at `tx_timestamp` may replace
    /// this value.
    ///
    /// * A locked value is replaceable only once every outstanding lock has expired.
    /// * An unlocked value without version is replaceable by loads started after the last release.
    /// * An unlocked versioned value is replaceable only if its version is strictly older than `replacement_version`.
    ///   Without a comparator or a replacement version the versions cannot be ordered and the release time decides.
    pub fn is_replaceable_from_load(
        &self,
        tx_timestamp: i64,
        replacement_version: Option<&Ver>,
        comparator: Option<&dyn VersionComparator<Ver>>,
    ) -> bool {
        if self.is_soft_locked() {
            return tx_timestamp > self.time_of_soft_lock_expiration;
        }
        match (self.version.as_ref(), replacement_version, comparator) {
            (Some(version), Some(replacement), Some(cmp)) => cmp(version, replacement) == Ordering::Less,
            _ => tx_timestamp > self.time_of_soft_lock_release,
        }
    }
}

impl<V: PartialEq, Ver: PartialEq> PartialEq for CacheValue<V, Ver> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.version == other.version && self.timestamp == other.timestamp
    }
}

impl<V: Eq, Ver: Eq> Eq for CacheValue<V, Ver> {}

impl<V: Hash, Ver: Hash> Hash for CacheValue<V, Ver> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.version.hash(state);
        self.timestamp.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use strata_common::code::natural_order;

    use super::*;

    fn lock(seq: i64, expiration: i64) -> SoftLock {
        SoftLock::new(Uuid::nil(), seq, expiration)
    }

    fn cmp() -> Arc<dyn VersionComparator<u64>> {
        Arc::new(natural_order::<u64>)
    }

    #[test]
    fn test_soft_lock_identity() {
        let acquirer = Uuid::new_v4();
        let a = SoftLock::new(acquirer, 1, 100);
        let b = SoftLock::new(acquirer, 1, 200);
        let c = SoftLock::new(acquirer, 2, 100);
        let d = SoftLock::new(Uuid::new_v4(), 1, 100);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<_> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_never_locked_versionless_is_replaceable() {
        let value = CacheValue::<&str, u64>::new("a", None, 10);
        for t in [1, 2, 100, i64::MAX] {
            assert!(value.is_replaceable_from_load(t, None, None));
            assert!(value.is_replaceable_from_load(t, Some(&1), Some(cmp().as_ref())));
        }
    }

    #[test]
    fn test_locked_is_replaceable_only_after_expiration() {
        for version in [None, Some(1u64), Some(u64::MAX)] {
            let mut value = CacheValue::new("a", version, 10);
            value.add_soft_lock(lock(1, 1100));
            for (t, expected) in [(500, false), (1100, false), (1101, true)] {
                assert_eq!(value.is_replaceable_from_load(t, Some(&0), Some(cmp().as_ref())), expected);
                assert_eq!(value.is_replaceable_from_load(t, Some(&9), None), expected);
            }
        }
    }

    #[test]
    fn test_versioned_needs_strictly_older_version() {
        let value = CacheValue::new("a", Some(5u64), 10);
        let cmp = cmp();
        assert!(value.is_replaceable_from_load(1, Some(&6), Some(cmp.as_ref())));
        assert!(!value.is_replaceable_from_load(i64::MAX, Some(&5), Some(cmp.as_ref())));
        assert!(!value.is_replaceable_from_load(i64::MAX, Some(&4), Some(cmp.as_ref())));
    }

    #[test]
    fn test_versioned_without_comparator_uses_release_time() {
        let mut value = CacheValue::new("a", Some(5u64), 10);
        value.add_soft_lock(lock(1, 1000));
        value.release_soft_lock(&lock(1, 1000), 600);

        assert!(!value.is_replaceable_from_load(600, Some(&6), None));
        assert!(value.is_replaceable_from_load(601, Some(&6), None));
        assert!(!value.is_replaceable_from_load(600, None, Some(cmp().as_ref())));
        assert!(value.is_replaceable_from_load(601, None, Some(cmp().as_ref())));
    }

    #[test]
    fn test_versionless_after_release() {
        let mut value = CacheValue::<&str, u64>::new("a", None, 10);
        value.add_soft_lock(lock(1, 1100));
        value.release_soft_lock(&lock(1, 1100), 600);
        assert!(!value.is_replaceable_from_load(599, None, None));
        assert!(!value.is_replaceable_from_load(600, None, None));
        assert!(value.is_replaceable_from_load(601, None, None));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut value = CacheValue::new("a", Some(1u64), 10);
        value.add_soft_lock(lock(1, 1000));

        value.release_soft_lock(&lock(1, 1000), 600);
        assert!(!value.is_soft_locked());
        assert_eq!(value.time_of_soft_lock_release(), 600);

        value.release_soft_lock(&lock(1, 1000), 700);
        assert!(!value.is_soft_locked());
        assert_eq!(value.time_of_soft_lock_release(), 600);

        // Never added.
        value.add_soft_lock(lock(2, 2000));
        value.release_soft_lock(&lock(3, 2000), 800);
        assert_eq!(value.soft_locks(), &[lock(2, 2000)]);
        assert_eq!(value.time_of_soft_lock_release(), 600);
        assert_eq!(value.time_of_soft_lock_expiration(), 2000);
    }

    #[test]
    fn test_last_release_ends_locked_period() {
        let mut value = CacheValue::new("a", Some(1u64), 10);
        let l1 = SoftLock::new(Uuid::new_v4(), 1, 1000);
        let l2 = SoftLock::new(Uuid::new_v4(), 1, 1200);

        value.add_soft_lock(l1);
        value.add_soft_lock(l2);
        assert!(value.is_soft_locked());
        assert_eq!(value.time_of_soft_lock_expiration(), 1200);

        value.release_soft_lock(&l1, 500);
        assert!(value.is_soft_locked());
        assert_eq!(value.time_of_soft_lock_release(), 0);

        value.release_soft_lock(&l2, 700);
        assert!(!value.is_soft_locked());
        assert_eq!(value.time_of_soft_lock_release(), 700);
    }

    #[test]
    fn test_expiration_is_overwritten_not_maxed() {
        let mut value = CacheValue::new("a", Some(1u64), 10);
        value.add_soft_lock(lock(1, 5000));
        value.add_soft_lock(lock(2, 1000));
        assert_eq!(value.time_of_soft_lock_expiration(), 1000);
        assert!(value.is_replaceable_from_load(1001, Some(&0), Some(cmp().as_ref())));
    }

    #[test]
    fn test_equality_ignores_lock_state() {
        let a = CacheValue::new("a", Some(1u64), 10);
        let mut b = CacheValue::new("a", Some(1u64), 10);
        b.add_soft_lock(lock(1, 1000));
        assert_eq!(a, b);

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);

        assert_ne!(a, CacheValue::new("a", Some(2u64), 10));
        assert_ne!(a, CacheValue::new("a", Some(1u64), 11));
        assert_ne!(a, CacheValue::new("b", Some(1u64), 10));
    }

    #[test]
    fn test_serde_keeps_lock_state() {
        let mut value = CacheValue::new("a".to_string(), Some(3u64), 10);
        let l = SoftLock::new(Uuid::new_v4(), 7, 1000);
        value.add_soft_lock(l);

        let json = serde_json::to_string(&value).unwrap();
        let decoded: CacheValue<String, u64> = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, value);
        assert_eq!(decoded.soft_locks(), &[l]);
        assert_eq!(decoded.soft_locks()[0].expiration_time(), 1000);
        assert_eq!(decoded.time_of_soft_lock_expiration(), 1000);
    }
}
