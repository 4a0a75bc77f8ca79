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

//! Access strategies: the client side of the soft-lock protocol.
//!
//! An access strategy sequences the mutations of [`crate::processor`] according to the read, insert and update
//! lifecycle of its caller. Every strategy instance owns a random acquirer id and a lock sequence counter, so the
//! soft locks it mints are unique across processes without any coordination.

mod nonstrict;
mod read_only;
mod read_write;

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use strata_common::{
    code::{Key, Value, Version, VersionComparator},
    error::{Error, ErrorKind, Result},
    store::Store,
};
use uuid::Uuid;

pub use self::{nonstrict::NonstrictReadWriteAccess, read_only::ReadOnlyAccess, read_write::ReadWriteAccess};
use crate::{
    region::Region,
    value::{CacheValue, SoftLock},
};

/// Cache concurrency strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    /// Cached data is never updated.
    ReadOnly,
    /// Updates evict the cached data. Loads never check for concurrent writers.
    NonstrictReadWrite,
    /// Updates soft-lock the cached data so that concurrent loads cannot install stale values.
    ReadWrite,
    /// Full transactional consistency. Not supported.
    Transactional,
}

impl AccessType {
    /// The external name of the access type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::ReadOnly => "read-only",
            AccessType::NonstrictReadWrite => "nonstrict-read-write",
            AccessType::ReadWrite => "read-write",
            AccessType::Transactional => "transactional",
        }
    }
}

impl Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read-only" => Ok(AccessType::ReadOnly),
            "nonstrict-read-write" => Ok(AccessType::NonstrictReadWrite),
            "read-write" => Ok(AccessType::ReadWrite),
            "transactional" => Ok(AccessType::Transactional),
            _ => Err(Error::new(ErrorKind::Parse, "unknown access type").with_context("access_type", s)),
        }
    }
}

/// State shared by every access strategy: the region, the version comparator and the soft lock identity.
pub struct AccessCore<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    region: Region<K, V, Ver, S>,
    comparator: Option<Arc<dyn VersionComparator<Ver>>>,
    acquirer_id: Uuid,
    sequence: AtomicI64,
}

impl<K, V, Ver, S> Debug for AccessCore<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCore")
            .field("region", &self.region)
            .field("comparator", &self.comparator.is_some())
            .field("acquirer_id", &self.acquirer_id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl<K, V, Ver, S> AccessCore<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    fn new(region: Region<K, V, Ver, S>, comparator: Option<Arc<dyn VersionComparator<Ver>>>) -> Self {
        Self {
            region,
            comparator,
            acquirer_id: Uuid::new_v4(),
            sequence: AtomicI64::new(0),
        }
    }

    /// The region the strategy works on.
    pub fn region(&self) -> &Region<K, V, Ver, S> {
        &self.region
    }

    /// The version comparator, if any.
    pub fn comparator(&self) -> Option<&Arc<dyn VersionComparator<Ver>>> {
        self.comparator.as_ref()
    }

    /// The id stamped on every soft lock minted by the strategy.
    pub fn acquirer_id(&self) -> Uuid {
        self.acquirer_id
    }

    /// Wrap a payload into a cache value written now.
    pub(crate) fn new_cache_value(&self, value: V, version: Option<Ver>) -> CacheValue<V, Ver> {
        CacheValue::new(value, version, self.region.next_timestamp())
    }

    /// Mint a soft lock expiring one lease from now.
    pub(crate) fn next_soft_lock(&self) -> SoftLock {
        let sequence_number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        SoftLock::new(
            self.acquirer_id,
            sequence_number,
            self.region.new_soft_lock_expiration_time(),
        )
    }

    pub(crate) fn record_get(&self, value: Option<V>) -> Option<V> {
        match value {
            Some(_) => self.region.metrics().hit.increment(1),
            None => self.region.metrics().miss.increment(1),
        }
        value
    }

    pub(crate) fn record_put(&self, written: bool) -> bool {
        match written {
            true => self.region.metrics().put.increment(1),
            false => self.region.metrics().put_skip.increment(1),
        }
        written
    }
}

/// The calling contract of an access strategy.
///
/// Readers call [`AccessStrategy::get`], and on a miss [`AccessStrategy::put_from_load`] with the value loaded from
/// the data source. Inserts call [`AccessStrategy::insert`] then [`AccessStrategy::after_insert`] once the insert is
/// committed. Updates call [`AccessStrategy::lock_item`] before the data source write, then
/// [`AccessStrategy::after_update`] once it is committed, or [`AccessStrategy::unlock_item`] if it failed.
///
/// [`AccessStrategy::read_through`] and [`AccessStrategy::update_through`] drive these sequences for the caller.
pub trait AccessStrategy: Send + Sync + 'static {
    /// Key type.
    type Key: Key;
    /// Payload type.
    type Value: Value;
    /// Version type.
    type Version: Version;
    /// Store type of the region.
    type Store: Store<Key = Self::Key, Value = CacheValue<Self::Value, Self::Version>>;

    /// The state shared by all strategies.
    fn core(&self) -> &AccessCore<Self::Key, Self::Value, Self::Version, Self::Store>;

    /// The type of the strategy.
    fn access_type(&self) -> AccessType;

    /// Get the cached payload for a transaction started at `tx_timestamp`.
    fn get(&self, key: &Self::Key, tx_timestamp: i64) -> Result<Option<Self::Value>>;

    /// Install a value loaded from the data source, honoring the minimal puts setting of the region.
    ///
    /// Returns `false` if the value was not installed, which only means that another operation won the race.
    fn put_from_load(
        &self,
        key: Self::Key,
        value: Self::Value,
        tx_timestamp: i64,
        version: Option<Self::Version>,
    ) -> Result<bool> {
        let minimal_puts = self.core().region().is_minimal_puts_enabled();
        self.put_from_load_with_override(key, value, tx_timestamp, version, minimal_puts)
    }

    /// Install a value loaded from the data source with an explicit minimal puts setting.
    fn put_from_load_with_override(
        &self,
        key: Self::Key,
        value: Self::Value,
        tx_timestamp: i64,
        version: Option<Self::Version>,
        minimal_puts: bool,
    ) -> Result<bool>;

    /// Called when a value is inserted into the data source, before the insert is committed.
    ///
    /// No strategy populates the cache here.
    fn insert(&self, key: &Self::Key, _value: &Self::Value, _version: Option<&Self::Version>) -> Result<bool> {
        tracing::debug!("[access]: insert {:?}", key);
        Ok(false)
    }

    /// Called after an insert into the data source is committed. Returns `true` if the cache was modified.
    fn after_insert(&self, key: Self::Key, value: Self::Value, version: Option<Self::Version>) -> Result<bool>;

    /// Called when a value is updated in the data source, before the update is committed.
    fn update(
        &self,
        key: &Self::Key,
        value: &Self::Value,
        current_version: Option<&Self::Version>,
        previous_version: Option<&Self::Version>,
    ) -> Result<bool>;

    /// Called after an update of the data source is committed. Releases `lock` if the strategy took one.
    fn after_update(
        &self,
        key: Self::Key,
        value: Self::Value,
        current_version: Option<Self::Version>,
        previous_version: Option<Self::Version>,
        lock: Option<SoftLock>,
    ) -> Result<bool>;

    /// Soft-lock the item before its update in the data source.
    ///
    /// Returns `None` if the strategy does not lock items.
    fn lock_item(&self, key: &Self::Key, version: Option<&Self::Version>) -> Result<Option<SoftLock>>;

    /// Release a soft lock without installing a new value, e.g. after a failed update.
    fn unlock_item(&self, key: &Self::Key, lock: Option<SoftLock>) -> Result<()>;

    /// Try to take the region-wide lock.
    fn lock_region(&self) -> Result<bool> {
        self.core().region().lock_cache()
    }

    /// Release the region-wide lock.
    fn unlock_region(&self) -> Result<()> {
        self.core().region().unlock_cache()
    }

    /// Remove the item after its deletion from the data source.
    fn remove(&self, key: &Self::Key) -> Result<()> {
        self.evict(key)
    }

    /// Remove all items.
    fn remove_all(&self) -> Result<()> {
        self.evict_all()
    }

    /// Evict the item, whatever its soft lock state.
    fn evict(&self, key: &Self::Key) -> Result<()> {
        self.core().region().evict(key)
    }

    /// Evict all items.
    fn evict_all(&self) -> Result<()> {
        self.core().region().evict_all()
    }

    /// Returns `true` if the item is cached.
    fn contains(&self, key: &Self::Key) -> Result<bool> {
        self.core().region().contains(key)
    }

    /// Read the item, loading it from the data source on a miss.
    ///
    /// `load` returns the payload and version of the item, or `None` if the data source does not hold it. The loaded
    /// value is installed regardless of the minimal puts setting, which lets it replace a soft lock past its lease.
    /// Cache failures are logged and treated as misses. Errors of `load` are returned as is.
    fn read_through<F, E>(
        &self,
        key: &Self::Key,
        tx_timestamp: i64,
        load: F,
    ) -> std::result::Result<Option<Self::Value>, E>
    where
        Self: Sized,
        F: FnOnce() -> std::result::Result<Option<(Self::Value, Option<Self::Version>)>, E>,
    {
        match self.get(key, tx_timestamp) {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) => tracing::warn!("[access]: get {:?} failed, fall back to data source: {}", key, e),
        }

        let Some((value, version)) = load()? else {
            return Ok(None);
        };

        // Misses are absent or soft-locked items, which minimal puts must not skip.
        match self.put_from_load_with_override(key.clone(), value.clone(), tx_timestamp, version, false) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("[access]: load of {:?} not installed, lost the race", key),
            Err(e) => tracing::warn!("[access]: put from load {:?} failed: {}", key, e),
        }

        Ok(Some(value))
    }

    /// Update the item, writing it to the data source with `write`.
    ///
    /// The item is soft-locked for the duration of `write`. Once `write` succeeds the new value is installed, and
    /// if it fails the lock is released without installing anything. If the item could not be locked, the cached
    /// value is evicted once `write` succeeds. Cache failures are logged and otherwise ignored; the lock lease bounds
    /// how long a lost release masks the item. Strategies that reject updates fail before `write` is called.
    fn update_through<F, T, E>(
        &self,
        key: Self::Key,
        value: Self::Value,
        current_version: Option<Self::Version>,
        previous_version: Option<Self::Version>,
        write: F,
    ) -> std::result::Result<T, E>
    where
        Self: Sized,
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let lock = match self.lock_item(&key, previous_version.as_ref()) {
            Ok(lock) => lock,
            Err(e) if e.is_storage_unavailable() => {
                tracing::warn!("[access]: lock {:?} failed, update unlocked: {}", key, e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.update(&key, &value, current_version.as_ref(), previous_version.as_ref()) {
            if let Err(err) = self.unlock_item(&key, lock) {
                tracing::warn!("[access]: unlock {:?} failed: {}", key, err);
            }
            return Err(e.into());
        }

        match write() {
            Ok(output) => {
                if let Err(e) = self.after_update(key.clone(), value, current_version, previous_version, lock) {
                    tracing::warn!("[access]: after update {:?} failed: {}", key, e);
                }
                Ok(output)
            }
            Err(err) => {
                if let Err(e) = self.unlock_item(&key, lock) {
                    tracing::warn!("[access]: unlock {:?} failed: {}", key, e);
                }
                Err(err)
            }
        }
    }
}

/// An access strategy of any supported type.
pub enum Access<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    /// Read-only strategy.
    ReadOnly(ReadOnlyAccess<K, V, Ver, S>),
    /// Nonstrict read-write strategy.
    NonstrictReadWrite(NonstrictReadWriteAccess<K, V, Ver, S>),
    /// Read-write strategy.
    ReadWrite(ReadWriteAccess<K, V, Ver, S>),
}

impl<K, V, Ver, S> Debug for Access<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Access")
            .field("access_type", &self.access_type())
            .field("core", self.core())
            .finish()
    }
}

impl<K, V, Ver, S> Access<K, V, Ver, S>
where
    K: Key,
    V: Value,
    Ver: Version,
    S: Store<Key = K, Value = CacheValue<V, Ver>>,
{
    pub(crate) fn new(
        access_type: AccessType,
        region: Region<K, V, Ver, S>,
        comparator: Option<Arc<dyn VersionComparator<Ver>>>,
    ) -> Result<Self> {
        let access = match access_type {
            AccessType::ReadOnly => Access::ReadOnly(ReadOnlyAccess::new(AccessCore::new(region, comparator))),
            AccessType::NonstrictReadWrite => {
                Access::NonstrictReadWrite(NonstrictReadWriteAccess::new(AccessCore::new(region, comparator)))
            }
            AccessType::ReadWrite => Access::ReadWrite(ReadWriteAccess::new(AccessCore::new(region, comparator))),
            AccessType::Transactional => {
                tracing::error!("[access]: {}", Error::TRANSACTIONAL_STRATEGY_NOT_SUPPORTED);
                return Err(Error::unsupported_strategy().with_context("region", region.name()));
            }
        };
        tracing::debug!(
            "[access]: create {} access {} on region {}",
            access_type,
            access.core().acquirer_id(),
            access.core().region().name()
        );
        Ok(access)
    }
}

macro_rules! dispatch {
    ($self:ident, $access:ident => $expr:expr) => {
        match $self {
            Access::ReadOnly($access) => $expr,
            Access::NonstrictReadWrite($access) => $expr,
            Access::ReadWrite($access) => $expr,
        }
    };
}

impl<K, V, Ver, S> AccessStrategy for Access<K, V, Ver, S>
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
        dispatch!(self, access => access.core())
    }

    fn access_type(&self) -> AccessType {
        dispatch!(self, access => access.access_type())
    }

    fn get(&self, key: &K, tx_timestamp: i64) -> Result<Option<V>> {
        dispatch!(self, access => access.get(key, tx_timestamp))
    }

    fn put_from_load_with_override(
        &self,
        key: K,
        value: V,
        tx_timestamp: i64,
        version: Option<Ver>,
        minimal_puts: bool,
    ) -> Result<bool> {
        dispatch!(self, access => access.put_from_load_with_override(key, value, tx_timestamp, version, minimal_puts))
    }

    fn insert(&self, key: &K, value: &V, version: Option<&Ver>) -> Result<bool> {
        dispatch!(self, access => access.insert(key, value, version))
    }

    fn after_insert(&self, key: K, value: V, version: Option<Ver>) -> Result<bool> {
        dispatch!(self, access => access.after_insert(key, value, version))
    }

    fn update(&self, key: &K, value: &V, current_version: Option<&Ver>, previous_version: Option<&Ver>) -> Result<bool> {
        dispatch!(self, access => access.update(key, value, current_version, previous_version))
    }

    fn after_update(
        &self,
        key: K,
        value: V,
        current_version: Option<Ver>,
        previous_version: Option<Ver>,
        lock: Option<SoftLock>,
    ) -> Result<bool> {
        dispatch!(self, access => access.after_update(key, value, current_version, previous_version, lock))
    }

    fn lock_item(&self, key: &K, version: Option<&Ver>) -> Result<Option<SoftLock>> {
        dispatch!(self, access => access.lock_item(key, version))
    }

    fn unlock_item(&self, key: &K, lock: Option<SoftLock>) -> Result<()> {
        dispatch!(self, access => access.unlock_item(key, lock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionBuilder;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Access<u64, String, u64, strata_memory::MemoryStore<u64, CacheValue<String, u64>>>>();
    }

    #[test]
    fn test_access_type_names() {
        for access_type in [
            AccessType::ReadOnly,
            AccessType::NonstrictReadWrite,
            AccessType::ReadWrite,
            AccessType::Transactional,
        ] {
            assert_eq!(access_type.to_string().parse::<AccessType>().unwrap(), access_type);
        }
        assert_eq!(" Read-Write ".parse::<AccessType>().unwrap(), AccessType::ReadWrite);
        assert_eq!("eventual".parse::<AccessType>().unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test_log::test]
    fn test_transactional_rejected() {
        let region = RegionBuilder::new("entities").build::<u64, String, u64>().unwrap();
        let err = region.access(AccessType::Transactional).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.message(), "The transactional cache concurrency strategy is not supported.");
    }

    #[test]
    fn test_soft_lock_identity_is_unique() {
        let region = RegionBuilder::new("entities").build::<u64, String, u64>().unwrap();
        let a = region.access(AccessType::ReadWrite).unwrap();
        let b = region.access(AccessType::ReadWrite).unwrap();
        assert_ne!(a.core().acquirer_id(), b.core().acquirer_id());

        let l1 = a.core().next_soft_lock();
        let l2 = a.core().next_soft_lock();
        assert_eq!(l1.sequence_number(), 1);
        assert_eq!(l2.sequence_number(), 2);
        assert_ne!(l1, l2);
        assert_eq!(l1.acquirer_id(), a.core().acquirer_id());
    }
}
