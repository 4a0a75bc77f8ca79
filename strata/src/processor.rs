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

//! The single-key mutations of the soft-lock protocol.
//!
//! Each processor is executed by [`Store::invoke`](strata_common::store::Store::invoke) under the exclusivity of the
//! key it targets. None of them blocks: a lost race is reported as `false` or `None`, never as an error.

use std::{fmt::Debug, sync::Arc};

use strata_common::{
    code::{Value, Version, VersionComparator},
    store::{Entry, Processor},
};

use crate::value::{CacheValue, SoftLock};

/// Read the payload of an unlocked value.
///
/// A soft-locked value reads as a miss so the reader falls back to the data source.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetProcessor;

impl<V, Ver> Processor<CacheValue<V, Ver>> for GetProcessor
where
    V: Value,
    Ver: Version,
{
    type Output = Option<V>;

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) -> Option<V> {
        let value = entry.value()?;
        if value.is_soft_locked() {
            return None;
        }
        value.value().cloned()
    }
}

/// Install a value loaded from the data source without checking replaceability.
///
/// With minimal puts in effect a present value is left untouched.
#[derive(Debug, Clone)]
pub struct PutFromLoadProcessor<V, Ver> {
    minimal_puts: bool,
    replacement: CacheValue<V, Ver>,
}

impl<V, Ver> PutFromLoadProcessor<V, Ver> {
    /// Create the processor.
    pub fn new(minimal_puts: bool, replacement: CacheValue<V, Ver>) -> Self {
        Self {
            minimal_puts,
            replacement,
        }
    }
}

impl<V, Ver> Processor<CacheValue<V, Ver>> for PutFromLoadProcessor<V, Ver>
where
    V: Value,
    Ver: Version,
{
    type Output = bool;

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) -> bool {
        if self.minimal_puts && entry.is_present() {
            return false;
        }
        entry.set_value(self.replacement);
        true
    }
}

/// Install a value loaded from the data source if the present value is replaceable from load.
pub struct ReadWritePutFromLoadProcessor<V, Ver> {
    minimal_puts: bool,
    tx_timestamp: i64,
    replacement: CacheValue<V, Ver>,
    comparator: Option<Arc<dyn VersionComparator<Ver>>>,
}

impl<V, Ver> Debug for ReadWritePutFromLoadProcessor<V, Ver>
where
    V: Debug,
    Ver: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWritePutFromLoadProcessor")
            .field("minimal_puts", &self.minimal_puts)
            .field("tx_timestamp", &self.tx_timestamp)
            .field("replacement", &self.replacement)
            .field("comparator", &self.comparator.is_some())
            .finish()
    }
}

impl<V, Ver> ReadWritePutFromLoadProcessor<V, Ver> {
    /// Create the processor.
    ///
    /// `tx_timestamp` is the start time of the transaction that loaded `replacement`.
    pub fn new(
        minimal_puts: bool,
        tx_timestamp: i64,
        replacement: CacheValue<V, Ver>,
        comparator: Option<Arc<dyn VersionComparator<Ver>>>,
    ) -> Self {
        Self {
            minimal_puts,
            tx_timestamp,
            replacement,
            comparator,
        }
    }
}

impl<V, Ver> Processor<CacheValue<V, Ver>> for ReadWritePutFromLoadProcessor<V, Ver>
where
    V: Value,
    Ver: Version,
{
    type Output = bool;

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) -> bool {
        if let Some(present) = entry.value() {
            if self.minimal_puts {
                return false;
            }
            if !present.is_replaceable_from_load(
                self.tx_timestamp,
                self.replacement.version(),
                self.comparator.as_deref(),
            ) {
                return false;
            }
        }
        entry.set_value(self.replacement);
        true
    }
}

/// Add a soft lock to the value, creating `value_if_absent` first if the key is absent.
#[derive(Debug, Clone)]
pub struct SoftLockProcessor<V, Ver> {
    lock: SoftLock,
    value_if_absent: CacheValue<V, Ver>,
}

impl<V, Ver> SoftLockProcessor<V, Ver> {
    /// Create the processor.
    pub fn new(lock: SoftLock, value_if_absent: CacheValue<V, Ver>) -> Self {
        Self { lock, value_if_absent }
    }
}

impl<V, Ver> Processor<CacheValue<V, Ver>> for SoftLockProcessor<V, Ver>
where
    V: Value,
    Ver: Version,
{
    type Output = ();

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) {
        let mut value = entry.take().unwrap_or(self.value_if_absent);
        value.add_soft_lock(self.lock);
        entry.set_value(value);
    }
}

/// Release a soft lock. An absent key is left absent.
#[derive(Debug, Clone, Copy)]
pub struct SoftUnlockProcessor {
    lock: SoftLock,
    release_time: i64,
}

impl SoftUnlockProcessor {
    /// Create the processor.
    pub fn new(lock: SoftLock, release_time: i64) -> Self {
        Self { lock, release_time }
    }
}

impl<V, Ver> Processor<CacheValue<V, Ver>> for SoftUnlockProcessor
where
    V: Value,
    Ver: Version,
{
    type Output = ();

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) {
        if let Some(mut value) = entry.take() {
            value.release_soft_lock(&self.lock, self.release_time);
            entry.set_value(value);
        }
    }
}

/// Insert a newly created value if the key is absent.
#[derive(Debug, Clone)]
pub struct AfterInsertProcessor<V, Ver> {
    replacement: CacheValue<V, Ver>,
}

impl<V, Ver> AfterInsertProcessor<V, Ver> {
    /// Create the processor.
    pub fn new(replacement: CacheValue<V, Ver>) -> Self {
        Self { replacement }
    }
}

impl<V, Ver> Processor<CacheValue<V, Ver>> for AfterInsertProcessor<V, Ver>
where
    V: Value,
    Ver: Version,
{
    type Output = bool;

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) -> bool {
        if entry.is_present() {
            return false;
        }
        entry.set_value(self.replacement);
        true
    }
}

/// Release the soft lock taken for an update and install the updated value.
///
/// If other writers still hold locks on the value only the release is committed, since the value written last
/// cannot be told apart from the others. The key stays masked until the last lock is released and the next load
/// refreshes it.
#[derive(Debug, Clone)]
pub struct AfterUpdateProcessor<V, Ver> {
    replacement: CacheValue<V, Ver>,
    lock: SoftLock,
    release_time: i64,
}

impl<V, Ver> AfterUpdateProcessor<V, Ver> {
    /// Create the processor.
    pub fn new(replacement: CacheValue<V, Ver>, lock: SoftLock, release_time: i64) -> Self {
        Self {
            replacement,
            lock,
            release_time,
        }
    }
}

impl<V, Ver> Processor<CacheValue<V, Ver>> for AfterUpdateProcessor<V, Ver>
where
    V: Value,
    Ver: Version,
{
    type Output = bool;

    fn process(self, entry: &mut Entry<CacheValue<V, Ver>>) -> bool {
        let Some(mut present) = entry.take() else {
            // Evicted while locked. Leave it to the next load.
            return false;
        };
        present.release_soft_lock(&self.lock, self.release_time);
        if present.is_soft_locked() {
            entry.set_value(present);
            return false;
        }
        let mut replacement = self.replacement;
        replacement.set_time_of_soft_lock_release(present.time_of_soft_lock_release());
        entry.set_value(replacement);
        true
    }
}

#[cfg(test)]
mod tests {
    use strata_common::code::natural_order;
    use uuid::Uuid;

    use super::*;

    type Value = CacheValue<&'static str, u64>;

    fn run<P: Processor<Value>>(slot: &mut Option<Value>, processor: P) -> P::Output {
        let mut entry = Entry::new(slot.take());
        let output = processor.process(&mut entry);
        *slot = entry.into_value();
        output
    }

    fn cmp() -> Option<Arc<dyn VersionComparator<u64>>> {
        Some(Arc::new(natural_order::<u64>))
    }

    #[test]
    fn test_get() {
        let mut slot = None;
        assert_eq!(run(&mut slot, GetProcessor), None);

        slot = Some(CacheValue::new("a", Some(1), 10));
        assert_eq!(run(&mut slot, GetProcessor), Some("a"));

        slot = Some(CacheValue::placeholder(Some(1), 10));
        assert_eq!(run(&mut slot, GetProcessor), None);
        assert!(slot.is_some());
    }

    #[test]
    fn test_put_from_load_minimal_puts() {
        let mut slot = None;
        assert!(run(&mut slot, PutFromLoadProcessor::new(true, CacheValue::new("a", Some(1), 10))));
        assert_eq!(slot.as_ref().and_then(|v| v.value().copied()), Some("a"));

        assert!(!run(&mut slot, PutFromLoadProcessor::new(true, CacheValue::new("b", Some(2), 20))));
        assert_eq!(slot.as_ref().and_then(|v| v.value().copied()), Some("a"));

        assert!(run(&mut slot, PutFromLoadProcessor::new(false, CacheValue::new("b", Some(2), 20))));
        assert_eq!(slot.as_ref().and_then(|v| v.value().copied()), Some("b"));
    }

    #[test]
    fn test_read_write_put_from_load() {
        let mut slot = None;
        assert!(run(
            &mut slot,
            ReadWritePutFromLoadProcessor::new(true, 10, CacheValue::new("a", Some(1), 10), cmp())
        ));

        // Present with minimal puts.
        assert!(!run(
            &mut slot,
            ReadWritePutFromLoadProcessor::new(true, 20, CacheValue::new("b", Some(2), 20), cmp())
        ));
        // Not newer.
        assert!(!run(
            &mut slot,
            ReadWritePutFromLoadProcessor::new(false, 20, CacheValue::new("b", Some(1), 20), cmp())
        ));
        assert_eq!(slot.as_ref().and_then(|v| v.value().copied()), Some("a"));
        // Newer.
        assert!(run(
            &mut slot,
            ReadWritePutFromLoadProcessor::new(false, 20, CacheValue::new("b", Some(2), 20), cmp())
        ));
        assert_eq!(slot.as_ref().and_then(|v| v.value().copied()), Some("b"));
    }

    #[test]
    fn test_soft_lock_on_absent_key() {
        let mut slot = None;
        let lock = SoftLock::new(Uuid::new_v4(), 1, 1000);
        run(&mut slot, SoftLockProcessor::new(lock, CacheValue::placeholder(Some(3), 10)));

        let value = slot.as_ref().unwrap();
        assert!(value.is_soft_locked());
        assert_eq!(value.value(), None);
        assert_eq!(value.version(), Some(&3));
        assert_eq!(value.time_of_soft_lock_expiration(), 1000);
    }

    #[test]
    fn test_soft_unlock_on_absent_key() {
        let mut slot: Option<Value> = None;
        run(
            &mut slot,
            SoftUnlockProcessor::new(SoftLock::new(Uuid::new_v4(), 1, 1000), 600),
        );
        assert!(slot.is_none());
    }

    #[test]
    fn test_after_insert() {
        let mut slot = None;
        assert!(run(&mut slot, AfterInsertProcessor::new(CacheValue::new("a", Some(1), 10))));
        assert!(!run(&mut slot, AfterInsertProcessor::new(CacheValue::new("b", Some(2), 20))));
        assert_eq!(slot.as_ref().and_then(|v| v.value().copied()), Some("a"));
    }

    #[test]
    fn test_after_update() {
        let acquirer = Uuid::new_v4();
        let l1 = SoftLock::new(acquirer, 1, 1000);
        let l2 = SoftLock::new(acquirer, 2, 1100);

        let mut slot = Some(CacheValue::new("a", Some(1), 10));
        run(&mut slot, SoftLockProcessor::new(l1, CacheValue::placeholder(Some(1), 10)));
        run(&mut slot, SoftLockProcessor::new(l2, CacheValue::placeholder(Some(1), 10)));

        // Concurrently locked: only the release is committed.
        assert!(!run(
            &mut slot,
            AfterUpdateProcessor::new(CacheValue::new("b", Some(2), 500), l1, 500)
        ));
        let value = slot.as_ref().unwrap();
        assert_eq!(value.value(), Some(&"a"));
        assert_eq!(value.soft_locks(), &[l2]);

        assert!(run(
            &mut slot,
            AfterUpdateProcessor::new(CacheValue::new("c", Some(3), 600), l2, 600)
        ));
        let value = slot.as_ref().unwrap();
        assert!(!value.is_soft_locked());
        assert_eq!(value.value(), Some(&"c"));
        assert_eq!(value.version(), Some(&3));
        assert_eq!(value.time_of_soft_lock_release(), 600);

        let mut slot = None;
        assert!(!run(
            &mut slot,
            AfterUpdateProcessor::new(CacheValue::new("d", Some(4), 700), l1, 700)
        ));
        assert!(slot.is_none());
    }

    #[test]
    fn test_literal_scenario() {
        let mut slot: Option<Value> = None;

        assert!(run(&mut slot, PutFromLoadProcessor::new(false, CacheValue::new("A", Some(1), 100))));

        let lock = SoftLock::new(Uuid::new_v4(), 1, 1100);
        run(&mut slot, SoftLockProcessor::new(lock, CacheValue::placeholder(None, 100)));
        assert!(slot.as_ref().unwrap().is_soft_locked());

        assert_eq!(run(&mut slot, GetProcessor), None);

        assert!(!run(
            &mut slot,
            ReadWritePutFromLoadProcessor::new(false, 500, CacheValue::new("B", None, 500), cmp())
        ));
        assert_eq!(slot.as_ref().unwrap().value(), Some(&"A"));

        run(&mut slot, SoftUnlockProcessor::new(lock, 600));
        let value = slot.as_ref().unwrap();
        assert!(!value.is_soft_locked());
        assert_eq!(value.time_of_soft_lock_release(), 600);

        assert_eq!(run(&mut slot, GetProcessor), Some("A"));
    }
}
