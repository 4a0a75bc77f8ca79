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

use crate::{
    code::{Key, Value},
    error::Result,
};

/// A view of a single store slot handed to a [`Processor`].
///
/// The entry starts as the value currently stored under the key, or absent. Whatever the entry holds when the
/// processor returns is committed back to the store: a present entry is stored, an absent entry removes the key.
#[derive(Debug)]
pub struct Entry<V> {
    value: Option<V>,
    dirty: bool,
}

impl<V> Entry<V> {
    /// Create an entry view from the current slot content.
    pub fn new(value: Option<V>) -> Self {
        Self { value, dirty: false }
    }

    /// Returns `true` if a value is present.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// The present value, if any.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Take the present value out of the entry, leaving it absent.
    pub fn take(&mut self) -> Option<V> {
        let value = self.value.take();
        self.dirty |= value.is_some();
        value
    }

    /// Set the value of the entry.
    pub fn set_value(&mut self, value: V) {
        self.value = Some(value);
        self.dirty = true;
    }

    /// Remove the value of the entry.
    pub fn remove(&mut self) {
        self.take();
    }

    /// Returns `true` if the processor has written to the entry.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consume the entry and return the content to commit.
    pub fn into_value(self) -> Option<V> {
        self.value
    }
}

/// A pure, single-key mutation shipped to the store and executed where the key lives.
///
/// The store guarantees that no two processors on the same key interleave, and that no processor observes a partially
/// applied mutation of another. A processor never blocks and never waits on other processors.
pub trait Processor<V>: Send {
    /// The result of the processor returned to the invoker.
    type Output: Send;

    /// Apply the mutation on the entry.
    fn process(self, entry: &mut Entry<V>) -> Self::Output;
}

/// The partitioned key/value store the soft-lock protocol runs on.
///
/// Every operation is fallible so that remote implementations can surface their failures. Failures are reported as
/// [`crate::error::ErrorKind::StorageUnavailable`] and are never retried by strata.
pub trait Store: Send + Sync + 'static {
    /// Key type.
    type Key: Key;
    /// Value type.
    type Value: Value;

    /// Name of the store.
    fn name(&self) -> &str;

    /// Execute the processor atomically on the slot of `key`.
    fn invoke<P>(&self, key: &Self::Key, processor: P) -> Result<P::Output>
    where
        P: Processor<Self::Value>;

    /// Get a copy of the value stored under `key`.
    fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Store `value` under `key` unconditionally.
    fn put(&self, key: Self::Key, value: Self::Value) -> Result<()>;

    /// Remove the value stored under `key`.
    fn remove(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Returns `true` if a value is stored under `key`.
    fn contains(&self, key: &Self::Key) -> Result<bool>;

    /// Count of stored values.
    fn len(&self) -> Result<usize>;

    /// Returns `true` if the store holds no values.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove all values.
    fn clear(&self) -> Result<()>;

    /// Try to take the store-wide lock without waiting.
    ///
    /// Returns `false` if the lock is already held. The store-wide lock is advisory: processors are not blocked by
    /// it.
    fn lock_all(&self) -> Result<bool>;

    /// Release the store-wide lock.
    fn unlock_all(&self) -> Result<()>;

    /// Release the resources of the store. All later operations fail.
    fn release(&self);

    /// Returns `true` if the store has been released.
    fn is_released(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Increment;

    impl Processor<u64> for Increment {
        type Output = u64;

        fn process(self, entry: &mut Entry<u64>) -> u64 {
            let next = entry.value().copied().unwrap_or_default() + 1;
            entry.set_value(next);
            next
        }
    }

    #[test]
    fn test_entry_commit_state() {
        let mut entry = Entry::new(None);
        assert!(!entry.is_present());
        assert_eq!(Increment.process(&mut entry), 1);
        assert!(entry.is_dirty());
        assert_eq!(entry.into_value(), Some(1));

        let mut entry = Entry::new(Some(7u64));
        assert!(!entry.is_dirty());
        entry.remove();
        assert!(entry.is_dirty());
        assert_eq!(entry.into_value(), None);
    }
}
