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

//! In-memory partitioned store for strata.
//!
//! [`MemoryStore`] hashes keys over a fixed set of shards, each guarded by its own lock. Processors submitted with
//! [`strata_common::store::Store::invoke`] run inside the lock of the shard owning the key, which gives every key
//! linearized, non-interleaved mutations while keys on different shards proceed in parallel.

mod store;

pub use store::{MemoryStore, MemoryStoreBuilder};
