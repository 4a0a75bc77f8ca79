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

pub use strata_common::{
    clock::{Clock, ManualClock, SystemClock},
    code::{natural_order, Key, Value, Version, VersionComparator},
    config::RegionConfig,
    error::{Error, ErrorKind, Result},
    store::{Entry, Processor, Store},
};
pub use strata_memory::{MemoryStore, MemoryStoreBuilder};

pub use crate::{
    access::{
        Access, AccessCore, AccessStrategy, AccessType, NonstrictReadWriteAccess, ReadOnlyAccess, ReadWriteAccess,
    },
    region::{Region, RegionBuilder},
    value::{CacheValue, SoftLock},
};
