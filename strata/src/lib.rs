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

//! strata - soft-lock concurrency control for second-level caches.
//!
//! A second-level cache sits in front of a database and is shared by every transaction of every process. strata
//! decides, per key, whether a cached value may be served to a reader and whether a value freshly loaded from the
//! database may be installed, while other transactions read, update and reload the same row.
//!
//! Writers put a [`SoftLock`] on the cached value before they write to the database. Readers treat a soft-locked
//! value as a miss, and a load may only replace it once every lock has been released or has expired. All state
//! changes are single-key [`processor`]s executed by the store where the key lives, so no cross-key or cluster-wide
//! locking is involved.
//!
//! ```
//! use strata::prelude::*;
//!
//! let region: Region<u64, String, u64> = RegionBuilder::new("users").build().unwrap();
//! let access = region.access(AccessType::ReadWrite).unwrap();
//!
//! let tx = region.next_timestamp();
//! let user = access
//!     .read_through(&42, tx, || Ok::<_, Error>(Some(("alice".to_string(), Some(1)))))
//!     .unwrap();
//! assert_eq!(user.as_deref(), Some("alice"));
//! ```

mod access;
mod metrics;
/// Commonly used types of strata and its companion crates.
pub mod prelude;
pub mod processor;
mod region;
mod value;

pub use prelude::*;
