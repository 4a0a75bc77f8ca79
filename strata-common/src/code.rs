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

use std::{cmp::Ordering, fmt::Debug, hash::Hash};

/// Key trait for the cache regions.
pub trait Key: Send + Sync + 'static + Hash + Eq + Clone + Debug {}
impl<T: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug> Key for T {}

/// Value trait for the cached payloads.
pub trait Value: Send + Sync + 'static + Clone + Debug {}
impl<T: Send + Sync + 'static + Clone + Debug> Value for T {}

/// Application-level version trait, used for optimistic comparison of cached values.
pub trait Version: Send + Sync + 'static + Clone + Debug {}
impl<T: Send + Sync + 'static + Clone + Debug> Version for T {}

/// The version comparator for the cache regions.
///
/// The comparator orders two application-level versions. A value loaded from the data source may only replace an
/// unlocked, versioned cache value if the cached version compares strictly less than the loaded version.
pub trait VersionComparator<T>: Fn(&T, &T) -> Ordering + Send + Sync + 'static {}
impl<T, F> VersionComparator<T> for F where F: Fn(&T, &T) -> Ordering + Send + Sync + 'static {}

/// The version comparator that follows the natural order of the version type.
pub fn natural_order<T: Ord>(a: &T, b: &T) -> Ordering {
    a.cmp(b)
}
