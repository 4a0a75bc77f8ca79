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

//! Shared components for strata.

/// Allow enable debug assertions in release profile with feature "strict_assertion".
pub mod assert;
/// Logical clocks used to timestamp cache values and soft locks.
pub mod clock;
/// Trait bundles for keys, values and versions.
pub mod code;
/// Region configuration and property parsing.
pub mod config;
/// The error type shared by all strata crates.
pub mod error;
/// The key/value store contract the soft-lock protocol runs on.
pub mod store;
