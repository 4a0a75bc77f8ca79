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

use std::{collections::HashMap, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

/// The prefix of the names of all strata properties.
pub const PROPERTY_NAME_PREFIX: &str = "strata.cache.";

/// The name of the property specifying the soft lock lease duration.
pub const LOCK_LEASE_DURATION_PROPERTY_NAME: &str = "strata.cache.lock_lease_duration";

/// The name of the property specifying whether minimal puts are in effect by default.
pub const MINIMAL_PUTS_PROPERTY_NAME: &str = "strata.cache.minimal_puts";

/// The name of the property specifying the shard count of in-memory stores.
pub const SHARDS_PROPERTY_NAME: &str = "strata.cache.shards";

/// The default soft lock lease duration.
pub const DEFAULT_LOCK_LEASE_DURATION: Duration = Duration::from_secs(60);

/// The maximum soft lock lease duration. Longer durations are capped.
pub const MAX_LOCK_LEASE_DURATION: Duration = Duration::from_millis(i32::MAX as u64);

/// The default shard count of in-memory stores.
pub const DEFAULT_SHARDS: usize = 16;

/// Failure to parse a region property.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// The property is not a duration.
    #[error("invalid duration for {name}: {value:?}")]
    Duration {
        /// Property name.
        name: &'static str,
        /// Provided value.
        value: String,
        /// Parse failure.
        #[source]
        source: humantime::DurationError,
    },
    /// The property is not a boolean.
    #[error("invalid boolean for {name}: {value:?}")]
    Bool {
        /// Property name.
        name: &'static str,
        /// Provided value.
        value: String,
        /// Parse failure.
        #[source]
        source: std::str::ParseBoolError,
    },
    /// The property is not an unsigned integer.
    #[error("invalid integer for {name}: {value:?}")]
    Integer {
        /// Property name.
        name: &'static str,
        /// Provided value.
        value: String,
        /// Parse failure.
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Configurations of a cache region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// The maximum time a soft lock may remain outstanding before it is treated as abandoned.
    ///
    /// Default: 60s.
    pub lock_lease_duration: Duration,
    /// Whether loads from the data source skip writing keys that are already cached.
    ///
    /// Default: `true`.
    pub minimal_puts: bool,
    /// Shard count of in-memory stores.
    ///
    /// Default: 16.
    pub shards: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            lock_lease_duration: DEFAULT_LOCK_LEASE_DURATION,
            minimal_puts: true,
            shards: DEFAULT_SHARDS,
        }
    }
}

impl RegionConfig {
    /// Build the region config from string properties.
    ///
    /// Properties that are missing keep their defaults. Properties that cannot be parsed are reported with an error
    /// log and keep their defaults as well, so a typo never prevents the cache from starting.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = properties.get(LOCK_LEASE_DURATION_PROPERTY_NAME) {
            match parse_duration(LOCK_LEASE_DURATION_PROPERTY_NAME, value) {
                Ok(duration) => config.lock_lease_duration = duration,
                Err(e) => tracing::error!(
                    "[config]: {e}; using default of {} milliseconds",
                    DEFAULT_LOCK_LEASE_DURATION.as_millis()
                ),
            }
        }
        if config.lock_lease_duration > MAX_LOCK_LEASE_DURATION {
            tracing::debug!(
                "[config]: capping {LOCK_LEASE_DURATION_PROPERTY_NAME} at {} milliseconds",
                MAX_LOCK_LEASE_DURATION.as_millis()
            );
            config.lock_lease_duration = MAX_LOCK_LEASE_DURATION;
        }

        if let Some(value) = properties.get(MINIMAL_PUTS_PROPERTY_NAME) {
            match parse::<bool>(value) {
                Ok(minimal_puts) => config.minimal_puts = minimal_puts,
                Err(source) => tracing::error!(
                    "[config]: {}; using default of {}",
                    PropertyError::Bool {
                        name: MINIMAL_PUTS_PROPERTY_NAME,
                        value: value.clone(),
                        source
                    },
                    config.minimal_puts
                ),
            }
        }

        if let Some(value) = properties.get(SHARDS_PROPERTY_NAME) {
            match parse::<usize>(value) {
                Ok(shards) if shards > 0 => config.shards = shards,
                Ok(_) => tracing::error!("[config]: {SHARDS_PROPERTY_NAME} must be positive; using default of {DEFAULT_SHARDS}"),
                Err(source) => tracing::error!(
                    "[config]: {}; using default of {DEFAULT_SHARDS}",
                    PropertyError::Integer {
                        name: SHARDS_PROPERTY_NAME,
                        value: value.clone(),
                        source
                    }
                ),
            }
        }

        config
    }
}

fn parse<T: FromStr>(value: &str) -> std::result::Result<T, T::Err> {
    value.trim().parse::<T>()
}

/// Parse a duration property.
///
/// A bare integer is read as milliseconds, anything else as a human readable duration such as `30s` or `1m 30s`.
pub fn parse_duration(name: &'static str, value: &str) -> std::result::Result<Duration, PropertyError> {
    let trimmed = value.trim();
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed).map_err(|source| PropertyError::Duration {
        name,
        value: value.to_string(),
        source,
    })
}
