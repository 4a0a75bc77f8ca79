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

use std::fmt::Debug;

use metrics::{counter, Counter};

/// Per-region operation counters, exported as `strata_region_op_total{name, op}`.
#[derive(Clone)]
pub struct Metrics {
    pub hit: Counter,
    pub miss: Counter,
    pub put: Counter,
    pub put_skip: Counter,
    pub lock: Counter,
    pub unlock: Counter,
    pub insert: Counter,
    pub update: Counter,
    pub evict: Counter,
}

impl Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

impl Metrics {
    pub fn new(name: &str) -> Self {
        let hit = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "hit");
        let miss = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "miss");
        let put = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "put");
        let put_skip = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "put_skip");
        let lock = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "lock");
        let unlock = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "unlock");
        let insert = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "insert");
        let update = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "update");
        let evict = counter!("strata_region_op_total", "name" => name.to_string(), "op" => "evict");

        Self {
            hit,
            miss,
            put,
            put_skip,
            lock,
            unlock,
            insert,
            update,
            evict,
        }
    }
}
