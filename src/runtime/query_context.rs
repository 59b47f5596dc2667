// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Query-scoped evaluation state.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::config;
use crate::exec::window::{CacheStats, PartitionCache};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct QueryId(pub u64);

impl QueryId {
    fn next() -> Self {
        QueryId(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query_{:x}", self.0)
    }
}

/// Per-query execution knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    /// Minimum number of partitions before evaluation fans out to the worker pool.
    pub parallel_partition_threshold: usize,
    /// Minimum number of rows before evaluation fans out to the worker pool.
    pub parallel_min_rows: usize,
    pub honor_sorted_hint: bool,
    pub cache_partitions: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            parallel_partition_threshold: 64,
            parallel_min_rows: 4096,
            honor_sorted_hint: true,
            cache_partitions: true,
        }
    }
}

impl QueryOptions {
    pub fn from_config() -> Self {
        Self {
            parallel_partition_threshold: config::parallel_partition_threshold(),
            parallel_min_rows: config::parallel_min_rows(),
            honor_sorted_hint: config::honor_sorted_hint(),
            cache_partitions: config::partition_cache_enabled(),
        }
    }

    pub(crate) fn should_parallelize(&self, partitions: usize, rows: usize) -> bool {
        partitions > 1
            && partitions >= self.parallel_partition_threshold
            && rows >= self.parallel_min_rows
    }
}

/// State living for exactly one query evaluation. Owns the partition cache, so dropping the
/// context discards every partition index built for the query.
#[derive(Debug)]
pub struct QueryContext {
    query_id: QueryId,
    options: QueryOptions,
    partition_cache: PartitionCache,
}

impl QueryContext {
    pub fn new(options: QueryOptions) -> Self {
        Self {
            query_id: QueryId::next(),
            options,
            partition_cache: PartitionCache::new(),
        }
    }

    pub fn from_config() -> Self {
        Self::new(QueryOptions::from_config())
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn partition_cache(&self) -> &PartitionCache {
        &self.partition_cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.partition_cache.stats()
    }
}
