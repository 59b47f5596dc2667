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
//! Query-scoped partition cache with build-once semantics per key identity.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use hashbrown::HashMap;

use super::partition::PartitionIndex;
use crate::overwin_logging::debug;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderIdentity {
    pub exprs: Vec<String>,
    pub descending: bool,
    pub nulls_last: bool,
}

/// Identity of a partitioning: the frame, canonical key expressions, the build path and the
/// ordering.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PartitionCacheKey {
    pub frame: u64,
    pub keys: Vec<String>,
    pub sorted: bool,
    pub order: Option<OrderIdentity>,
}

impl PartitionCacheKey {
    pub fn unordered(&self) -> Self {
        Self {
            frame: self.frame,
            keys: self.keys.clone(),
            sorted: self.sorted,
            order: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub builds: usize,
}

type Slot = Arc<OnceLock<Result<Arc<PartitionIndex>, String>>>;

#[derive(Debug, Default)]
pub struct PartitionCache {
    entries: Mutex<HashMap<PartitionCacheKey, Slot>>,
    hits: AtomicUsize,
    builds: AtomicUsize,
}

impl PartitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `key`, building it with `build` on first access.
    ///
    /// The map lock only guards slot lookup; concurrent first accesses to one key block on the
    /// slot until the single build finishes. The flag is true on a cache hit.
    pub fn get_or_build<F>(
        &self,
        key: PartitionCacheKey,
        build: F,
    ) -> Result<(Arc<PartitionIndex>, bool), String>
    where
        F: FnOnce() -> Result<PartitionIndex, String>,
    {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        let mut built = false;
        let result = slot.get_or_init(|| {
            built = true;
            self.builds.fetch_add(1, Ordering::Relaxed);
            build().map(Arc::new)
        });
        if built {
            debug!(keys = ?key.keys, sorted = key.sorted, ordered = key.order.is_some(), "partition cache build");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(keys = ?key.keys, "partition cache hit");
        }
        result.clone().map(|index| (index, !built))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn key(name: &str) -> PartitionCacheKey {
        PartitionCacheKey {
            frame: 1,
            keys: vec![name.to_string()],
            sorted: false,
            order: None,
        }
    }

    #[test]
    fn second_lookup_hits() {
        let cache = PartitionCache::new();
        let (first, hit) = cache
            .get_or_build(key("a"), || PartitionIndex::single(3))
            .unwrap();
        assert!(!hit);
        let (second, hit) = cache
            .get_or_build(key("a"), || Err("must not rebuild".to_string()))
            .unwrap();
        assert!(hit);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                builds: 1
            }
        );
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let cache = Arc::new(PartitionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_build(key("k"), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            PartitionIndex::single(10)
                        })
                        .map(|(index, _)| index)
                })
            })
            .collect();
        let indices: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(indices.iter().all(|i| Arc::ptr_eq(i, &indices[0])));
        assert_eq!(cache.stats().hits, 7);
    }

    #[test]
    fn distinct_identities_do_not_share() {
        let cache = PartitionCache::new();
        cache.get_or_build(key("a"), || PartitionIndex::single(1)).unwrap();
        let mut sorted = key("a");
        sorted.sorted = true;
        let (_, hit) = cache.get_or_build(sorted, || PartitionIndex::single(1)).unwrap();
        assert!(!hit);
        assert_eq!(cache.len(), 2);
    }
}
