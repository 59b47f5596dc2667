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
use crate::overwin_config::config as overwin_app_config;

pub(crate) fn window_threads() -> usize {
    overwin_app_config()
        .ok()
        .map(|c| c.runtime.actual_window_threads())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}

pub(crate) fn parallel_partition_threshold() -> usize {
    overwin_app_config()
        .ok()
        .map(|c| c.runtime.parallel_partition_threshold)
        .unwrap_or(64)
}

pub(crate) fn parallel_min_rows() -> usize {
    overwin_app_config()
        .ok()
        .map(|c| c.runtime.parallel_min_rows)
        .unwrap_or(4096)
}

pub(crate) fn honor_sorted_hint() -> bool {
    overwin_app_config()
        .ok()
        .map(|c| c.window.honor_sorted_hint)
        .unwrap_or(true)
}

pub(crate) fn partition_cache_enabled() -> bool {
    overwin_app_config()
        .ok()
        .map(|c| c.window.partition_cache)
        .unwrap_or(true)
}
