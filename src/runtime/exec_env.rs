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
//! Shared worker pool for partition evaluation.
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::common::config::window_threads;
use crate::overwin_logging::{info, warn};

const WINDOW_POOL_THREAD_NAME: &str = "overwin-window";
static WINDOW_POOL: OnceLock<Result<Arc<ThreadPool>, String>> = OnceLock::new();

pub fn window_pool() -> Result<&'static Arc<ThreadPool>, String> {
    match WINDOW_POOL.get_or_init(|| {
        let threads = window_threads().max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("{}-{}", WINDOW_POOL_THREAD_NAME, idx))
            .build()
            .map_err(|e| format!("init window thread pool failed: {e}"))?;
        info!(
            threads,
            thread_name = WINDOW_POOL_THREAD_NAME,
            "window thread pool initialized"
        );
        Ok(Arc::new(pool))
    }) {
        Ok(pool) => Ok(pool),
        Err(err) => Err(err.clone()),
    }
}

/// Runs `op` inside the window pool; falls back to the global rayon pool when it is unavailable.
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match window_pool() {
        Ok(pool) => pool.install(op),
        Err(err) => {
            warn!(error = %err, "window thread pool unavailable, using global pool");
            op()
        }
    }
}
