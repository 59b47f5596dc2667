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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, ListArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tempfile::TempDir;

use overwin::{Frame, QueryContext, QueryOptions, overwin_config, overwin_logging};

/// Test configuration for integration tests.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    /// Test config path
    pub config_path: PathBuf,
}

impl TestConfig {
    /// Create a new test configuration with default settings.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("overwin.toml");

        let config_content = r#"
log_level = "debug"

[runtime]
window_threads = 2
parallel_partition_threshold = 4
parallel_min_rows = 16

[window]
honor_sorted_hint = true
partition_cache = true
"#;

        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    /// Initialize logging for tests.
    pub fn init_logging(&self) {
        overwin_logging::init_with_level("debug");
    }

    /// Load the test configuration.
    pub fn load_config(&self) -> anyhow::Result<&'static overwin_config::OverwinConfig> {
        overwin_config::init_from_path(&self.config_path)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new().expect("Failed to create test config")
    }
}

/// Options that never fan out, so results do not depend on the pool.
pub fn sequential_options() -> QueryOptions {
    QueryOptions {
        parallel_partition_threshold: usize::MAX,
        parallel_min_rows: usize::MAX,
        ..QueryOptions::default()
    }
}

/// Options that fan out for every multi-partition evaluation.
pub fn parallel_options() -> QueryOptions {
    QueryOptions {
        parallel_partition_threshold: 2,
        parallel_min_rows: 0,
        ..QueryOptions::default()
    }
}

pub fn ctx() -> QueryContext {
    QueryContext::new(sequential_options())
}

pub fn schema_of(columns: &[(&str, ArrayRef)]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect::<Vec<_>>(),
    ))
}

/// Single-chunk frame from named columns.
pub fn frame(columns: Vec<(&str, ArrayRef)>) -> Frame {
    let schema = schema_of(&columns);
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        columns.into_iter().map(|(_, a)| a).collect(),
    )
    .expect("build batch");
    Frame::try_new(schema, vec![batch]).expect("build frame")
}

/// Same rows as `frame`, split into chunks starting at each of `splits`.
pub fn chunked_frame(columns: Vec<(&str, ArrayRef)>, splits: &[usize]) -> Frame {
    let schema = schema_of(&columns);
    let rows = columns.first().map(|(_, a)| a.len()).unwrap_or(0);
    let mut bounds = vec![0];
    bounds.extend(splits.iter().copied().filter(|&s| s > 0 && s < rows));
    bounds.push(rows);
    let batches = bounds
        .windows(2)
        .map(|w| {
            RecordBatch::try_new(
                Arc::clone(&schema),
                columns.iter().map(|(_, a)| a.slice(w[0], w[1] - w[0])).collect(),
            )
            .expect("build chunk")
        })
        .collect();
    Frame::try_new(schema, batches).expect("build frame")
}

pub fn int_col(values: Vec<Option<i64>>) -> ArrayRef {
    Arc::new(Int64Array::from(values))
}

pub fn ints(array: &ArrayRef) -> Vec<Option<i64>> {
    let array = cast(array, &DataType::Int64).expect("cast to Int64");
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("Int64Array")
        .iter()
        .collect()
}

pub fn floats(array: &ArrayRef) -> Vec<Option<f64>> {
    let array = cast(array, &DataType::Float64).expect("cast to Float64");
    array
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("Float64Array")
        .iter()
        .collect()
}

/// Integer lists of a `List` column; null lists map to `None`.
pub fn int_lists(array: &ArrayRef) -> Vec<Option<Vec<Option<i64>>>> {
    let list = array
        .as_any()
        .downcast_ref::<ListArray>()
        .expect("ListArray");
    (0..list.len())
        .map(|idx| {
            if list.is_null(idx) {
                None
            } else {
                Some(ints(&list.value(idx)))
            }
        })
        .collect()
}

pub fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("expected a non-null float");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Wait for a condition to become true, with timeout.
pub fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Run `f` and fail the test if it does not finish within `timeout`.
pub fn run_with_timeout<F, T>(timeout: Duration, f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    use std::sync::mpsc;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });

    match rx.recv_timeout(timeout) {
        Ok(v) => v,
        Err(_) => panic!("test timed out after {:?}", timeout),
    }
}

/// Assert that a result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}
