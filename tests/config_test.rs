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
#[macro_use]
mod common;

use common::*;
use overwin::exec::expr::AggFunction;
use overwin::overwin_config::OverwinConfig;
use overwin::{ExprArena, NamedExpr, QueryOptions, select};

#[test]
fn test_config_file_drives_query_options() {
    let test_config = TestConfig::new().expect("test config");
    test_config.init_logging();
    let cfg = assert_ok!(test_config.load_config());
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.runtime.actual_window_threads(), 2);
    assert_eq!(cfg.runtime.parallel_partition_threshold, 4);
    assert_eq!(cfg.runtime.parallel_min_rows, 16);

    let options = QueryOptions::from_config();
    assert_eq!(options.parallel_partition_threshold, 4);
    assert_eq!(options.parallel_min_rows, 16);
    assert!(options.honor_sorted_hint);
    assert!(options.cache_partitions);

    // `select` builds its own context from the loaded config and fans out over partitions.
    let frame = frame(vec![
        ("k", int_col((0..64).map(|i| Some(i % 8)).collect())),
        ("v", int_col((0..64).map(Some).collect())),
    ]);
    let mut arena = ExprArena::new();
    let k = arena.col("k");
    let v = arena.col("v");
    let max = arena.agg(AggFunction::Max, v);
    let over = arena.over(max, &[k]);
    let out = assert_ok!(select(&frame, &arena, &[NamedExpr::new("max", over)]));
    let expected: Vec<Option<i64>> = (0..64).map(|i| Some(56 + i % 8)).collect();
    assert_eq!(ints(out.column(0)), expected);
}

#[test]
fn test_partial_document_keeps_defaults() {
    let cfg = assert_ok!(OverwinConfig::parse(
        r#"
[window]
partition_cache = false
"#
    ));
    assert_eq!(cfg.effective_log_filter(), "info");
    assert_eq!(cfg.runtime.parallel_partition_threshold, 64);
    assert!(cfg.window.honor_sorted_hint);
    assert!(!cfg.window.partition_cache);
}

#[test]
fn test_invalid_document_is_rejected() {
    let err = assert_err!(OverwinConfig::parse("[runtime]\nparallel_min_rows = \"many\""));
    assert!(!err.to_string().is_empty());

    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let err = assert_err!(OverwinConfig::load_from_file(&missing));
    assert!(err.to_string().contains("absent.toml"), "err={err}");
}
