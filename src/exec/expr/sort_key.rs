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
//! Order-preserving row encodings shared by sorting, ranking and min/max.
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::SortOptions;
use arrow::datatypes::DataType;
use arrow::row::{RowConverter, Rows, SortField};

fn encodable(array: &ArrayRef) -> ArrayRef {
    // Null columns encode as all-null booleans: every row compares equal.
    if matches!(array.data_type(), DataType::Null) {
        let nulls: Vec<Option<bool>> = vec![None; array.len()];
        return Arc::new(BooleanArray::from(nulls));
    }
    Arc::clone(array)
}

/// Encodes `arrays` column-wise into comparable rows.
pub fn encode_rows(arrays: &[ArrayRef], options: SortOptions) -> Result<Rows, String> {
    if arrays.is_empty() {
        return Err("row encoding requires at least one column".to_string());
    }
    let arrays: Vec<ArrayRef> = arrays.iter().map(encodable).collect();
    let fields = arrays
        .iter()
        .map(|a| SortField::new_with_options(a.data_type().clone(), options))
        .collect::<Vec<_>>();
    let converter = RowConverter::new(fields).map_err(|e| format!("row encoding: {}", e))?;
    converter
        .convert_columns(&arrays)
        .map_err(|e| format!("row encoding: {}", e))
}

pub fn sort_options(descending: bool, nulls_last: bool) -> SortOptions {
    SortOptions {
        descending,
        nulls_first: !nulls_last,
    }
}

/// Stable sort permutation of `0..len` by `arrays`.
pub fn sort_indices(
    arrays: &[ArrayRef],
    len: usize,
    options: SortOptions,
) -> Result<Vec<u32>, String> {
    let mut indices: Vec<u32> = (0..len as u32).collect();
    if arrays.is_empty() || len < 2 {
        return Ok(indices);
    }
    let rows = encode_rows(arrays, options)?;
    indices.sort_by(|&a, &b| rows.row(a as usize).cmp(&rows.row(b as usize)));
    Ok(indices)
}
