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
//! Partition key materialization.
use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;

use super::PartitionKey;
use crate::exec::chunk::Frame;
use crate::exec::expr::{ExprArena, ExprValue};

/// Evaluates the partition keys into row-aligned columns.
///
/// Scalar keys (literals, aggregates) and `Null`-typed keys are constant across rows and are
/// dropped; an empty result means every row belongs to one partition.
pub(crate) fn materialize_keys(
    arena: &ExprArena,
    frame: &Frame,
    keys: &[PartitionKey],
) -> Result<Vec<ArrayRef>, String> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let mut columns: Vec<String> = Vec::new();
    for key in keys {
        for name in arena.referenced_columns(key.expr) {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    let chunk = frame.project_contiguous(&columns)?;
    let rows = frame.num_rows();

    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let value = arena
            .eval(key.expr, &chunk)
            .map_err(|e| format!("key `{}`: {}", arena.display(key.expr), e))?;
        let ExprValue::Column(array) = value else {
            continue;
        };
        if array.len() != rows {
            return Err(format!(
                "key `{}` produced {} values for {} rows",
                arena.display(key.expr),
                array.len(),
                rows
            ));
        }
        if matches!(array.data_type(), DataType::Null) {
            continue;
        }
        out.push(array);
    }
    Ok(out)
}
