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
//! Projects per-partition results onto output rows.
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ListArray, UInt32Array, new_empty_array};
use arrow::buffer::OffsetBuffer;
use arrow::compute::{concat, take};
use arrow::datatypes::{DataType, Field};

use super::MappingStrategy;
use super::partition::PartitionIndex;
use crate::exec::expr::ExprValue;
use crate::exec::expr::cast::cast_array;

pub(crate) fn join_type(element: &DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", element.clone(), true)))
}

/// Output type of a window whose sub-expression yields `element`.
pub(crate) fn output_type(mapping: MappingStrategy, element: &DataType) -> DataType {
    match mapping {
        MappingStrategy::Join => join_type(element),
        MappingStrategy::GroupToRows | MappingStrategy::Explode => element.clone(),
    }
}

fn flatten(arrays: &[ArrayRef], element: &DataType) -> Result<ArrayRef, String> {
    if arrays.is_empty() {
        return Ok(new_empty_array(element));
    }
    let refs: Vec<&dyn Array> = arrays.iter().map(|a| a.as_ref()).collect();
    concat(&refs).map_err(|e| format!("concat partition results: {}", e))
}

/// Maps validated partition results (in enumeration order) onto the output column.
pub(crate) fn map_results(
    results: Vec<ExprValue>,
    index: &PartitionIndex,
    mapping: MappingStrategy,
    element: &DataType,
) -> Result<ArrayRef, String> {
    let mut arrays = Vec::with_capacity(results.len());
    for value in results {
        arrays.push(cast_array(&value.into_array(), element)?);
    }
    match mapping {
        MappingStrategy::GroupToRows => group_to_rows(&arrays, index, element),
        MappingStrategy::Join => join(&arrays, index, element),
        MappingStrategy::Explode => flatten(&arrays, element),
    }
}

// Length-1 results broadcast to the whole group; full-length results scatter in partition order.
fn group_to_rows(
    arrays: &[ArrayRef],
    index: &PartitionIndex,
    element: &DataType,
) -> Result<ArrayRef, String> {
    let flat = flatten(arrays, element)?;
    let mut take_idx = vec![0u32; index.num_rows()];
    let mut base = 0usize;
    for (p, array) in arrays.iter().enumerate() {
        let broadcast = array.len() == 1;
        for (k, &row) in index.partition(p).iter().enumerate() {
            let at = if broadcast { base } else { base + k };
            take_idx[row as usize] = u32::try_from(at)
                .map_err(|_| "window output exceeds UInt32 index range".to_string())?;
        }
        base += array.len();
    }
    take(flat.as_ref(), &UInt32Array::from(take_idx), None)
        .map_err(|e| format!("scatter partition results: {}", e))
}

// One list per partition, repeated on each of its rows.
fn join(
    arrays: &[ArrayRef],
    index: &PartitionIndex,
    element: &DataType,
) -> Result<ArrayRef, String> {
    let values = flatten(arrays, element)?;
    let offsets = OffsetBuffer::from_lengths(arrays.iter().map(|a| a.len()));
    let field = Arc::new(Field::new("item", element.clone(), true));
    let lists = ListArray::try_new(field, offsets, values, None)
        .map_err(|e| format!("build join lists: {}", e))?;
    let rows = UInt32Array::from(index.row_partition().to_vec());
    take(&lists, &rows, None).map_err(|e| format!("broadcast join lists: {}", e))
}
