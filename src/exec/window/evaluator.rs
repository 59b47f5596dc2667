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
//! Per-partition evaluation of the windowed sub-expression.
use arrow::datatypes::DataType;
use rayon::prelude::*;

use super::partition::PartitionIndex;
use crate::exec::chunk::{Chunk, Frame};
use crate::exec::expr::{ExprArena, ExprId, ExprValue};
use crate::overwin_logging::debug;
use crate::runtime::exec_env;
use crate::runtime::query_context::QueryOptions;

/// Referenced columns laid out in partition order, so each partition is a contiguous slice.
fn partition_ordered_input(
    arena: &ExprArena,
    frame: &Frame,
    function: ExprId,
    index: &PartitionIndex,
) -> Result<Chunk, String> {
    let columns = arena.referenced_columns(function);
    if index.is_contiguous() {
        frame.project_contiguous(&columns)
    } else {
        frame.gather(&columns, index.positions())
    }
}

/// Evaluates `function` once per partition, in enumeration order.
pub(crate) fn evaluate_partitions(
    arena: &ExprArena,
    frame: &Frame,
    function: ExprId,
    index: &PartitionIndex,
    options: &QueryOptions,
) -> Result<Vec<ExprValue>, String> {
    let input = partition_ordered_input(arena, frame, function, index)?;
    let offsets = index.offsets();
    let eval_one = |p: usize| -> Result<ExprValue, String> {
        let rows = input.slice(offsets[p], offsets[p + 1] - offsets[p]);
        arena.eval(function, &rows)
    };

    let partitions = index.num_partitions();
    if options.should_parallelize(partitions, index.num_rows()) {
        debug!(partitions, rows = index.num_rows(), "evaluating partitions in parallel");
        exec_env::install(|| {
            (0..partitions)
                .into_par_iter()
                .map(eval_one)
                .collect::<Result<Vec<_>, String>>()
        })
    } else {
        (0..partitions).map(eval_one).collect()
    }
}

/// Result type of `function` on zero rows, used to type empty outputs.
pub(crate) fn infer_empty_type(
    arena: &ExprArena,
    frame: &Frame,
    function: ExprId,
) -> Result<DataType, String> {
    let columns = arena.referenced_columns(function);
    let empty = frame.gather(&columns, &[])?;
    Ok(arena.eval(function, &empty)?.data_type().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::expr::AggFunction;
    use arrow::array::{Array, ArrayRef, Int64Array, RecordBatch};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn frame() -> Frame {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Int64, true),
            Field::new("v", DataType::Int64, true),
        ]));
        let first = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 1])),
                Arc::new(Int64Array::from(vec![10, 20, 30])),
            ],
        )
        .unwrap();
        let second = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![2, 1])),
                Arc::new(Int64Array::from(vec![40, 50])),
            ],
        )
        .unwrap();
        Frame::try_new(schema, vec![first, second]).unwrap()
    }

    fn sums(parallel: bool) -> Vec<i64> {
        let frame = frame();
        let mut arena = ExprArena::new();
        let v = arena.col("v");
        let sum = arena.agg(AggFunction::Sum, v);
        let keys: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 1, 2, 1]));
        let index = PartitionIndex::build(&[keys], 5, false).unwrap();
        let options = if parallel {
            QueryOptions {
                parallel_partition_threshold: 1,
                parallel_min_rows: 0,
                ..QueryOptions::default()
            }
        } else {
            QueryOptions::default()
        };
        evaluate_partitions(&arena, &frame, sum, &index, &options)
            .unwrap()
            .iter()
            .map(|value| {
                value
                    .array()
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .value(0)
            })
            .collect()
    }

    #[test]
    fn partitions_span_chunks() {
        assert_eq!(sums(false), vec![90, 60]);
    }

    #[test]
    fn parallel_matches_sequential() {
        assert_eq!(sums(true), sums(false));
    }

    #[test]
    fn empty_type_comes_from_zero_rows() {
        let frame = frame();
        let mut arena = ExprArena::new();
        let v = arena.col("v");
        let mean = arena.agg(AggFunction::Mean, v);
        assert_eq!(
            infer_empty_type(&arena, &frame, mean).unwrap(),
            DataType::Float64
        );
    }
}
