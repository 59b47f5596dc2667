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
//! Frame-level projection. Window nodes anywhere in an expression tree are resolved against the
//! whole frame and share the query's partition cache.
use std::sync::{Arc, Mutex};

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use rayon::prelude::*;

use crate::exec::chunk::{Chunk, Frame};
use crate::exec::expr::{EvalScope, ExprArena, ExprId, ExprNode, ExprValue, WindowResolver};
use crate::exec::window::{WindowError, WindowSpec, evaluate_window};
use crate::overwin_logging::debug;
use crate::runtime::exec_env;
use crate::runtime::query_context::QueryContext;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedExpr {
    pub name: String,
    pub expr: ExprId,
}

impl NamedExpr {
    pub fn new(name: impl Into<String>, expr: ExprId) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// Resolves window nodes for one top-level expression. The first window failure is kept so
/// the caller can surface it with its original kind.
struct FrameWindows<'a> {
    ctx: &'a QueryContext,
    arena: &'a ExprArena,
    frame: &'a Frame,
    first_error: Mutex<Option<WindowError>>,
}

impl WindowResolver for FrameWindows<'_> {
    fn resolve(&self, _id: ExprId, spec: &WindowSpec) -> Result<ArrayRef, String> {
        evaluate_window(self.ctx, self.arena, self.frame, spec).map_err(|err| {
            let message = err.to_string();
            let mut slot = self.first_error.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(err);
            }
            message
        })
    }
}

fn eval_named(
    ctx: &QueryContext,
    arena: &ExprArena,
    frame: &Frame,
    chunk: &Chunk,
    named: &NamedExpr,
) -> Result<ExprValue, WindowError> {
    if let Some(ExprNode::Window(spec)) = arena.node(named.expr) {
        return evaluate_window(ctx, arena, frame, spec).map(ExprValue::Column);
    }
    let windows = FrameWindows {
        ctx,
        arena,
        frame,
        first_error: Mutex::new(None),
    };
    let scope = EvalScope::with_windows(chunk, &windows);
    arena.eval_in(named.expr, &scope).map_err(|message| {
        let window_error = windows
            .first_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        window_error.unwrap_or_else(|| {
            WindowError::Expression(format!(
                "failed to evaluate `{}` as `{}`: {}",
                arena.display(named.expr),
                named.name,
                message
            ))
        })
    })
}

fn eval_all(
    ctx: &QueryContext,
    frame: &Frame,
    arena: &ExprArena,
    exprs: &[NamedExpr],
) -> Result<Vec<ExprValue>, WindowError> {
    let mut columns: Vec<String> = Vec::new();
    for named in exprs {
        for name in arena.frame_level_columns(named.expr) {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    let chunk = frame
        .project_contiguous(&columns)
        .map_err(WindowError::Expression)?;
    debug!(
        query_id = %ctx.query_id(),
        exprs = exprs.len(),
        rows = frame.num_rows(),
        chunks = frame.num_chunks(),
        "evaluating selection"
    );
    if exprs.len() > 1 {
        exec_env::install(|| {
            exprs
                .par_iter()
                .map(|named| eval_named(ctx, arena, frame, &chunk, named))
                .collect()
        })
    } else {
        exprs
            .iter()
            .map(|named| eval_named(ctx, arena, frame, &chunk, named))
            .collect()
    }
}

fn assemble(
    names: Vec<String>,
    values: Vec<ExprValue>,
    len: usize,
) -> Result<RecordBatch, WindowError> {
    let mut fields = Vec::with_capacity(values.len());
    let mut arrays = Vec::with_capacity(values.len());
    for (name, value) in names.into_iter().zip(values) {
        let array = value
            .broadcast_to(len)
            .map_err(|e| WindowError::Expression(format!("column `{}`: {}", name, e)))?;
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(len));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
        .map_err(|e| WindowError::Expression(format!("assemble output: {}", e)))
}

/// Evaluates `exprs` with a caller-owned query context.
///
/// Scalar results broadcast to the common column length; a selection of only scalars yields a
/// single row.
pub fn select_in(
    ctx: &QueryContext,
    frame: &Frame,
    arena: &ExprArena,
    exprs: &[NamedExpr],
) -> Result<RecordBatch, WindowError> {
    let values = eval_all(ctx, frame, arena, exprs)?;
    let mut len: Option<usize> = None;
    for (named, value) in exprs.iter().zip(values.iter()) {
        if value.is_scalar() {
            continue;
        }
        match len {
            None => len = Some(value.len()),
            Some(l) if l != value.len() => {
                return Err(WindowError::Expression(format!(
                    "column `{}` has length {} but other columns have length {}",
                    named.name,
                    value.len(),
                    l
                )));
            }
            Some(_) => {}
        }
    }
    let len = len.unwrap_or(if exprs.is_empty() { 0 } else { 1 });
    assemble(exprs.iter().map(|n| n.name.clone()).collect(), values, len)
}

/// Evaluates `exprs` in a fresh query context.
pub fn select(
    frame: &Frame,
    arena: &ExprArena,
    exprs: &[NamedExpr],
) -> Result<RecordBatch, WindowError> {
    let ctx = QueryContext::from_config();
    select_in(&ctx, frame, arena, exprs)
}

/// Appends (or replaces, by name) columns on the frame, using a caller-owned query context.
pub fn with_columns_in(
    ctx: &QueryContext,
    frame: &Frame,
    arena: &ExprArena,
    exprs: &[NamedExpr],
) -> Result<RecordBatch, WindowError> {
    let values = eval_all(ctx, frame, arena, exprs)?;
    let rows = frame.num_rows();
    let base = frame.to_contiguous().map_err(WindowError::Expression)?;

    let mut names: Vec<String> = base.column_names();
    let mut out: Vec<ExprValue> = base
        .columns()
        .iter()
        .map(|c| ExprValue::Column(Arc::clone(c)))
        .collect();
    for (named, value) in exprs.iter().zip(values) {
        if !value.is_scalar() && value.len() != rows {
            return Err(WindowError::Expression(format!(
                "column `{}` has length {} but the frame has {} rows",
                named.name,
                value.len(),
                rows
            )));
        }
        match names.iter().position(|n| n == &named.name) {
            Some(idx) => out[idx] = value,
            None => {
                names.push(named.name.clone());
                out.push(value);
            }
        }
    }
    assemble(names, out, rows)
}

/// Appends (or replaces) columns in a fresh query context.
pub fn with_columns(
    frame: &Frame,
    arena: &ExprArena,
    exprs: &[NamedExpr],
) -> Result<RecordBatch, WindowError> {
    let ctx = QueryContext::from_config();
    with_columns_in(&ctx, frame, arena, exprs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::expr::{AggFunction, BinaryOp, LiteralValue};
    use crate::runtime::query_context::QueryOptions;
    use arrow::array::{Array, Float64Array, Int64Array};
    use arrow::datatypes::DataType;

    fn frame() -> Frame {
        let schema = Arc::new(Schema::new(vec![
            Field::new("g", DataType::Int64, true),
            Field::new("x", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 1, 2, 2])),
                Arc::new(Int64Array::from(vec![1, 3, 10, 20])),
            ],
        )
        .unwrap();
        Frame::from_batch(batch).unwrap()
    }

    #[test]
    fn window_nested_in_combinator() {
        let mut arena = ExprArena::new();
        let x = arena.col("x");
        let g = arena.col("g");
        let mean = arena.agg(AggFunction::Mean, x);
        let over = arena.over(mean, &[g]);
        let centered = arena.binary(BinaryOp::Sub, x, over);
        let out = select(&frame(), &arena, &[NamedExpr::new("centered", centered)]).unwrap();
        let out = out
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .values()
            .to_vec();
        assert_eq!(out, vec![-1.0, 1.0, -5.0, 5.0]);
    }

    #[test]
    fn scalars_broadcast_against_windows() {
        let mut arena = ExprArena::new();
        let x = arena.col("x");
        let g = arena.col("g");
        let sum = arena.agg(AggFunction::Sum, x);
        let over = arena.over(sum, &[g]);
        let one = arena.lit(LiteralValue::Int64(1));
        let out = select(
            &frame(),
            &arena,
            &[NamedExpr::new("s", over), NamedExpr::new("one", one)],
        )
        .unwrap();
        assert_eq!(out.num_rows(), 4);
        assert_eq!(out.column(1).len(), 4);
    }

    #[test]
    fn nested_window_errors_keep_their_kind() {
        let mut arena = ExprArena::new();
        let x = arena.col("x");
        let g = arena.col("g");
        let filter_pred = arena.lit(LiteralValue::Bool(true));
        let filtered = arena.push(ExprNode::Filter {
            child: x,
            predicate: filter_pred,
        });
        let over = arena.over(filtered, &[g]);
        let two = arena.lit(LiteralValue::Int64(2));
        let scaled = arena.binary(BinaryOp::Mul, over, two);
        let ctx = QueryContext::new(QueryOptions::default());
        let out = select_in(&ctx, &frame(), &arena, &[NamedExpr::new("y", scaled)]).unwrap();
        assert_eq!(out.num_rows(), 4);

        let three = arena.lit(LiteralValue::Series(Arc::new(Int64Array::from(vec![1, 2, 3]))));
        let bad = arena.over(three, &[g]);
        let wrapped = arena.binary(BinaryOp::Mul, bad, two);
        let err = select_in(&ctx, &frame(), &arena, &[NamedExpr::new("y", wrapped)]).unwrap_err();
        assert!(
            matches!(err, WindowError::LengthMismatch { group_len: 2, actual: 3, .. }),
            "err={:?}",
            err
        );
    }

    #[test]
    fn with_columns_replaces_by_name() {
        let mut arena = ExprArena::new();
        let x = arena.col("x");
        let g = arena.col("g");
        let max = arena.agg(AggFunction::Max, x);
        let over = arena.over(max, &[g]);
        let out = with_columns(&frame(), &arena, &[NamedExpr::new("x", over)]).unwrap();
        assert_eq!(out.num_columns(), 2);
        let x = out
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec();
        assert_eq!(x, vec![3, 3, 20, 20]);
    }
}
