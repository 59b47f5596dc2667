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
//! Expression arena and evaluator.
//!
//! Expressions are stored in an `ExprArena` and addressed by `ExprId`. Evaluation against a
//! `Chunk` yields an `ExprValue`: either a scalar (a length-1 array produced by literals and
//! aggregations, broadcast on use) or a column aligned with the chunk rows (or with a
//! filtered/exploded subset of them).

pub mod agg;
mod arithmetic;
mod case;
pub mod cast;
mod comparison;
mod fold;
mod list_expr;
mod literal;
pub mod sort_key;
mod struct_expr;
pub mod transform;

use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array};
use arrow::compute::filter;
use arrow::compute::take;
use arrow::datatypes::DataType;

use crate::exec::chunk::Chunk;
use crate::exec::window::{MappingStrategy, PartitionKey, WindowOrder, WindowSpec};

pub use self::agg::AggFunction;
pub use self::transform::{RankMethod, TransformFunction};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// A literal column. Its length is independent of the rows it is evaluated against.
    Series(ArrayRef),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }

    fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Column(String),
    Literal(LiteralValue),
    Cast {
        child: ExprId,
        to: DataType,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Not(ExprId),
    IsNull(ExprId),
    IsNotNull(ExprId),
    /// `when(predicate).then(then).otherwise(otherwise)`; a missing `otherwise` yields null.
    When {
        predicate: ExprId,
        then: ExprId,
        otherwise: Option<ExprId>,
    },
    Struct(Vec<(String, ExprId)>),
    Agg {
        func: AggFunction,
        child: ExprId,
    },
    /// Number of rows in the evaluation input.
    Len,
    Corr(ExprId, ExprId),
    Filter {
        child: ExprId,
        predicate: ExprId,
    },
    Transform {
        func: TransformFunction,
        child: ExprId,
    },
    /// Applies `agg` to every prefix of `child`.
    CumulativeEval {
        child: ExprId,
        agg: AggFunction,
        min_periods: usize,
    },
    /// Sorts `child` by `by` (by itself when `by` is empty). Stable.
    SortBy {
        child: ExprId,
        by: Vec<ExprId>,
        descending: bool,
        nulls_last: bool,
    },
    IntRange {
        start: ExprId,
        end: ExprId,
    },
    Explode(ExprId),
    ConcatList(Vec<ExprId>),
    IsIn {
        element: ExprId,
        set: ExprId,
    },
    Fold {
        acc: ExprId,
        inputs: Vec<ExprId>,
        op: BinaryOp,
        returns_scalar: bool,
    },
    Window(Box<WindowSpec>),
}

/// Result of evaluating an expression.
#[derive(Clone, Debug)]
pub enum ExprValue {
    /// One value, broadcast against columns.
    Scalar(ArrayRef),
    Column(ArrayRef),
}

impl ExprValue {
    pub fn scalar(array: ArrayRef) -> Result<Self, String> {
        if array.len() != 1 {
            return Err(format!(
                "scalar value must have exactly one element, got {}",
                array.len()
            ));
        }
        Ok(ExprValue::Scalar(array))
    }

    pub fn array(&self) -> &ArrayRef {
        match self {
            ExprValue::Scalar(a) | ExprValue::Column(a) => a,
        }
    }

    pub fn into_array(self) -> ArrayRef {
        match self {
            ExprValue::Scalar(a) | ExprValue::Column(a) => a,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, ExprValue::Scalar(_))
    }

    pub fn len(&self) -> usize {
        self.array().len()
    }

    pub fn is_empty(&self) -> bool {
        self.array().is_empty()
    }

    pub fn data_type(&self) -> &DataType {
        self.array().data_type()
    }

    /// Applies a shape-preserving array function.
    pub fn map_array<F>(self, f: F) -> Result<Self, String>
    where
        F: FnOnce(&ArrayRef) -> Result<ArrayRef, String>,
    {
        match self {
            ExprValue::Scalar(a) => ExprValue::scalar(f(&a)?),
            ExprValue::Column(a) => Ok(ExprValue::Column(f(&a)?)),
        }
    }

    /// Materializes the value as an array of `len` rows.
    pub fn broadcast_to(&self, len: usize) -> Result<ArrayRef, String> {
        match self {
            ExprValue::Scalar(a) => repeat_scalar(a, len),
            ExprValue::Column(a) => {
                if a.len() != len {
                    return Err(format!(
                        "cannot broadcast column of length {} to length {}",
                        a.len(),
                        len
                    ));
                }
                Ok(Arc::clone(a))
            }
        }
    }
}

pub(crate) fn repeat_scalar(array: &ArrayRef, len: usize) -> Result<ArrayRef, String> {
    if array.len() == len {
        return Ok(Arc::clone(array));
    }
    if array.is_empty() {
        return Err("cannot repeat an empty array".to_string());
    }
    let indices = UInt32Array::from(vec![0u32; len]);
    take(array.as_ref(), &indices, None).map_err(|e| e.to_string())
}

/// Common length of the non-scalar operands, or `None` when all operands are scalars.
pub(crate) fn common_len(values: &[&ExprValue]) -> Result<Option<usize>, String> {
    let mut len: Option<usize> = None;
    for value in values {
        if value.is_scalar() {
            continue;
        }
        match len {
            None => len = Some(value.len()),
            Some(l) if l != value.len() => {
                return Err(format!(
                    "lengths don't match: {} vs {}",
                    l,
                    value.len()
                ));
            }
            Some(_) => {}
        }
    }
    Ok(len)
}

/// Resolves window nodes met during frame-level evaluation.
pub trait WindowResolver: Sync {
    /// Returns the row-aligned output of the windowed expression `id`.
    fn resolve(&self, id: ExprId, spec: &WindowSpec) -> Result<ArrayRef, String>;
}

/// Rows an expression is evaluated against, plus the window resolver when windows are allowed.
#[derive(Clone, Copy)]
pub struct EvalScope<'a> {
    pub chunk: &'a Chunk,
    pub windows: Option<&'a dyn WindowResolver>,
}

impl<'a> EvalScope<'a> {
    pub fn new(chunk: &'a Chunk) -> Self {
        Self {
            chunk,
            windows: None,
        }
    }

    pub fn with_windows(chunk: &'a Chunk, windows: &'a dyn WindowResolver) -> Self {
        Self {
            chunk,
            windows: Some(windows),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ExprNode) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn col(&mut self, name: &str) -> ExprId {
        self.push(ExprNode::Column(name.to_string()))
    }

    pub fn lit(&mut self, value: LiteralValue) -> ExprId {
        self.push(ExprNode::Literal(value))
    }

    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.push(ExprNode::Binary { op, left, right })
    }

    pub fn agg(&mut self, func: AggFunction, child: ExprId) -> ExprId {
        self.push(ExprNode::Agg { func, child })
    }

    pub fn transform(&mut self, func: TransformFunction, child: ExprId) -> ExprId {
        self.push(ExprNode::Transform { func, child })
    }

    /// `function.over(keys)` with the default mapping strategy.
    pub fn over(&mut self, function: ExprId, keys: &[ExprId]) -> ExprId {
        self.window(WindowSpec::new(
            function,
            keys.iter().map(|&k| PartitionKey::new(k)).collect(),
        ))
    }

    pub fn window(&mut self, spec: WindowSpec) -> ExprId {
        self.push(ExprNode::Window(Box::new(spec)))
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ExprValue, String> {
        self.eval_in(id, &EvalScope::new(chunk))
    }

    pub fn eval_in(&self, id: ExprId, scope: &EvalScope<'_>) -> Result<ExprValue, String> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| format!("invalid ExprId {}", id.0))?;
        match node {
            ExprNode::Column(name) => Ok(ExprValue::Column(scope.chunk.column_by_name(name)?)),
            ExprNode::Literal(value) => literal::eval(value),
            ExprNode::Cast { child, to } => {
                let value = self.eval_in(*child, scope)?;
                value.map_array(|a| cast::cast_array(a, to))
            }
            ExprNode::Binary { op, left, right } => {
                let left = self.eval_in(*left, scope)?;
                let right = self.eval_in(*right, scope)?;
                eval_binary(*op, &left, &right)
            }
            ExprNode::Not(child) => comparison::eval_not(&self.eval_in(*child, scope)?),
            ExprNode::IsNull(child) => comparison::eval_is_null(&self.eval_in(*child, scope)?, false),
            ExprNode::IsNotNull(child) => {
                comparison::eval_is_null(&self.eval_in(*child, scope)?, true)
            }
            ExprNode::When {
                predicate,
                then,
                otherwise,
            } => case::eval_when(self, scope, *predicate, *then, *otherwise),
            ExprNode::Struct(fields) => struct_expr::eval_struct(self, scope, fields),
            ExprNode::Agg { func, child } => {
                let value = self.eval_in(*child, scope)?;
                Ok(ExprValue::Scalar(agg::eval_agg(func, value.array())?))
            }
            ExprNode::Len => {
                let len = u32::try_from(scope.chunk.len())
                    .map_err(|_| format!("row count {} overflows UInt32", scope.chunk.len()))?;
                Ok(ExprValue::Scalar(Arc::new(UInt32Array::from(vec![len]))))
            }
            ExprNode::Corr(left, right) => {
                let left = self.eval_in(*left, scope)?;
                let right = self.eval_in(*right, scope)?;
                Ok(ExprValue::Scalar(agg::statistics::corr(
                    left.array(),
                    right.array(),
                )?))
            }
            ExprNode::Filter { child, predicate } => {
                let child = self.eval_in(*child, scope)?;
                let predicate = self.eval_in(*predicate, scope)?;
                eval_filter(&child, &predicate)
            }
            ExprNode::Transform { func, child } => {
                let value = self.eval_in(*child, scope)?;
                transform::eval_transform(func, value)
            }
            ExprNode::CumulativeEval {
                child,
                agg,
                min_periods,
            } => {
                let value = self.eval_in(*child, scope)?;
                value.map_array(|a| transform::cumulative_eval(a, agg, *min_periods))
            }
            ExprNode::SortBy {
                child,
                by,
                descending,
                nulls_last,
            } => {
                let value = self.eval_in(*child, scope)?;
                let mut keys = Vec::with_capacity(by.len());
                for key in by {
                    keys.push(self.eval_in(*key, scope)?);
                }
                transform::sort_by(value, &keys, *descending, *nulls_last)
            }
            ExprNode::IntRange { start, end } => {
                let start = self.eval_in(*start, scope)?;
                let end = self.eval_in(*end, scope)?;
                transform::int_range(&start, &end)
            }
            ExprNode::Explode(child) => list_expr::explode(&self.eval_in(*child, scope)?),
            ExprNode::ConcatList(children) => {
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    values.push(self.eval_in(*child, scope)?);
                }
                list_expr::concat_list(&values)
            }
            ExprNode::IsIn { element, set } => {
                let element = self.eval_in(*element, scope)?;
                let set = self.eval_in(*set, scope)?;
                list_expr::is_in(&element, &set)
            }
            ExprNode::Fold {
                acc,
                inputs,
                op,
                returns_scalar,
            } => fold::eval_fold(self, scope, *acc, inputs, *op, *returns_scalar),
            ExprNode::Window(spec) => match scope.windows {
                Some(resolver) => Ok(ExprValue::Column(resolver.resolve(id, spec)?)),
                None => Err(format!(
                    "window expression `{}` cannot be nested inside another windowed expression",
                    self.display(id)
                )),
            },
        }
    }

    /// Column names referenced by `id`, in first-use order.
    pub fn referenced_columns(&self, id: ExprId) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(id, true, &mut out);
        out
    }

    /// Like `referenced_columns`, but does not descend into window nodes, which read the
    /// frame themselves.
    pub fn frame_level_columns(&self, id: ExprId) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(id, false, &mut out);
        out
    }

    fn collect_columns(&self, id: ExprId, into_windows: bool, out: &mut Vec<String>) {
        let Some(node) = self.node(id) else {
            return;
        };
        match node {
            ExprNode::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            ExprNode::Window(_) if !into_windows => {}
            _ => {
                for child in children(node) {
                    self.collect_columns(child, into_windows, out);
                }
            }
        }
    }

    /// Canonical rendering; structurally equal expressions render identically.
    pub fn display(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.write_expr(id, &mut out);
        out
    }

    fn write_list(&self, ids: &[ExprId], out: &mut String) {
        out.push('[');
        for (idx, id) in ids.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            self.write_expr(*id, out);
        }
        out.push(']');
    }

    fn write_expr(&self, id: ExprId, out: &mut String) {
        let Some(node) = self.node(id) else {
            let _ = write!(out, "<invalid expr {}>", id.0);
            return;
        };
        match node {
            ExprNode::Column(name) => {
                let _ = write!(out, "col({:?})", name);
            }
            ExprNode::Literal(value) => literal::write_literal(value, out),
            ExprNode::Cast { child, to } => {
                self.write_expr(*child, out);
                let _ = write!(out, ".cast({:?})", to);
            }
            ExprNode::Binary { op, left, right } => {
                out.push('(');
                self.write_expr(*left, out);
                let _ = write!(out, " {} ", op.symbol());
                self.write_expr(*right, out);
                out.push(')');
            }
            ExprNode::Not(child) => {
                self.write_expr(*child, out);
                out.push_str(".not()");
            }
            ExprNode::IsNull(child) => {
                self.write_expr(*child, out);
                out.push_str(".is_null()");
            }
            ExprNode::IsNotNull(child) => {
                self.write_expr(*child, out);
                out.push_str(".is_not_null()");
            }
            ExprNode::When {
                predicate,
                then,
                otherwise,
            } => {
                out.push_str("when(");
                self.write_expr(*predicate, out);
                out.push_str(").then(");
                self.write_expr(*then, out);
                out.push(')');
                if let Some(otherwise) = otherwise {
                    out.push_str(".otherwise(");
                    self.write_expr(*otherwise, out);
                    out.push(')');
                }
            }
            ExprNode::Struct(fields) => {
                out.push_str("struct(");
                for (idx, (name, field)) in fields.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}=", name);
                    self.write_expr(*field, out);
                }
                out.push(')');
            }
            ExprNode::Agg { func, child } => {
                self.write_expr(*child, out);
                let _ = write!(out, ".{}", func.display());
            }
            ExprNode::Len => out.push_str("len()"),
            ExprNode::Corr(left, right) => {
                out.push_str("corr(");
                self.write_expr(*left, out);
                out.push_str(", ");
                self.write_expr(*right, out);
                out.push(')');
            }
            ExprNode::Filter { child, predicate } => {
                self.write_expr(*child, out);
                out.push_str(".filter(");
                self.write_expr(*predicate, out);
                out.push(')');
            }
            ExprNode::Transform { func, child } => {
                self.write_expr(*child, out);
                let _ = write!(out, ".{}", func.display());
            }
            ExprNode::CumulativeEval {
                child,
                agg,
                min_periods,
            } => {
                self.write_expr(*child, out);
                let _ = write!(
                    out,
                    ".cumulative_eval(element().{}, min_periods={})",
                    agg.display(),
                    min_periods
                );
            }
            ExprNode::SortBy {
                child,
                by,
                descending,
                nulls_last,
            } => {
                self.write_expr(*child, out);
                out.push_str(".sort_by(");
                self.write_list(by, out);
                let _ = write!(
                    out,
                    ", descending={}, nulls_last={})",
                    descending, nulls_last
                );
            }
            ExprNode::IntRange { start, end } => {
                out.push_str("int_range(");
                self.write_expr(*start, out);
                out.push_str(", ");
                self.write_expr(*end, out);
                out.push(')');
            }
            ExprNode::Explode(child) => {
                self.write_expr(*child, out);
                out.push_str(".explode()");
            }
            ExprNode::ConcatList(children) => {
                out.push_str("concat_list(");
                self.write_list(children, out);
                out.push(')');
            }
            ExprNode::IsIn { element, set } => {
                self.write_expr(*element, out);
                out.push_str(".is_in(");
                self.write_expr(*set, out);
                out.push(')');
            }
            ExprNode::Fold {
                acc,
                inputs,
                op,
                returns_scalar,
            } => {
                out.push_str("fold(");
                self.write_expr(*acc, out);
                out.push_str(", ");
                self.write_list(inputs, out);
                let _ = write!(
                    out,
                    ", op={}, returns_scalar={})",
                    op.symbol(),
                    returns_scalar
                );
            }
            ExprNode::Window(spec) => self.write_window(spec, out),
        }
    }

    pub fn display_window(&self, spec: &WindowSpec) -> String {
        let mut out = String::new();
        self.write_window(spec, &mut out);
        out
    }

    fn write_window(&self, spec: &WindowSpec, out: &mut String) {
        self.write_expr(spec.function, out);
        out.push_str(".over([");
        for (idx, key) in spec.partition_by.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            self.write_expr(key.expr, out);
            if key.sorted {
                out.push_str(".set_sorted()");
            }
        }
        out.push(']');
        if let Some(WindowOrder {
            exprs,
            descending,
            nulls_last,
        }) = &spec.order_by
        {
            out.push_str(", order_by=");
            self.write_list(exprs, out);
            let _ = write!(out, ", descending={}, nulls_last={}", descending, nulls_last);
        }
        if spec.mapping != MappingStrategy::GroupToRows {
            let _ = write!(out, ", mapping_strategy={}", spec.mapping);
        }
        out.push(')');
    }
}

fn children(node: &ExprNode) -> Vec<ExprId> {
    match node {
        ExprNode::Column(_) | ExprNode::Literal(_) | ExprNode::Len => Vec::new(),
        ExprNode::Cast { child, .. }
        | ExprNode::Not(child)
        | ExprNode::IsNull(child)
        | ExprNode::IsNotNull(child)
        | ExprNode::Agg { child, .. }
        | ExprNode::Transform { child, .. }
        | ExprNode::CumulativeEval { child, .. }
        | ExprNode::Explode(child) => vec![*child],
        ExprNode::Binary { left, right, .. } | ExprNode::Corr(left, right) => {
            vec![*left, *right]
        }
        ExprNode::When {
            predicate,
            then,
            otherwise,
        } => {
            let mut out = vec![*predicate, *then];
            out.extend(otherwise.iter().copied());
            out
        }
        ExprNode::Struct(fields) => fields.iter().map(|(_, id)| *id).collect(),
        ExprNode::Filter { child, predicate } => vec![*child, *predicate],
        ExprNode::SortBy { child, by, .. } => {
            let mut out = vec![*child];
            out.extend(by.iter().copied());
            out
        }
        ExprNode::IntRange { start, end } => vec![*start, *end],
        ExprNode::ConcatList(children) => children.clone(),
        ExprNode::IsIn { element, set } => vec![*element, *set],
        ExprNode::Fold { acc, inputs, .. } => {
            let mut out = vec![*acc];
            out.extend(inputs.iter().copied());
            out
        }
        ExprNode::Window(spec) => {
            let mut out = vec![spec.function];
            out.extend(spec.partition_by.iter().map(|k| k.expr));
            if let Some(order) = &spec.order_by {
                out.extend(order.exprs.iter().copied());
            }
            out
        }
    }
}

pub(crate) fn eval_binary(
    op: BinaryOp,
    left: &ExprValue,
    right: &ExprValue,
) -> Result<ExprValue, String> {
    if op.is_arithmetic() {
        arithmetic::eval_arithmetic(op, left, right)
    } else {
        comparison::eval_comparison(op, left, right)
    }
}

fn eval_filter(child: &ExprValue, predicate: &ExprValue) -> Result<ExprValue, String> {
    let mask = cast::cast_array(predicate.array(), &DataType::Boolean)?;
    let mask = mask
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "filter predicate must be boolean".to_string())?;
    if predicate.is_scalar() {
        let keep = mask.is_valid(0) && mask.value(0);
        let array = child.array();
        let out = if keep {
            Arc::clone(array)
        } else {
            array.slice(0, 0)
        };
        return Ok(ExprValue::Column(out));
    }
    let values = child.broadcast_to(mask.len())?;
    let out = filter(values.as_ref(), mask).map_err(|e| format!("filter: {}", e))?;
    Ok(ExprValue::Column(out))
}
