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
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Datum};
use arrow::compute::kernels::boolean::{and_kleene, not, or_kleene};
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq, neq};
use arrow::compute::{is_not_null, is_null};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;

use super::arithmetic::{apply_kernel, null_result};
use super::cast::{cast_array, coerce_pair};
use super::{BinaryOp, ExprValue, common_len};

fn boolean_kernel(
    kernel: fn(&dyn Datum, &dyn Datum) -> Result<BooleanArray, ArrowError>,
) -> impl Fn(&dyn Datum, &dyn Datum) -> Result<ArrayRef, ArrowError> {
    move |l: &dyn Datum, r: &dyn Datum| kernel(l, r).map(|a| Arc::new(a) as ArrayRef)
}

fn as_boolean(array: &ArrayRef) -> Result<ArrayRef, String> {
    match array.data_type() {
        DataType::Boolean | DataType::Null => cast_array(array, &DataType::Boolean),
        other => Err(format!("expected a boolean operand, got {:?}", other)),
    }
}

fn downcast_boolean(array: &ArrayRef) -> Result<&BooleanArray, String> {
    array
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "failed to downcast to BooleanArray".to_string())
}

fn eval_logical(op: BinaryOp, left: &ExprValue, right: &ExprValue) -> Result<ExprValue, String> {
    let left = left.clone().map_array(as_boolean)?;
    let right = right.clone().map_array(as_boolean)?;
    let len = common_len(&[&left, &right])?;
    let rows = len.unwrap_or(1);
    let l = left.broadcast_to(rows)?;
    let r = right.broadcast_to(rows)?;
    let (l, r) = (downcast_boolean(&l)?, downcast_boolean(&r)?);
    let out = match op {
        BinaryOp::And => and_kleene(l, r),
        BinaryOp::Or => or_kleene(l, r),
        other => return Err(format!("{} is not a logical operator", other.symbol())),
    }
    .map_err(|e| e.to_string())?;
    let out: ArrayRef = Arc::new(out);
    match len {
        Some(_) => Ok(ExprValue::Column(out)),
        None => ExprValue::scalar(out),
    }
}

pub fn eval_comparison(
    op: BinaryOp,
    left: &ExprValue,
    right: &ExprValue,
) -> Result<ExprValue, String> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        return eval_logical(op, left, right);
    }
    let (left, right) = coerce_pair(left, right)?;
    if matches!(left.data_type(), DataType::Null) {
        return null_result(&left, &right, &DataType::Boolean);
    }
    let kernel = match op {
        BinaryOp::Eq => eq,
        BinaryOp::NotEq => neq,
        BinaryOp::Lt => lt,
        BinaryOp::LtEq => lt_eq,
        BinaryOp::Gt => gt,
        BinaryOp::GtEq => gt_eq,
        other => return Err(format!("{} is not a comparison operator", other.symbol())),
    };
    apply_kernel(&left, &right, boolean_kernel(kernel))
        .map_err(|e| format!("comparison `{}` failed: {}", op.symbol(), e))
}

pub fn eval_not(value: &ExprValue) -> Result<ExprValue, String> {
    value.clone().map_array(|a| {
        let a = as_boolean(a)?;
        let out = not(downcast_boolean(&a)?).map_err(|e| e.to_string())?;
        Ok(Arc::new(out) as ArrayRef)
    })
}

pub fn eval_is_null(value: &ExprValue, negated: bool) -> Result<ExprValue, String> {
    value.clone().map_array(|a| {
        let out = if negated {
            is_not_null(a.as_ref())
        } else {
            is_null(a.as_ref())
        }
        .map_err(|e| e.to_string())?;
        Ok(Arc::new(out) as ArrayRef)
    })
}
