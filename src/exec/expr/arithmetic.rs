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

use arrow::array::{ArrayRef, Datum, Scalar, new_null_array};
use arrow::compute::kernels::numeric::{add, div, mul, sub};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;

use super::cast::{coerce_pair, cast_array};
use super::{BinaryOp, ExprValue, common_len};

/// Applies a `Datum` kernel, keeping scalars scalar.
pub(crate) fn apply_kernel<F>(
    left: &ExprValue,
    right: &ExprValue,
    kernel: F,
) -> Result<ExprValue, String>
where
    F: Fn(&dyn Datum, &dyn Datum) -> Result<ArrayRef, ArrowError>,
{
    common_len(&[left, right])?;
    let left_scalar;
    let right_scalar;
    let left_datum: &dyn Datum = match left {
        ExprValue::Scalar(a) => {
            left_scalar = Scalar::new(Arc::clone(a));
            &left_scalar
        }
        ExprValue::Column(a) => a,
    };
    let right_datum: &dyn Datum = match right {
        ExprValue::Scalar(a) => {
            right_scalar = Scalar::new(Arc::clone(a));
            &right_scalar
        }
        ExprValue::Column(a) => a,
    };
    let out = kernel(left_datum, right_datum).map_err(|e| e.to_string())?;
    if left.is_scalar() && right.is_scalar() {
        ExprValue::scalar(out)
    } else {
        Ok(ExprValue::Column(out))
    }
}

/// Null-typed result with the shape of the operands.
pub(crate) fn null_result(
    left: &ExprValue,
    right: &ExprValue,
    data_type: &DataType,
) -> Result<ExprValue, String> {
    match common_len(&[left, right])? {
        Some(len) => Ok(ExprValue::Column(new_null_array(data_type, len))),
        None => ExprValue::scalar(new_null_array(data_type, 1)),
    }
}

pub fn eval_arithmetic(
    op: BinaryOp,
    left: &ExprValue,
    right: &ExprValue,
) -> Result<ExprValue, String> {
    let (left, right) = if op == BinaryOp::Div {
        // True division.
        let l = left
            .clone()
            .map_array(|a| cast_array(a, &DataType::Float64))?;
        let r = right
            .clone()
            .map_array(|a| cast_array(a, &DataType::Float64))?;
        (l, r)
    } else {
        coerce_pair(left, right)?
    };
    if matches!(left.data_type(), DataType::Null) {
        return null_result(&left, &right, &DataType::Null);
    }
    let result = match op {
        BinaryOp::Add => apply_kernel(&left, &right, add),
        BinaryOp::Sub => apply_kernel(&left, &right, sub),
        BinaryOp::Mul => apply_kernel(&left, &right, mul),
        BinaryOp::Div => apply_kernel(&left, &right, div),
        other => return Err(format!("{} is not an arithmetic operator", other.symbol())),
    };
    result.map_err(|e| format!("arithmetic `{}` failed: {}", op.symbol(), e))
}
