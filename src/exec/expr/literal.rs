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
use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, NullArray, StringArray,
};

use super::{ExprValue, LiteralValue};

pub fn scalar_array(value: &LiteralValue) -> Result<ArrayRef, String> {
    let array: ArrayRef = match value {
        LiteralValue::Null => Arc::new(NullArray::new(1)),
        LiteralValue::Bool(v) => Arc::new(BooleanArray::from(vec![*v])),
        LiteralValue::Int32(v) => Arc::new(Int32Array::from(vec![*v])),
        LiteralValue::Int64(v) => Arc::new(Int64Array::from(vec![*v])),
        LiteralValue::Float64(v) => Arc::new(Float64Array::from(vec![*v])),
        LiteralValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str()])),
        LiteralValue::Series(_) => {
            return Err("series literal has no scalar representation".to_string());
        }
    };
    Ok(array)
}

pub fn eval(value: &LiteralValue) -> Result<ExprValue, String> {
    match value {
        LiteralValue::Series(array) => Ok(ExprValue::Column(Arc::clone(array))),
        other => ExprValue::scalar(scalar_array(other)?),
    }
}

pub fn write_literal(value: &LiteralValue, out: &mut String) {
    let _ = match value {
        LiteralValue::Null => write!(out, "lit(null)"),
        LiteralValue::Bool(v) => write!(out, "lit({})", v),
        LiteralValue::Int32(v) => write!(out, "lit({}i32)", v),
        LiteralValue::Int64(v) => write!(out, "lit({}i64)", v),
        LiteralValue::Float64(v) => write!(out, "lit({:?})", v),
        LiteralValue::Utf8(v) => write!(out, "lit({:?})", v),
        // Series are identified by address: two distinct series never share a rendering.
        LiteralValue::Series(array) => write!(
            out,
            "lit(series[{:p}; {}; {:?}])",
            Arc::as_ptr(array) as *const u8,
            array.len(),
            array.data_type()
        ),
    };
}
