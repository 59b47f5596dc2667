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
//! Casting and type unification.
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Date32Builder, StringArray};
use arrow::compute::{CastOptions, can_cast_types, cast_with_options};
use arrow::datatypes::{DataType, Field};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

use super::ExprValue;

const UNIX_EPOCH_DAY_OFFSET: i32 = 719_163;

fn parse_date32_value(value: &str) -> Result<i32, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.num_days_from_ce() - UNIX_EPOCH_DAY_OFFSET);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date().num_days_from_ce() - UNIX_EPOCH_DAY_OFFSET);
    }
    Err(format!("invalid date literal '{}'", value))
}

fn cast_utf8_to_date32(array: &ArrayRef) -> Result<ArrayRef, String> {
    let arr = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| "failed to downcast to StringArray".to_string())?;
    let mut builder = Date32Builder::with_capacity(arr.len());
    for i in 0..arr.len() {
        if arr.is_null(i) {
            builder.append_null();
        } else {
            builder.append_value(parse_date32_value(arr.value(i))?);
        }
    }
    Ok(Arc::new(builder.finish()))
}

/// Casts `array` to `to`. Overflowing numeric casts are errors rather than nulls.
pub fn cast_array(array: &ArrayRef, to: &DataType) -> Result<ArrayRef, String> {
    if array.data_type() == to {
        return Ok(Arc::clone(array));
    }
    if matches!(array.data_type(), DataType::Utf8) && matches!(to, DataType::Date32) {
        return cast_utf8_to_date32(array);
    }
    if !can_cast_types(array.data_type(), to) {
        return Err(format!(
            "cannot cast {:?} to {:?}",
            array.data_type(),
            to
        ));
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array.as_ref(), to, &options)
        .map_err(|e| format!("cast {:?} to {:?} failed: {}", array.data_type(), to, e))
}

fn is_signed(ty: &DataType) -> bool {
    matches!(
        ty,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
    )
}

fn is_unsigned(ty: &DataType) -> bool {
    matches!(
        ty,
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
    )
}

fn is_float(ty: &DataType) -> bool {
    matches!(
        ty,
        DataType::Float16 | DataType::Float32 | DataType::Float64
    )
}

pub fn is_integer(ty: &DataType) -> bool {
    is_signed(ty) || is_unsigned(ty)
}

pub fn is_numeric(ty: &DataType) -> bool {
    is_integer(ty) || is_float(ty)
}

fn integer_width(ty: &DataType) -> u8 {
    match ty {
        DataType::Int8 | DataType::UInt8 => 8,
        DataType::Int16 | DataType::UInt16 => 16,
        DataType::Int32 | DataType::UInt32 => 32,
        _ => 64,
    }
}

/// Smallest type both `left` and `right` cast to without losing their kind.
pub fn supertype(left: &DataType, right: &DataType) -> Result<DataType, String> {
    if left == right {
        return Ok(left.clone());
    }
    let out = match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (a, b) if is_signed(a) && is_signed(b) => {
            if integer_width(a) >= integer_width(b) {
                a.clone()
            } else {
                b.clone()
            }
        }
        (a, b) if is_unsigned(a) && is_unsigned(b) => {
            if integer_width(a) >= integer_width(b) {
                a.clone()
            } else {
                b.clone()
            }
        }
        (a, b) if is_integer(a) && is_integer(b) => DataType::Int64,
        (DataType::Float32, b) | (b, DataType::Float32) if is_integer(b) && integer_width(b) <= 16 => {
            DataType::Float32
        }
        (a, b) if is_numeric(a) && is_numeric(b) => DataType::Float64,
        (DataType::Boolean, other) | (other, DataType::Boolean) if is_numeric(other) => {
            other.clone()
        }
        (DataType::Utf8, DataType::Date32) | (DataType::Date32, DataType::Utf8) => {
            DataType::Date32
        }
        (DataType::List(a), DataType::List(b)) => {
            let inner = supertype(a.data_type(), b.data_type())?;
            DataType::List(Arc::new(Field::new("item", inner, true)))
        }
        _ => {
            return Err(format!(
                "cannot find a common type for {:?} and {:?}",
                left, right
            ));
        }
    };
    Ok(out)
}

pub fn supertype_of<'a, I>(types: I) -> Result<DataType, String>
where
    I: IntoIterator<Item = &'a DataType>,
{
    let mut out = DataType::Null;
    for ty in types {
        out = supertype(&out, ty)?;
    }
    Ok(out)
}

/// Casts both operands to their common type, preserving scalar/column shape.
pub fn coerce_pair(left: &ExprValue, right: &ExprValue) -> Result<(ExprValue, ExprValue), String> {
    let target = supertype(left.data_type(), right.data_type())?;
    let left = left.clone().map_array(|a| cast_array(a, &target))?;
    let right = right.clone().map_array(|a| cast_array(a, &target))?;
    Ok((left, right))
}
