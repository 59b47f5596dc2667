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
//! Aggregations reduce an array to a single value (a length-1 array).

pub mod statistics;

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int64Array, ListArray, UInt32Array,
    UInt64Array, new_null_array,
};
use arrow::buffer::OffsetBuffer;
use arrow::compute::SortOptions;
use arrow::datatypes::{DataType, Field};
use hashbrown::HashSet;

use super::cast::cast_array;
use super::sort_key::encode_rows;

#[derive(Clone, Debug, PartialEq)]
pub enum AggFunction {
    Min,
    Max,
    Sum,
    Mean,
    Median,
    Std { ddof: u8 },
    Var { ddof: u8 },
    /// Nearest-rank quantile.
    Quantile { quantile: f64 },
    /// Number of rows, nulls included.
    Count,
    NUnique,
    First,
    Last,
    ArgMin,
    ArgMax,
    /// Collects the input into a single list value.
    Implode,
}

impl AggFunction {
    pub fn display(&self) -> String {
        match self {
            AggFunction::Min => "min()".to_string(),
            AggFunction::Max => "max()".to_string(),
            AggFunction::Sum => "sum()".to_string(),
            AggFunction::Mean => "mean()".to_string(),
            AggFunction::Median => "median()".to_string(),
            AggFunction::Std { ddof } => format!("std(ddof={})", ddof),
            AggFunction::Var { ddof } => format!("var(ddof={})", ddof),
            AggFunction::Quantile { quantile } => format!("quantile({:?})", quantile),
            AggFunction::Count => "count()".to_string(),
            AggFunction::NUnique => "n_unique()".to_string(),
            AggFunction::First => "first()".to_string(),
            AggFunction::Last => "last()".to_string(),
            AggFunction::ArgMin => "arg_min()".to_string(),
            AggFunction::ArgMax => "arg_max()".to_string(),
            AggFunction::Implode => "implode()".to_string(),
        }
    }
}

pub fn eval_agg(func: &AggFunction, array: &ArrayRef) -> Result<ArrayRef, String> {
    match func {
        AggFunction::Min => Ok(extreme_index(array, false)?
            .map(|idx| array.slice(idx, 1))
            .unwrap_or_else(|| new_null_array(array.data_type(), 1))),
        AggFunction::Max => Ok(extreme_index(array, true)?
            .map(|idx| array.slice(idx, 1))
            .unwrap_or_else(|| new_null_array(array.data_type(), 1))),
        AggFunction::Sum => sum(array),
        AggFunction::Mean => statistics::mean(array),
        AggFunction::Median => statistics::median(array),
        AggFunction::Std { ddof } => statistics::std(array, *ddof),
        AggFunction::Var { ddof } => statistics::var(array, *ddof),
        AggFunction::Quantile { quantile } => statistics::quantile(array, *quantile),
        AggFunction::Count => Ok(Arc::new(UInt32Array::from(vec![to_u32(array.len())?]))),
        AggFunction::NUnique => n_unique(array),
        AggFunction::First => Ok(if array.is_empty() {
            new_null_array(array.data_type(), 1)
        } else {
            array.slice(0, 1)
        }),
        AggFunction::Last => Ok(if array.is_empty() {
            new_null_array(array.data_type(), 1)
        } else {
            array.slice(array.len() - 1, 1)
        }),
        AggFunction::ArgMin => arg_extreme(array, false),
        AggFunction::ArgMax => arg_extreme(array, true),
        AggFunction::Implode => implode(array),
    }
}

pub(crate) fn to_u32(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{} overflows UInt32", value))
}

/// True at `idx` for a valid float NaN.
fn nan_at(array: &ArrayRef) -> impl Fn(usize) -> bool + '_ {
    let f64s = array.as_any().downcast_ref::<Float64Array>();
    let f32s = array.as_any().downcast_ref::<Float32Array>();
    move |idx| match (f64s, f32s) {
        (Some(values), _) => values.is_valid(idx) && values.value(idx).is_nan(),
        (_, Some(values)) => values.is_valid(idx) && values.value(idx).is_nan(),
        _ => false,
    }
}

/// Position of the smallest (or largest) non-null value; ties keep the first occurrence.
/// Row encoding orders NaN above every number, so NaN is skipped unless nothing else is left.
pub(crate) fn extreme_index(array: &ArrayRef, largest: bool) -> Result<Option<usize>, String> {
    if array.logical_null_count() == array.len() {
        return Ok(None);
    }
    let rows = encode_rows(std::slice::from_ref(array), SortOptions::default())?;
    let is_nan = nan_at(array);
    let mut first_nan: Option<usize> = None;
    let mut best: Option<usize> = None;
    for idx in 0..array.len() {
        if array.is_null(idx) {
            continue;
        }
        if is_nan(idx) {
            if first_nan.is_none() {
                first_nan = Some(idx);
            }
            continue;
        }
        best = match best {
            None => Some(idx),
            Some(current) => {
                let ord = rows.row(idx).cmp(&rows.row(current));
                let better = if largest { ord.is_gt() } else { ord.is_lt() };
                if better { Some(idx) } else { Some(current) }
            }
        };
    }
    Ok(best.or(first_nan))
}

fn arg_extreme(array: &ArrayRef, largest: bool) -> Result<ArrayRef, String> {
    let idx = match extreme_index(array, largest)? {
        Some(idx) => Some(to_u32(idx)?),
        None => None,
    };
    Ok(Arc::new(UInt32Array::from(vec![idx])))
}

/// Sum type: signed integers widen to Int64, unsigned to UInt64, booleans count as UInt32.
pub(crate) fn sum_type(data_type: &DataType) -> Result<DataType, String> {
    match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::Null => {
            Ok(DataType::Int64)
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            Ok(DataType::UInt64)
        }
        DataType::Boolean => Ok(DataType::UInt32),
        DataType::Float32 => Ok(DataType::Float32),
        DataType::Float64 => Ok(DataType::Float64),
        other => Err(format!("sum is not supported for {:?}", other)),
    }
}

// Empty and all-null inputs sum to zero.
fn sum(array: &ArrayRef) -> Result<ArrayRef, String> {
    let target = sum_type(array.data_type())?;
    let out: ArrayRef = match target {
        DataType::Int64 => {
            let values = cast_array(array, &DataType::Int64)?;
            let values = downcast::<Int64Array>(&values)?;
            let mut acc: i64 = 0;
            for v in values.iter().flatten() {
                acc = acc
                    .checked_add(v)
                    .ok_or_else(|| "sum overflowed Int64".to_string())?;
            }
            Arc::new(Int64Array::from(vec![acc]))
        }
        DataType::UInt64 => {
            let values = cast_array(array, &DataType::UInt64)?;
            let values = downcast::<UInt64Array>(&values)?;
            let mut acc: u64 = 0;
            for v in values.iter().flatten() {
                acc = acc
                    .checked_add(v)
                    .ok_or_else(|| "sum overflowed UInt64".to_string())?;
            }
            Arc::new(UInt64Array::from(vec![acc]))
        }
        DataType::UInt32 => {
            let values = downcast::<BooleanArray>(array)?;
            let trues = values.iter().flatten().filter(|v| *v).count();
            Arc::new(UInt32Array::from(vec![to_u32(trues)?]))
        }
        DataType::Float32 => {
            let values = downcast::<Float32Array>(array)?;
            let acc: f32 = values.iter().flatten().sum();
            Arc::new(Float32Array::from(vec![acc]))
        }
        _ => {
            let values = downcast::<Float64Array>(array)?;
            let acc: f64 = values.iter().flatten().sum();
            Arc::new(Float64Array::from(vec![acc]))
        }
    };
    Ok(out)
}

// Nulls count as one distinct value.
fn n_unique(array: &ArrayRef) -> Result<ArrayRef, String> {
    if array.is_empty() {
        return Ok(Arc::new(UInt32Array::from(vec![0u32])));
    }
    let rows = encode_rows(std::slice::from_ref(array), SortOptions::default())?;
    let distinct: HashSet<_> = (0..array.len()).map(|idx| rows.row(idx)).collect();
    Ok(Arc::new(UInt32Array::from(vec![to_u32(distinct.len())?])))
}

pub(crate) fn implode(array: &ArrayRef) -> Result<ArrayRef, String> {
    let field = Arc::new(Field::new("item", array.data_type().clone(), true));
    let offsets = OffsetBuffer::from_lengths([array.len()]);
    let list = ListArray::try_new(field, offsets, Arc::clone(array), None)
        .map_err(|e| format!("implode: {}", e))?;
    Ok(Arc::new(list))
}

pub(crate) fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T, String> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        format!(
            "failed to downcast {:?} to {}",
            array.data_type(),
            std::any::type_name::<T>()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};

    fn agg(func: AggFunction, array: ArrayRef) -> ArrayRef {
        eval_agg(&func, &array).expect("agg")
    }

    #[test]
    fn sum_widens_and_defaults_to_zero() {
        let out = agg(
            AggFunction::Sum,
            Arc::new(Int32Array::from(vec![Some(1), None, Some(2)])),
        );
        assert_eq!(downcast::<Int64Array>(&out).unwrap().value(0), 3);
        let out = agg(AggFunction::Sum, Arc::new(Int32Array::from(vec![None, None])));
        let out = downcast::<Int64Array>(&out).unwrap();
        assert!(out.is_valid(0));
        assert_eq!(out.value(0), 0);
    }

    #[test]
    fn min_max_skip_nulls() {
        let array: ArrayRef = Arc::new(StringArray::from(vec![Some("b"), None, Some("a")]));
        let out = agg(AggFunction::Min, array.clone());
        assert_eq!(downcast::<StringArray>(&out).unwrap().value(0), "a");
        let out = agg(AggFunction::ArgMax, array);
        assert_eq!(downcast::<UInt32Array>(&out).unwrap().value(0), 0);
        let out = agg(AggFunction::Max, Arc::new(Int32Array::from(vec![None::<i32>])));
        assert!(out.is_null(0));
    }

    #[test]
    fn min_max_skip_nan() {
        let array: ArrayRef = Arc::new(Float64Array::from(vec![4.0, f64::NAN, 5.0]));
        let out = agg(AggFunction::Max, array.clone());
        assert_eq!(downcast::<Float64Array>(&out).unwrap().value(0), 5.0);
        let out = agg(AggFunction::ArgMax, array.clone());
        assert_eq!(downcast::<UInt32Array>(&out).unwrap().value(0), 2);
        let out = agg(AggFunction::Min, array);
        assert_eq!(downcast::<Float64Array>(&out).unwrap().value(0), 4.0);
        let only_nan: ArrayRef = Arc::new(Float32Array::from(vec![Some(f32::NAN), None]));
        let out = agg(AggFunction::Max, only_nan);
        assert!(downcast::<Float32Array>(&out).unwrap().value(0).is_nan());
    }

    #[test]
    fn count_includes_nulls_n_unique_counts_null_once() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), None, Some(1), None]));
        let out = agg(AggFunction::Count, array.clone());
        assert_eq!(downcast::<UInt32Array>(&out).unwrap().value(0), 4);
        let out = agg(AggFunction::NUnique, array);
        assert_eq!(downcast::<UInt32Array>(&out).unwrap().value(0), 2);
    }

    #[test]
    fn implode_wraps_values_in_one_list() {
        let out = agg(AggFunction::Implode, Arc::new(Int32Array::from(vec![1, 2, 3])));
        let list = downcast::<ListArray>(&out).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.value_length(0), 3);
    }
}
