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
//! Length-preserving transforms and other row-shaped functions.
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int64Array, UInt32Array, UInt64Array,
    new_null_array,
};
use arrow::compute::kernels::numeric::sub;
use arrow::compute::{SortOptions, concat, take};
use arrow::datatypes::DataType;

use super::agg::{AggFunction, downcast, eval_agg, sum_type, to_u32};
use super::cast::{cast_array, is_numeric};
use super::literal::scalar_array;
use super::sort_key::{encode_rows, sort_indices, sort_options};
use super::{ExprValue, LiteralValue, common_len};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RankMethod {
    Average,
    Min,
    Max,
    Dense,
    Ordinal,
}

#[derive(Clone, Debug)]
pub enum TransformFunction {
    /// Positive periods shift values down; vacated slots take `fill` (null by default).
    Shift {
        periods: i64,
        fill: Option<LiteralValue>,
    },
    Diff {
        periods: i64,
    },
    CumSum,
    CumMin,
    CumMax,
    /// Running count of non-null values.
    CumCount,
    Rank {
        method: RankMethod,
        descending: bool,
    },
    Reverse,
    /// Run-length id: increments whenever the value differs from the previous row.
    RleId,
}

impl TransformFunction {
    pub fn display(&self) -> String {
        match self {
            TransformFunction::Shift { periods, fill } => {
                let mut out = format!("shift({}", periods);
                if let Some(fill) = fill {
                    out.push_str(", fill_value=");
                    super::literal::write_literal(fill, &mut out);
                }
                out.push(')');
                out
            }
            TransformFunction::Diff { periods } => format!("diff({})", periods),
            TransformFunction::CumSum => "cum_sum()".to_string(),
            TransformFunction::CumMin => "cum_min()".to_string(),
            TransformFunction::CumMax => "cum_max()".to_string(),
            TransformFunction::CumCount => "cum_count()".to_string(),
            TransformFunction::Rank { method, descending } => {
                format!("rank({:?}, descending={})", method, descending)
            }
            TransformFunction::Reverse => "reverse()".to_string(),
            TransformFunction::RleId => "rle_id()".to_string(),
        }
    }
}

pub fn eval_transform(func: &TransformFunction, value: ExprValue) -> Result<ExprValue, String> {
    value.map_array(|array| match func {
        TransformFunction::Shift { periods, fill } => shift(array, *periods, fill.as_ref()),
        TransformFunction::Diff { periods } => diff(array, *periods),
        TransformFunction::CumSum => cum_sum(array),
        TransformFunction::CumMin => cum_extreme(array, false),
        TransformFunction::CumMax => cum_extreme(array, true),
        TransformFunction::CumCount => cum_count(array),
        TransformFunction::Rank { method, descending } => rank(array, *method, *descending),
        TransformFunction::Reverse => reverse(array),
        TransformFunction::RleId => rle_id(array),
    })
}

pub fn shift(
    array: &ArrayRef,
    periods: i64,
    fill: Option<&LiteralValue>,
) -> Result<ArrayRef, String> {
    let len = array.len();
    let k = (periods.unsigned_abs() as usize).min(len);
    if k == 0 {
        return Ok(Arc::clone(array));
    }
    let filler = match fill {
        Some(value) => {
            let value = cast_array(&scalar_array(value)?, array.data_type())?;
            super::repeat_scalar(&value, k)?
        }
        None => new_null_array(array.data_type(), k),
    };
    let (head, tail) = if periods > 0 {
        (filler, array.slice(0, len - k))
    } else {
        (array.slice(k, len - k), filler)
    };
    concat(&[head.as_ref(), tail.as_ref()]).map_err(|e| format!("shift: {}", e))
}

fn diff(array: &ArrayRef, periods: i64) -> Result<ArrayRef, String> {
    if !is_numeric(array.data_type()) {
        return Err(format!("diff is not supported for {:?}", array.data_type()));
    }
    let shifted = shift(array, periods, None)?;
    sub(array, &shifted).map_err(|e| format!("diff: {}", e))
}

fn cum_sum(array: &ArrayRef) -> Result<ArrayRef, String> {
    let target = sum_type(array.data_type())?;
    let out: ArrayRef = match target {
        DataType::Int64 | DataType::UInt32 => {
            let values = cast_array(array, &DataType::Int64)?;
            let values = downcast::<Int64Array>(&values)?;
            let mut acc: i64 = 0;
            let mut out = Vec::with_capacity(values.len());
            for v in values.iter() {
                out.push(match v {
                    Some(v) => {
                        acc = acc
                            .checked_add(v)
                            .ok_or_else(|| "cum_sum overflowed Int64".to_string())?;
                        Some(acc)
                    }
                    None => None,
                });
            }
            cast_array(&(Arc::new(Int64Array::from(out)) as ArrayRef), &target)?
        }
        DataType::UInt64 => {
            let values = cast_array(array, &DataType::UInt64)?;
            let values = downcast::<UInt64Array>(&values)?;
            let mut acc: u64 = 0;
            let mut out = Vec::with_capacity(values.len());
            for v in values.iter() {
                out.push(match v {
                    Some(v) => {
                        acc = acc
                            .checked_add(v)
                            .ok_or_else(|| "cum_sum overflowed UInt64".to_string())?;
                        Some(acc)
                    }
                    None => None,
                });
            }
            Arc::new(UInt64Array::from(out))
        }
        _ => {
            let values = cast_array(array, &DataType::Float64)?;
            let values = downcast::<Float64Array>(&values)?;
            let mut acc = 0.0f64;
            let out: Float64Array = values
                .iter()
                .map(|v| {
                    v.map(|v| {
                        acc += v;
                        acc
                    })
                })
                .collect();
            if target == DataType::Float32 {
                let out: Float32Array = out.iter().map(|v| v.map(|v| v as f32)).collect();
                Arc::new(out)
            } else {
                Arc::new(out)
            }
        }
    };
    Ok(out)
}

// Nulls stay null and do not reset the running extreme.
fn cum_extreme(array: &ArrayRef, largest: bool) -> Result<ArrayRef, String> {
    if array.logical_null_count() == array.len() {
        return Ok(Arc::clone(array));
    }
    let rows = encode_rows(std::slice::from_ref(array), SortOptions::default())?;
    let mut best: Option<usize> = None;
    let mut indices: Vec<Option<u32>> = Vec::with_capacity(array.len());
    for idx in 0..array.len() {
        if array.is_null(idx) {
            indices.push(None);
            continue;
        }
        let keep = match best {
            None => idx,
            Some(current) => {
                let ord = rows.row(idx).cmp(&rows.row(current));
                let better = if largest { ord.is_gt() } else { ord.is_lt() };
                if better { idx } else { current }
            }
        };
        best = Some(keep);
        indices.push(Some(to_u32(keep)?));
    }
    take(array.as_ref(), &UInt32Array::from(indices), None).map_err(|e| format!("cum_min/max: {}", e))
}

fn cum_count(array: &ArrayRef) -> Result<ArrayRef, String> {
    let mut count: u32 = 0;
    let mut out = Vec::with_capacity(array.len());
    let all_null = array.logical_null_count() == array.len();
    for idx in 0..array.len() {
        if !all_null && array.is_valid(idx) {
            count += 1;
        }
        out.push(count);
    }
    Ok(Arc::new(UInt32Array::from(out)))
}

fn rank(array: &ArrayRef, method: RankMethod, descending: bool) -> Result<ArrayRef, String> {
    let len = array.len();
    let all_null = array.logical_null_count() == len;
    let options = sort_options(descending, true);
    let order = sort_indices(std::slice::from_ref(array), len, options)?;
    let valid: Vec<usize> = order
        .iter()
        .map(|&i| i as usize)
        .filter(|&i| !all_null && array.is_valid(i))
        .collect();
    let rows = if valid.is_empty() {
        None
    } else {
        Some(encode_rows(std::slice::from_ref(array), options)?)
    };

    let mut min_rank: Vec<Option<usize>> = vec![None; len];
    let mut max_rank: Vec<Option<usize>> = vec![None; len];
    let mut dense: Vec<Option<usize>> = vec![None; len];
    let mut ordinal: Vec<Option<usize>> = vec![None; len];
    let mut start = 0usize;
    let mut group = 0usize;
    while start < valid.len() {
        let mut end = start + 1;
        if let Some(rows) = &rows {
            while end < valid.len() && rows.row(valid[end]) == rows.row(valid[start]) {
                end += 1;
            }
        }
        group += 1;
        for (offset, &row) in valid[start..end].iter().enumerate() {
            min_rank[row] = Some(start + 1);
            max_rank[row] = Some(end);
            dense[row] = Some(group);
            ordinal[row] = Some(start + offset + 1);
        }
        start = end;
    }

    let as_u32 = |ranks: Vec<Option<usize>>| -> Result<ArrayRef, String> {
        let mut out = Vec::with_capacity(ranks.len());
        for r in ranks {
            out.push(match r {
                Some(r) => Some(to_u32(r)?),
                None => None,
            });
        }
        Ok(Arc::new(UInt32Array::from(out)))
    };
    match method {
        RankMethod::Min => as_u32(min_rank),
        RankMethod::Max => as_u32(max_rank),
        RankMethod::Dense => as_u32(dense),
        RankMethod::Ordinal => as_u32(ordinal),
        RankMethod::Average => {
            let out: Float64Array = min_rank
                .iter()
                .zip(max_rank.iter())
                .map(|(lo, hi)| Some((lo.as_ref()? + hi.as_ref()?) as f64 / 2.0))
                .collect();
            Ok(Arc::new(out))
        }
    }
}

fn reverse(array: &ArrayRef) -> Result<ArrayRef, String> {
    let len = to_u32(array.len())?;
    let indices: UInt32Array = (0..len).rev().collect::<Vec<u32>>().into();
    take(array.as_ref(), &indices, None).map_err(|e| format!("reverse: {}", e))
}

fn rle_id(array: &ArrayRef) -> Result<ArrayRef, String> {
    if array.is_empty() {
        return Ok(Arc::new(UInt32Array::from(Vec::<u32>::new())));
    }
    let rows = encode_rows(std::slice::from_ref(array), SortOptions::default())?;
    let mut id: u32 = 0;
    let mut out = Vec::with_capacity(array.len());
    out.push(0u32);
    for idx in 1..array.len() {
        if rows.row(idx) != rows.row(idx - 1) {
            id += 1;
        }
        out.push(id);
    }
    Ok(Arc::new(UInt32Array::from(out)))
}

/// Evaluates `agg` over every prefix of `array`. Prefixes with fewer than `min_periods`
/// non-null values produce null.
pub fn cumulative_eval(
    array: &ArrayRef,
    agg: &AggFunction,
    min_periods: usize,
) -> Result<ArrayRef, String> {
    let empty = eval_agg(agg, &array.slice(0, 0))?;
    let out_type = empty.data_type().clone();
    let all_null = array.logical_null_count() == array.len();
    let mut parts: Vec<ArrayRef> = Vec::with_capacity(array.len());
    let mut non_null = 0usize;
    for idx in 0..array.len() {
        if !all_null && array.is_valid(idx) {
            non_null += 1;
        }
        if non_null < min_periods {
            parts.push(new_null_array(&out_type, 1));
        } else {
            let value = eval_agg(agg, &array.slice(0, idx + 1))?;
            parts.push(cast_array(&value, &out_type)?);
        }
    }
    if parts.is_empty() {
        return Ok(new_null_array(&out_type, 0));
    }
    let refs: Vec<&dyn Array> = parts.iter().map(|a| a.as_ref()).collect();
    concat(&refs).map_err(|e| format!("cumulative_eval: {}", e))
}

/// Stable sort of `value` by `keys` (by itself when `keys` is empty).
pub fn sort_by(
    value: ExprValue,
    keys: &[ExprValue],
    descending: bool,
    nulls_last: bool,
) -> Result<ExprValue, String> {
    if value.is_scalar() {
        return Ok(value);
    }
    let array = value.into_array();
    let len = array.len();
    let key_arrays = if keys.is_empty() {
        vec![Arc::clone(&array)]
    } else {
        keys.iter()
            .map(|k| k.broadcast_to(len))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("sort_by: {}", e))?
    };
    let order = sort_indices(&key_arrays, len, sort_options(descending, nulls_last))?;
    let out = take(array.as_ref(), &UInt32Array::from(order), None)
        .map_err(|e| format!("sort_by: {}", e))?;
    Ok(ExprValue::Column(out))
}

fn bound(value: &ExprValue, name: &str) -> Result<i64, String> {
    if !value.is_scalar() {
        return Err(format!("int_range expects a scalar {} bound", name));
    }
    let array = cast_array(value.array(), &DataType::Int64)?;
    let array = downcast::<Int64Array>(&array)?;
    if array.is_null(0) {
        return Err(format!("int_range {} bound is null", name));
    }
    Ok(array.value(0))
}

/// Integers in `[start, end)`.
pub fn int_range(start: &ExprValue, end: &ExprValue) -> Result<ExprValue, String> {
    common_len(&[start, end])?;
    let start = bound(start, "start")?;
    let end = bound(end, "end")?;
    let values: Vec<i64> = (start..end.max(start)).collect();
    Ok(ExprValue::Column(Arc::new(Int64Array::from(values))))
}
