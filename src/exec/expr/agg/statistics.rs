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

use arrow::array::{Array, ArrayRef, Float32Array, Float64Array};
use arrow::datatypes::DataType;

use super::downcast;
use crate::exec::expr::cast::{cast_array, is_numeric};

fn non_null_values(array: &ArrayRef, op: &str) -> Result<Vec<f64>, String> {
    let ty = array.data_type();
    if !(is_numeric(ty) || matches!(ty, DataType::Boolean | DataType::Null)) {
        return Err(format!("{} is not supported for {:?}", op, ty));
    }
    let values = cast_array(array, &DataType::Float64)?;
    Ok(downcast::<Float64Array>(&values)?.iter().flatten().collect())
}

fn float_result(value: Option<f64>, input: &DataType) -> ArrayRef {
    match input {
        DataType::Float32 => Arc::new(Float32Array::from(vec![value.map(|v| v as f32)])),
        _ => Arc::new(Float64Array::from(vec![value])),
    }
}

pub fn mean(array: &ArrayRef) -> Result<ArrayRef, String> {
    let values = non_null_values(array, "mean")?;
    let out = if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    };
    Ok(float_result(out, array.data_type()))
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

pub fn median(array: &ArrayRef) -> Result<ArrayRef, String> {
    let values = sorted(non_null_values(array, "median")?);
    let n = values.len();
    let out = match n {
        0 => None,
        n if n % 2 == 1 => Some(values[n / 2]),
        n => Some((values[n / 2 - 1] + values[n / 2]) / 2.0),
    };
    Ok(float_result(out, array.data_type()))
}

fn variance(values: &[f64], ddof: u8) -> Option<f64> {
    let n = values.len();
    if n == 0 || n <= ddof as usize {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let squares: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some(squares / (n - ddof as usize) as f64)
}

pub fn var(array: &ArrayRef, ddof: u8) -> Result<ArrayRef, String> {
    let values = non_null_values(array, "var")?;
    Ok(float_result(variance(&values, ddof), array.data_type()))
}

pub fn std(array: &ArrayRef, ddof: u8) -> Result<ArrayRef, String> {
    let values = non_null_values(array, "std")?;
    Ok(float_result(
        variance(&values, ddof).map(f64::sqrt),
        array.data_type(),
    ))
}

/// Nearest-rank quantile over the non-null values; always Float64.
pub fn quantile(array: &ArrayRef, q: f64) -> Result<ArrayRef, String> {
    if !(0.0..=1.0).contains(&q) {
        return Err(format!("quantile should be between 0.0 and 1.0, got {}", q));
    }
    let values = sorted(non_null_values(array, "quantile")?);
    let out = if values.is_empty() {
        None
    } else {
        let idx = ((values.len() - 1) as f64 * q).round() as usize;
        Some(values[idx.min(values.len() - 1)])
    };
    Ok(Arc::new(Float64Array::from(vec![out])))
}

/// Pearson correlation over rows where both sides are non-null.
pub fn corr(left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, String> {
    if left.len() != right.len() {
        return Err(format!(
            "corr requires equal lengths, got {} and {}",
            left.len(),
            right.len()
        ));
    }
    let l = cast_array(left, &DataType::Float64)?;
    let r = cast_array(right, &DataType::Float64)?;
    let l = downcast::<Float64Array>(&l)?;
    let r = downcast::<Float64Array>(&r)?;
    let pairs: Vec<(f64, f64)> = l
        .iter()
        .zip(r.iter())
        .filter_map(|(a, b)| Some((a?, b?)))
        .collect();
    if pairs.len() < 2 {
        return Ok(Arc::new(Float64Array::from(vec![None::<f64>])));
    }
    let n = pairs.len() as f64;
    let mean_l = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_r = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_l = 0.0;
    let mut var_r = 0.0;
    for (a, b) in &pairs {
        cov += (a - mean_l) * (b - mean_r);
        var_l += (a - mean_l) * (a - mean_l);
        var_r += (b - mean_r) * (b - mean_r);
    }
    Ok(Arc::new(Float64Array::from(vec![
        cov / (var_l.sqrt() * var_r.sqrt()),
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;

    fn value(array: &ArrayRef) -> Option<f64> {
        let array = downcast::<Float64Array>(array).unwrap();
        if array.is_null(0) { None } else { Some(array.value(0)) }
    }

    #[test]
    fn quantile_picks_nearest_rank() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5]));
        assert_eq!(value(&quantile(&array, 0.9).unwrap()), Some(5.0));
        assert_eq!(value(&quantile(&array, 0.5).unwrap()), Some(3.0));
        assert!(quantile(&array, 1.5).is_err());
    }

    #[test]
    fn variance_needs_more_rows_than_ddof() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![4]));
        assert_eq!(value(&var(&array, 1).unwrap()), None);
        assert_eq!(value(&var(&array, 0).unwrap()), Some(0.0));
        let array: ArrayRef = Arc::new(Int64Array::from(vec![1, 3]));
        assert_eq!(value(&std(&array, 1).unwrap()), Some(2.0f64.sqrt()));
    }

    #[test]
    fn median_interpolates_even_counts() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![Some(4), None, Some(1), Some(2), Some(3)]));
        assert_eq!(value(&median(&array).unwrap()), Some(2.5));
    }

    #[test]
    fn corr_of_linear_series_is_one() {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let b: ArrayRef = Arc::new(Float64Array::from(vec![2.0, 4.0, 6.0]));
        let out = value(&corr(&a, &b).unwrap()).unwrap();
        assert!((out - 1.0).abs() < 1e-12);
    }
}
