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

use arrow::array::{Array, ArrayRef, BooleanArray, ListArray, UInt32Array, new_null_array};
use arrow::buffer::OffsetBuffer;
use arrow::compute::{SortOptions, concat, take};
use arrow::datatypes::{DataType, Field};
use hashbrown::HashSet;

use super::agg::downcast;
use super::cast::{cast_array, supertype, supertype_of};
use super::sort_key::encode_rows;
use super::{ExprValue, common_len};

fn shaped(len: Option<usize>, array: ArrayRef) -> Result<ExprValue, String> {
    match len {
        Some(_) => Ok(ExprValue::Column(array)),
        None => ExprValue::scalar(array),
    }
}

/// Flattens a list column; empty and null lists become a single null row.
pub fn explode(value: &ExprValue) -> Result<ExprValue, String> {
    let array = value.array();
    let DataType::List(_) = array.data_type() else {
        return Ok(ExprValue::Column(Arc::clone(array)));
    };
    let list = downcast::<ListArray>(array)?;
    let offsets = list.value_offsets();
    let mut indices: Vec<Option<u32>> = Vec::with_capacity(list.values().len());
    for row in 0..list.len() {
        let (start, end) = (offsets[row] as usize, offsets[row + 1] as usize);
        if list.is_null(row) || start == end {
            indices.push(None);
            continue;
        }
        for idx in start..end {
            indices.push(Some(
                u32::try_from(idx).map_err(|_| "explode: list too large".to_string())?,
            ));
        }
    }
    let out = take(list.values().as_ref(), &UInt32Array::from(indices), None)
        .map_err(|e| format!("explode: {}", e))?;
    Ok(ExprValue::Column(out))
}

fn as_list(array: ArrayRef) -> Result<ArrayRef, String> {
    if matches!(array.data_type(), DataType::List(_)) {
        return Ok(array);
    }
    let field = Arc::new(Field::new("item", array.data_type().clone(), true));
    let offsets = OffsetBuffer::from_lengths(std::iter::repeat_n(1, array.len()));
    let list = ListArray::try_new(field, offsets, array, None).map_err(|e| e.to_string())?;
    Ok(Arc::new(list))
}

/// Row-wise concatenation of lists; non-list inputs contribute one element per row.
pub fn concat_list(values: &[ExprValue]) -> Result<ExprValue, String> {
    if values.is_empty() {
        return Err("concat_list requires at least one input".to_string());
    }
    let refs: Vec<&ExprValue> = values.iter().collect();
    let len = common_len(&refs)?;
    let rows = len.unwrap_or(1);

    let mut lists = Vec::with_capacity(values.len());
    for value in values {
        lists.push(as_list(value.broadcast_to(rows)?)?);
    }
    let inner_types: Vec<DataType> = lists
        .iter()
        .map(|l| match l.data_type() {
            DataType::List(f) => f.data_type().clone(),
            other => other.clone(),
        })
        .collect();
    let inner = supertype_of(inner_types.iter())?;
    let target = DataType::List(Arc::new(Field::new("item", inner.clone(), true)));
    let mut casted = Vec::with_capacity(lists.len());
    for list in &lists {
        casted.push(cast_array(list, &target)?);
    }
    let lists: Vec<&ListArray> = casted
        .iter()
        .map(downcast::<ListArray>)
        .collect::<Result<_, _>>()?;

    let mut pieces: Vec<ArrayRef> = Vec::new();
    let mut lengths = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut row_len = 0usize;
        for list in &lists {
            if list.is_null(row) {
                continue;
            }
            let piece = list.value(row);
            row_len += piece.len();
            pieces.push(piece);
        }
        lengths.push(row_len);
    }
    let values_array = if pieces.is_empty() {
        new_null_array(&inner, 0)
    } else {
        let refs: Vec<&dyn Array> = pieces.iter().map(|p| p.as_ref()).collect();
        concat(&refs).map_err(|e| format!("concat_list: {}", e))?
    };
    let field = Arc::new(Field::new("item", inner, true));
    let out = ListArray::try_new(field, OffsetBuffer::from_lengths(lengths), values_array, None)
        .map_err(|e| format!("concat_list: {}", e))?;
    shaped(len, Arc::new(out))
}

/// Membership test. A list-typed `set` is matched row by row, any other `set` is one bag of values.
pub fn is_in(element: &ExprValue, set: &ExprValue) -> Result<ExprValue, String> {
    if let DataType::List(field) = set.data_type() {
        let len = common_len(&[element, set])?;
        let rows = len.unwrap_or(1);
        let target = supertype(element.data_type(), field.data_type())?;
        if matches!(target, DataType::Null) {
            return shaped(len, new_null_array(&DataType::Boolean, rows));
        }
        let elements = cast_array(&element.broadcast_to(rows)?, &target)?;
        let lists = set.broadcast_to(rows)?;
        let lists = downcast::<ListArray>(&lists)?;
        let values = cast_array(lists.values(), &target)?;
        let combined = concat(&[elements.as_ref(), values.as_ref()]).map_err(|e| e.to_string())?;
        let encoded = encode_rows(&[combined], SortOptions::default())?;
        let offsets = lists.value_offsets();
        let mut out = Vec::with_capacity(rows);
        for row in 0..rows {
            if elements.is_null(row) || lists.is_null(row) {
                out.push(None);
                continue;
            }
            let (start, end) = (offsets[row] as usize, offsets[row + 1] as usize);
            let needle = encoded.row(row);
            out.push(Some(
                (start..end).any(|j| values.is_valid(j) && encoded.row(rows + j) == needle),
            ));
        }
        return shaped(len, Arc::new(BooleanArray::from(out)));
    }

    let len = if element.is_scalar() {
        None
    } else {
        Some(element.len())
    };
    let target = supertype(element.data_type(), set.data_type())?;
    if matches!(target, DataType::Null) {
        return shaped(len, new_null_array(&DataType::Boolean, element.len()));
    }
    let elements = cast_array(element.array(), &target)?;
    let values = cast_array(set.array(), &target)?;
    let combined = concat(&[elements.as_ref(), values.as_ref()]).map_err(|e| e.to_string())?;
    let encoded = encode_rows(&[combined], SortOptions::default())?;
    let offset = elements.len();
    let bag: HashSet<_> = (0..values.len())
        .filter(|&j| values.is_valid(j))
        .map(|j| encoded.row(offset + j))
        .collect();
    let out: BooleanArray = (0..elements.len())
        .map(|i| {
            if elements.is_null(i) {
                None
            } else {
                Some(bag.contains(&encoded.row(i)))
            }
        })
        .collect();
    shaped(len, Arc::new(out))
}
