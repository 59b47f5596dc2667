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

use arrow::array::{ArrayRef, StructArray};
use arrow::datatypes::{Field, Fields};

use super::{EvalScope, ExprArena, ExprId, ExprValue, common_len};

pub fn eval_struct(
    arena: &ExprArena,
    scope: &EvalScope<'_>,
    fields: &[(String, ExprId)],
) -> Result<ExprValue, String> {
    if fields.is_empty() {
        return Err("struct requires at least one field".to_string());
    }
    let mut values = Vec::with_capacity(fields.len());
    for (_, id) in fields {
        values.push(arena.eval_in(*id, scope)?);
    }
    let refs: Vec<&ExprValue> = values.iter().collect();
    let len = common_len(&refs)?;
    let rows = len.unwrap_or(1);

    let mut struct_fields = Vec::with_capacity(fields.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len());
    for ((name, _), value) in fields.iter().zip(values.iter()) {
        struct_fields.push(Field::new(name, value.data_type().clone(), true));
        columns.push(value.broadcast_to(rows)?);
    }
    let array = StructArray::try_new(Fields::from(struct_fields), columns, None)
        .map_err(|e| format!("struct: {}", e))?;
    let array: ArrayRef = Arc::new(array);
    match len {
        Some(_) => Ok(ExprValue::Column(array)),
        None => ExprValue::scalar(array),
    }
}
