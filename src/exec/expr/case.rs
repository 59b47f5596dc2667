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

use arrow::array::{ArrayRef, BooleanArray, NullArray, new_null_array};
use arrow::compute::kernels::zip::zip;
use arrow::datatypes::DataType;

use super::cast::{cast_array, supertype};
use super::{EvalScope, ExprArena, ExprId, ExprValue, common_len};

// when/then/otherwise; a null predicate selects the otherwise branch.
pub fn eval_when(
    arena: &ExprArena,
    scope: &EvalScope<'_>,
    predicate: ExprId,
    then: ExprId,
    otherwise: Option<ExprId>,
) -> Result<ExprValue, String> {
    let predicate = arena.eval_in(predicate, scope)?;
    let then = arena.eval_in(then, scope)?;
    let otherwise = match otherwise {
        Some(id) => arena.eval_in(id, scope)?,
        None => ExprValue::scalar(Arc::new(NullArray::new(1)))?,
    };

    let result_type = supertype(then.data_type(), otherwise.data_type())?;
    let len = common_len(&[&predicate, &then, &otherwise])?;
    let rows = len.unwrap_or(1);
    let wrap = |array: ArrayRef| match len {
        Some(_) => Ok(ExprValue::Column(array)),
        None => ExprValue::scalar(array),
    };
    if matches!(result_type, DataType::Null) {
        return wrap(new_null_array(&result_type, rows));
    }

    let mask = predicate.broadcast_to(rows)?;
    let mask = match mask.data_type() {
        DataType::Boolean | DataType::Null => cast_array(&mask, &DataType::Boolean)?,
        other => return Err(format!("when predicate must be boolean, got {:?}", other)),
    };
    let mask = mask
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "failed to downcast to BooleanArray".to_string())?;
    let then = cast_array(&then.broadcast_to(rows)?, &result_type)?;
    let otherwise = cast_array(&otherwise.broadcast_to(rows)?, &result_type)?;
    let out = zip(mask, &then, &otherwise).map_err(|e| format!("when: {}", e))?;
    wrap(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::Chunk;
    use crate::exec::expr::{BinaryOp, ExprNode, LiteralValue};
    use arrow::array::{Array, Int32Array, Int64Array};
    use arrow::datatypes::Field;

    #[test]
    fn missing_otherwise_yields_null() {
        let chunk = Chunk::from_columns(
            vec![Field::new("a", DataType::Int64, true)],
            vec![Arc::new(Int64Array::from(vec![1, 5, 9]))],
            3,
        )
        .unwrap();
        let mut arena = ExprArena::new();
        let a = arena.col("a");
        let limit = arena.lit(LiteralValue::Int64(4));
        let pred = arena.binary(BinaryOp::Gt, a, limit);
        let one = arena.lit(LiteralValue::Int32(1));
        let when = arena.push(ExprNode::When {
            predicate: pred,
            then: one,
            otherwise: None,
        });
        let out = arena.eval(when, &chunk).unwrap();
        let out = out.array().as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![None, Some(1), Some(1)]);
        assert!(out.is_null(0));
    }
}
