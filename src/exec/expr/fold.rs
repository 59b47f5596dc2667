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
use super::{BinaryOp, EvalScope, ExprArena, ExprId, ExprValue, eval_binary};

/// Left fold of `inputs` into `acc` with `op`. With `returns_scalar` the result must reduce to
/// a single value.
pub fn eval_fold(
    arena: &ExprArena,
    scope: &EvalScope<'_>,
    acc: ExprId,
    inputs: &[ExprId],
    op: BinaryOp,
    returns_scalar: bool,
) -> Result<ExprValue, String> {
    let mut acc = arena.eval_in(acc, scope)?;
    for input in inputs {
        let value = arena.eval_in(*input, scope)?;
        acc = eval_binary(op, &acc, &value)?;
    }
    if !returns_scalar {
        return Ok(acc);
    }
    match acc {
        ExprValue::Scalar(_) => Ok(acc),
        ExprValue::Column(array) if array.len() == 1 => ExprValue::scalar(array),
        ExprValue::Column(array) => Err(format!(
            "invalid operation: fold declared returns_scalar but produced {} values",
            array.len()
        )),
    }
}
