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
//! Length and type checks between evaluation and mapping.
use arrow::datatypes::DataType;

use super::MappingStrategy;
use super::error::WindowError;
use super::partition::PartitionIndex;
use crate::exec::expr::ExprValue;
use crate::exec::expr::cast::supertype_of;

fn length_ok(mapping: MappingStrategy, group_len: usize, value: &ExprValue) -> bool {
    match mapping {
        MappingStrategy::GroupToRows => value.len() == 1 || value.len() == group_len,
        MappingStrategy::Join => true,
        MappingStrategy::Explode => value.len() == group_len,
    }
}

/// Checks every partition result against its group length and returns the unified result type.
pub(crate) fn validate(
    results: &[ExprValue],
    index: &PartitionIndex,
    mapping: MappingStrategy,
    expr: &str,
) -> Result<DataType, WindowError> {
    for (p, value) in results.iter().enumerate() {
        let group_len = index.partition_len(p);
        if !length_ok(mapping, group_len, value) {
            return Err(WindowError::LengthMismatch {
                expr: expr.to_string(),
                strategy: mapping,
                group_len,
                actual: value.len(),
            });
        }
    }
    supertype_of(results.iter().map(|v| v.data_type()))
        .map_err(|e| WindowError::sub_expression(expr, format!("partition results disagree: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array};
    use std::sync::Arc;

    fn index() -> PartitionIndex {
        let keys: ArrayRef = Arc::new(Int64Array::from(vec![1, 1, 1, 2]));
        PartitionIndex::build(&[keys], 4, false).unwrap()
    }

    fn column(len: usize) -> ExprValue {
        ExprValue::Column(Arc::new(Int64Array::from(vec![0i64; len])))
    }

    #[test]
    fn group_to_rows_accepts_scalars_and_full_groups() {
        let results = vec![column(3), column(1)];
        assert_eq!(
            validate(&results, &index(), MappingStrategy::GroupToRows, "e").unwrap(),
            DataType::Int64
        );
        let results = vec![column(1), column(1)];
        assert!(validate(&results, &index(), MappingStrategy::GroupToRows, "e").is_ok());
    }

    #[test]
    fn group_to_rows_rejects_other_lengths() {
        let results = vec![column(2), column(1)];
        let err = validate(&results, &index(), MappingStrategy::GroupToRows, "e").unwrap_err();
        assert_eq!(
            err,
            WindowError::LengthMismatch {
                expr: "e".to_string(),
                strategy: MappingStrategy::GroupToRows,
                group_len: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn explode_requires_exact_lengths_join_accepts_any() {
        let results = vec![column(1), column(1)];
        assert!(validate(&results, &index(), MappingStrategy::Explode, "e").is_err());
        let results = vec![column(0), column(5)];
        assert!(validate(&results, &index(), MappingStrategy::Join, "e").is_ok());
    }

    #[test]
    fn result_types_unify() {
        let results = vec![
            ExprValue::Column(Arc::new(Int32Array::from(vec![1, 2, 3]))),
            ExprValue::Column(Arc::new(Float64Array::from(vec![0.5]))),
        ];
        assert_eq!(
            validate(&results, &index(), MappingStrategy::GroupToRows, "e").unwrap(),
            DataType::Float64
        );
    }
}
