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
#[macro_use]
mod common;

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};

use common::*;
use overwin::exec::expr::{AggFunction, BinaryOp, TransformFunction};
use overwin::{
    ExprArena, ExprId, ExprNode, Frame, LiteralValue, MappingStrategy, NamedExpr, PartitionKey,
    WindowError, WindowSpec, select_in, with_columns_in,
};

fn grouped(groups: &[&str]) -> Frame {
    frame(vec![
        (
            "groups",
            Arc::new(StringArray::from(groups.to_vec())) as ArrayRef,
        ),
        (
            "values",
            int_col((0..groups.len() as i64).map(Some).collect()),
        ),
    ])
}

fn windowed(
    arena: &mut ExprArena,
    function: ExprId,
    key: &str,
    mapping: MappingStrategy,
) -> ExprId {
    let key = arena.col(key);
    arena.window(WindowSpec::new(function, vec![PartitionKey::new(key)]).mapping(mapping))
}

fn run(frame: &Frame, arena: &ExprArena, expr: ExprId) -> Result<ArrayRef, WindowError> {
    let out = select_in(&ctx(), frame, arena, &[NamedExpr::new("out", expr)])?;
    Ok(Arc::clone(out.column(0)))
}

#[test]
fn test_join_repeats_group_lists() {
    let frame = grouped(&["A", "A", "B", "B", "B"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let joined = windowed(&mut arena, values, "groups", MappingStrategy::Join);
    let out = assert_ok!(run(&frame, &arena, joined));
    let first = Some(vec![Some(0), Some(1)]);
    let second = Some(vec![Some(2), Some(3), Some(4)]);
    assert_eq!(
        int_lists(&out),
        vec![
            first.clone(),
            first,
            second.clone(),
            second.clone(),
            second
        ]
    );
}

#[test]
fn test_join_wraps_scalars_in_single_element_lists() {
    let frame = grouped(&["A", "A", "B", "B", "B"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let sum = arena.agg(AggFunction::Sum, values);
    let joined = windowed(&mut arena, sum, "groups", MappingStrategy::Join);
    let out = assert_ok!(run(&frame, &arena, joined));
    assert_eq!(
        int_lists(&out),
        vec![
            Some(vec![Some(1)]),
            Some(vec![Some(1)]),
            Some(vec![Some(9)]),
            Some(vec![Some(9)]),
            Some(vec![Some(9)]),
        ]
    );
}

#[test]
fn test_explode_concatenates_in_partition_order() {
    let frame = grouped(&["A", "A", "B", "B", "B"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let flat = windowed(&mut arena, values, "groups", MappingStrategy::Explode);
    let reversed = arena.transform(TransformFunction::Reverse, values);
    let reversed = windowed(&mut arena, reversed, "groups", MappingStrategy::Explode);

    let out = assert_ok!(with_columns_in(
        &ctx(),
        &frame,
        &arena,
        &[
            NamedExpr::new("values_flat", flat),
            NamedExpr::new("values_rev", reversed),
        ],
    ));
    let flat = ints(out.column_by_name("values_flat").expect("values_flat"));
    let rev = ints(out.column_by_name("values_rev").expect("values_rev"));
    assert_eq!(flat, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(rev, vec![Some(1), Some(0), Some(4), Some(3), Some(2)]);
}

#[test]
fn test_explode_does_not_restore_row_order() {
    let frame = grouped(&["A", "B", "A", "B", "A"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let flat = windowed(&mut arena, values, "groups", MappingStrategy::Explode);
    let out = assert_ok!(run(&frame, &arena, flat));
    assert_eq!(
        ints(&out),
        vec![Some(0), Some(2), Some(4), Some(1), Some(3)]
    );
}

#[test]
fn test_group_to_rows_scatters_back_to_rows() {
    let frame = grouped(&["A", "B", "A", "B", "A"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let reversed = arena.transform(TransformFunction::Reverse, values);
    let over = windowed(&mut arena, reversed, "groups", MappingStrategy::GroupToRows);
    let out = assert_ok!(run(&frame, &arena, over));
    assert_eq!(
        ints(&out),
        vec![Some(4), Some(3), Some(2), Some(1), Some(0)]
    );
}

#[test]
fn test_explode_rejects_scalar_results() {
    let frame = grouped(&["A", "A", "B", "B", "B"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let sum = arena.agg(AggFunction::Sum, values);
    let flat = windowed(&mut arena, sum, "groups", MappingStrategy::Explode);
    let err = assert_err!(run(&frame, &arena, flat));
    assert_eq!(
        err,
        WindowError::LengthMismatch {
            expr: arena.display(flat),
            strategy: MappingStrategy::Explode,
            group_len: 2,
            actual: 1,
        }
    );
}

#[test]
fn test_empty_input_schema_matches_non_empty() {
    let a = int_col(vec![Some(1), Some(1), Some(2), Some(2)]);
    let b = int_col(vec![Some(1), Some(2), Some(3), Some(4)]);
    let full = frame(vec![("a", a), ("b", b)]);
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, true),
        Field::new("b", DataType::Int64, true),
    ]));
    let empty = assert_ok!(Frame::empty(schema));
    assert!(empty.is_empty());

    for mapping in [
        MappingStrategy::GroupToRows,
        MappingStrategy::Join,
        MappingStrategy::Explode,
    ] {
        let mut arena = ExprArena::new();
        let b = arena.col("b");
        let over = windowed(&mut arena, b, "a", mapping);
        let exprs = [NamedExpr::new("c", over)];
        let full_out = assert_ok!(select_in(&ctx(), &full, &arena, &exprs));
        let empty_out = assert_ok!(select_in(&ctx(), &empty, &arena, &exprs));
        assert_eq!(empty_out.num_rows(), 0, "{mapping}");
        assert_eq!(full_out.schema(), empty_out.schema(), "{mapping}");
    }

    let mut arena = ExprArena::new();
    let b = arena.col("b");
    let joined = windowed(&mut arena, b, "a", MappingStrategy::Join);
    let out = assert_ok!(run(&empty, &arena, joined));
    assert_eq!(
        out.data_type(),
        &DataType::List(Arc::new(Field::new("item", DataType::Int64, true)))
    );
}

#[test]
fn test_mapping_strategy_names() {
    assert_eq!(MappingStrategy::default(), MappingStrategy::GroupToRows);
    for (name, expected) in [
        ("group_to_rows", MappingStrategy::GroupToRows),
        ("group-to-rows", MappingStrategy::GroupToRows),
        ("join", MappingStrategy::Join),
        ("explode", MappingStrategy::Explode),
    ] {
        let parsed: MappingStrategy = assert_ok!(name.parse());
        assert_eq!(parsed, expected);
    }
    assert_eq!(MappingStrategy::Join.to_string(), "join");

    let err = assert_err!("flatten".parse::<MappingStrategy>());
    assert_eq!(err, WindowError::UnsupportedMapping("flatten".to_string()));
    assert!(err.to_string().contains("group_to_rows, join, explode"), "err={err}");
}

#[test]
fn test_membership_in_joined_groups() {
    let frame = frame(vec![
        (
            "policy",
            Arc::new(StringArray::from(vec![
                "a", "b", "c", "c", "d", "d", "d", "d", "e", "e",
            ])) as ArrayRef,
        ),
        (
            "memo",
            Arc::new(StringArray::from(vec![
                "LE", "RM", "", "", "", "LE", "", "", "", "RM",
            ])) as ArrayRef,
        ),
    ]);
    let ctx = ctx();
    let mut arena = ExprArena::new();
    let memo = arena.col("memo");
    let le = arena.lit(LiteralValue::Utf8("LE".to_string()));
    let rm = arena.lit(LiteralValue::Utf8("RM".to_string()));
    let joined_le = windowed(&mut arena, memo, "policy", MappingStrategy::Join);
    let joined_rm = windowed(&mut arena, memo, "policy", MappingStrategy::Join);
    let has_le = arena.push(ExprNode::IsIn {
        element: le,
        set: joined_le,
    });
    let has_rm = arena.push(ExprNode::IsIn {
        element: rm,
        set: joined_rm,
    });
    let either = arena.binary(BinaryOp::Or, has_le, has_rm);

    let out = assert_ok!(select_in(
        &ctx,
        &frame,
        &arena,
        &[NamedExpr::new("flag", either)]
    ));
    let flag = out
        .column(0)
        .as_any()
        .downcast_ref::<BooleanArray>()
        .expect("BooleanArray")
        .iter()
        .collect::<Vec<_>>();
    let expected = [true, true, false, false, true, true, true, true, true, true]
        .into_iter()
        .map(Some)
        .collect::<Vec<_>>();
    assert_eq!(flag, expected);

    // Both windows partition by `policy`, so the index is built once.
    let stats = ctx.cache_stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_join_result_can_be_exploded_at_frame_level() {
    let frame = grouped(&["A", "A", "B"]);
    let mut arena = ExprArena::new();
    let values = arena.col("values");
    let max = arena.agg(AggFunction::Max, values);
    let joined = windowed(&mut arena, max, "groups", MappingStrategy::Join);
    let flat = arena.push(ExprNode::Explode(joined));
    let out = assert_ok!(run(&frame, &arena, flat));
    assert_eq!(ints(&out), vec![Some(1), Some(1), Some(2)]);
}

#[test]
fn test_constant_key_keeps_null_rows() {
    let batch = RecordBatch::try_new(
        Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)])),
        vec![Arc::new(Int64Array::from(vec![Some(1), None])) as ArrayRef],
    )
    .expect("batch");
    let frame = assert_ok!(Frame::from_batch(batch));
    let mut arena = ExprArena::new();
    let v = arena.col("v");
    let one = arena.lit(LiteralValue::Int32(1));
    let over = arena.over(v, &[one]);
    let out = assert_ok!(run(&frame, &arena, over));
    assert_eq!(out.null_count(), 1);
}
