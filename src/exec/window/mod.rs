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
//! Partitioned (`over`) evaluation.
//!
//! A windowed expression is evaluated in stages: partition keys are materialized, a
//! `PartitionIndex` is resolved through the query's `PartitionCache`, the sub-expression runs
//! once per partition, results are validated against their group lengths and finally mapped
//! onto output rows according to the `MappingStrategy`.

mod cache;
mod error;
mod evaluator;
mod keys;
mod mapper;
mod partition;
mod validator;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{ArrayRef, new_empty_array};
pub use self::cache::{CacheStats, OrderIdentity, PartitionCache, PartitionCacheKey};
pub use self::error::WindowError;
pub use self::partition::PartitionIndex;

use crate::exec::chunk::Frame;
use crate::exec::expr::sort_key::sort_options;
use crate::exec::expr::{ExprArena, ExprId, ExprValue};
use crate::overwin_logging::debug;
use crate::runtime::query_context::QueryContext;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum MappingStrategy {
    #[default]
    GroupToRows,
    Join,
    Explode,
}

impl fmt::Display for MappingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingStrategy::GroupToRows => "group_to_rows",
            MappingStrategy::Join => "join",
            MappingStrategy::Explode => "explode",
        };
        f.write_str(name)
    }
}

impl FromStr for MappingStrategy {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group_to_rows" | "group-to-rows" => Ok(MappingStrategy::GroupToRows),
            "join" => Ok(MappingStrategy::Join),
            "explode" => Ok(MappingStrategy::Explode),
            _ => Err(WindowError::UnsupportedMapping(s.to_string())),
        }
    }
}

/// One partition key. `sorted` asserts that the key is non-decreasing in row order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PartitionKey {
    pub expr: ExprId,
    pub sorted: bool,
}

impl PartitionKey {
    pub fn new(expr: ExprId) -> Self {
        Self {
            expr,
            sorted: false,
        }
    }

    pub fn sorted(expr: ExprId) -> Self {
        Self { expr, sorted: true }
    }
}

/// Intra-partition ordering.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WindowOrder {
    pub exprs: Vec<ExprId>,
    pub descending: bool,
    pub nulls_last: bool,
}

impl WindowOrder {
    pub fn by(exprs: Vec<ExprId>) -> Self {
        Self {
            exprs,
            ..Self::default()
        }
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn nulls_last(mut self, nulls_last: bool) -> Self {
        self.nulls_last = nulls_last;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindowSpec {
    pub function: ExprId,
    pub partition_by: Vec<PartitionKey>,
    pub order_by: Option<WindowOrder>,
    pub mapping: MappingStrategy,
}

impl WindowSpec {
    pub fn new(function: ExprId, partition_by: Vec<PartitionKey>) -> Self {
        Self {
            function,
            partition_by,
            order_by: None,
            mapping: MappingStrategy::GroupToRows,
        }
    }

    pub fn order_by(mut self, order: WindowOrder) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn mapping(mut self, mapping: MappingStrategy) -> Self {
        self.mapping = mapping;
        self
    }
}

/// Progress of one windowed expression, logged at debug level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowStage {
    KeysMaterialized { key_columns: usize },
    PartitionsResolved { partitions: usize, cache_hit: bool },
    PerPartitionEvaluated { partitions: usize },
    Validated,
    Mapped { rows: usize },
    Failed(String),
}

impl fmt::Display for WindowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowStage::KeysMaterialized { key_columns } => {
                write!(f, "KeysMaterialized(key_columns={})", key_columns)
            }
            WindowStage::PartitionsResolved {
                partitions,
                cache_hit,
            } => write!(
                f,
                "PartitionsResolved(partitions={}, {})",
                partitions,
                if *cache_hit { "cache-hit" } else { "cache-miss+build" }
            ),
            WindowStage::PerPartitionEvaluated { partitions } => {
                write!(f, "PerPartitionEvaluated(partitions={})", partitions)
            }
            WindowStage::Validated => f.write_str("Validated"),
            WindowStage::Mapped { rows } => write!(f, "Mapped(rows={})", rows),
            WindowStage::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

fn enter(expr: &str, stage: WindowStage) {
    debug!(expr, stage = %stage, "window stage");
}

/// Evaluates one windowed expression against `frame`, sharing partition indices through `ctx`.
pub fn evaluate_window(
    ctx: &QueryContext,
    arena: &ExprArena,
    frame: &Frame,
    spec: &WindowSpec,
) -> Result<ArrayRef, WindowError> {
    let expr = arena.display_window(spec);
    let result = run_stages(ctx, arena, frame, spec, &expr);
    if let Err(err) = &result {
        enter(&expr, WindowStage::Failed(err.kind().to_string()));
    }
    result
}

fn run_stages(
    ctx: &QueryContext,
    arena: &ExprArena,
    frame: &Frame,
    spec: &WindowSpec,
    expr: &str,
) -> Result<ArrayRef, WindowError> {
    let num_rows = frame.num_rows();
    let keys = keys::materialize_keys(arena, frame, &spec.partition_by)
        .map_err(|e| WindowError::key(expr, e))?;
    enter(
        expr,
        WindowStage::KeysMaterialized {
            key_columns: keys.len(),
        },
    );

    let (index, cache_hit) = resolve_partitions(ctx, arena, frame, spec, &keys, expr)?;
    enter(
        expr,
        WindowStage::PartitionsResolved {
            partitions: index.num_partitions(),
            cache_hit,
        },
    );

    if num_rows == 0 {
        let element = evaluator::infer_empty_type(arena, frame, spec.function)
            .map_err(|e| WindowError::sub_expression(expr, e))?;
        enter(expr, WindowStage::Mapped { rows: 0 });
        return Ok(new_empty_array(&mapper::output_type(spec.mapping, &element)));
    }

    let results =
        evaluator::evaluate_partitions(arena, frame, spec.function, &index, ctx.options())
            .map_err(|e| WindowError::sub_expression(expr, e))?;
    enter(
        expr,
        WindowStage::PerPartitionEvaluated {
            partitions: results.len(),
        },
    );

    let element = validator::validate(&results, &index, spec.mapping, expr)?;
    enter(expr, WindowStage::Validated);

    let out = mapper::map_results(results, &index, spec.mapping, &element)
        .map_err(|e| WindowError::sub_expression(expr, e))?;
    enter(expr, WindowStage::Mapped { rows: out.len() });
    Ok(out)
}

fn order_arrays(
    arena: &ExprArena,
    frame: &Frame,
    order: &WindowOrder,
) -> Result<Vec<ArrayRef>, String> {
    let mut columns: Vec<String> = Vec::new();
    for id in &order.exprs {
        for name in arena.referenced_columns(*id) {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    let chunk = frame.project_contiguous(&columns)?;
    let mut out = Vec::with_capacity(order.exprs.len());
    for id in &order.exprs {
        let value = arena
            .eval(*id, &chunk)
            .map_err(|e| format!("order_by `{}`: {}", arena.display(*id), e))?;
        if let ExprValue::Scalar(_) = value {
            continue;
        }
        out.push(value.broadcast_to(frame.num_rows())?);
    }
    Ok(out)
}

fn resolve_partitions(
    ctx: &QueryContext,
    arena: &ExprArena,
    frame: &Frame,
    spec: &WindowSpec,
    keys: &[ArrayRef],
    expr: &str,
) -> Result<(Arc<PartitionIndex>, bool), WindowError> {
    let num_rows = frame.num_rows();
    let sorted = ctx.options().honor_sorted_hint
        && !spec.partition_by.is_empty()
        && spec.partition_by.iter().all(|k| k.sorted);
    let build_unordered = || PartitionIndex::build(keys, num_rows, sorted);
    let order = spec
        .order_by
        .as_ref()
        .filter(|order| !order.exprs.is_empty());
    let build_ordered =
        |base: &PartitionIndex, order: &WindowOrder| -> Result<PartitionIndex, String> {
            let arrays = order_arrays(arena, frame, order)?;
            base.with_order(&arrays, sort_options(order.descending, order.nulls_last))
        };

    if !ctx.options().cache_partitions {
        let base = build_unordered().map_err(|e| WindowError::key(expr, e))?;
        let index = match order {
            Some(order) => build_ordered(&base, order).map_err(|e| WindowError::key(expr, e))?,
            None => base,
        };
        return Ok((Arc::new(index), false));
    }

    let cache_key = PartitionCacheKey {
        frame: frame.id(),
        keys: spec
            .partition_by
            .iter()
            .map(|k| arena.display(k.expr))
            .collect(),
        sorted,
        order: order.map(|o| OrderIdentity {
            exprs: o.exprs.iter().map(|id| arena.display(*id)).collect(),
            descending: o.descending,
            nulls_last: o.nulls_last,
        }),
    };
    let cache = ctx.partition_cache();
    match order {
        None => cache
            .get_or_build(cache_key, build_unordered)
            .map_err(|e| WindowError::key(expr, e)),
        Some(order) => cache
            .get_or_build(cache_key.clone(), || {
                let (base, _) = cache.get_or_build(cache_key.unordered(), build_unordered)?;
                build_ordered(&base, order)
            })
            .map_err(|e| WindowError::key(expr, e)),
    }
}
