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
//! Partition index: row positions grouped by key.
//!
//! Positions are stored CSR-style: `positions[offsets[p]..offsets[p + 1]]` are the rows of
//! partition `p` in partition order, and `row_partition[row]` is the owning partition.
use std::cmp::Ordering;

use arrow::array::ArrayRef;
use arrow::compute::SortOptions;
use hashbrown::HashMap;

use crate::exec::expr::sort_key::encode_rows;
use crate::overwin_logging::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionIndex {
    positions: Vec<u32>,
    offsets: Vec<usize>,
    row_partition: Vec<u32>,
    contiguous: bool,
}

fn row_count(num_rows: usize) -> Result<u32, String> {
    u32::try_from(num_rows).map_err(|_| format!("{} rows exceed the partition index limit", num_rows))
}

impl PartitionIndex {
    /// Every row in one partition (or none when there are no rows).
    pub fn single(num_rows: usize) -> Result<Self, String> {
        let n = row_count(num_rows)?;
        let offsets = if num_rows == 0 {
            vec![0]
        } else {
            vec![0, num_rows]
        };
        Ok(Self {
            positions: (0..n).collect(),
            offsets,
            row_partition: vec![0; num_rows],
            contiguous: true,
        })
    }

    /// Builds the index for row-aligned `keys`. With `sorted` the keys are trusted to be
    /// grouped in contiguous runs and no hashing is done.
    pub fn build(keys: &[ArrayRef], num_rows: usize, sorted: bool) -> Result<Self, String> {
        if keys.is_empty() || num_rows == 0 {
            return Self::single(num_rows);
        }
        if sorted {
            Self::build_sorted(keys, num_rows)
        } else {
            Self::build_hashed(keys, num_rows)
        }
    }

    /// Hashes encoded key rows; partitions are numbered by first occurrence.
    pub fn build_hashed(keys: &[ArrayRef], num_rows: usize) -> Result<Self, String> {
        row_count(num_rows)?;
        let rows = encode_rows(keys, SortOptions::default())?;
        let mut ids: HashMap<_, u32> = HashMap::new();
        let mut row_partition = Vec::with_capacity(num_rows);
        let mut sizes: Vec<usize> = Vec::new();
        for row in 0..num_rows {
            let next = sizes.len() as u32;
            let id = *ids.entry(rows.row(row)).or_insert(next);
            if id == next {
                sizes.push(0);
            }
            sizes[id as usize] += 1;
            row_partition.push(id);
        }
        Ok(Self::from_assignment(row_partition, &sizes, false))
    }

    /// Splits rows into maximal runs of equal keys with one linear scan. Falls back to
    /// hashing when the encoded keys are not monotonic, so a key never spans two runs.
    pub fn build_sorted(keys: &[ArrayRef], num_rows: usize) -> Result<Self, String> {
        let n = row_count(num_rows)?;
        let rows = encode_rows(keys, SortOptions::default())?;
        let mut offsets = vec![0usize];
        let mut row_partition = Vec::with_capacity(num_rows);
        let mut current = 0u32;
        let mut direction = Ordering::Equal;
        for row in 0..num_rows {
            if row > 0 {
                let step = rows.row(row).cmp(&rows.row(row - 1));
                if step != Ordering::Equal {
                    if direction == Ordering::Equal {
                        direction = step;
                    } else if step != direction {
                        debug!(row, "sorted hint contradicted by key order, hashing instead");
                        return Self::build_hashed(keys, num_rows);
                    }
                    offsets.push(row);
                    current += 1;
                }
            }
            row_partition.push(current);
        }
        offsets.push(num_rows);
        Ok(Self {
            positions: (0..n).collect(),
            offsets,
            row_partition,
            contiguous: true,
        })
    }

    fn from_assignment(row_partition: Vec<u32>, sizes: &[usize], contiguous: bool) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        offsets.push(0usize);
        for size in sizes {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + size);
        }
        let mut cursor: Vec<usize> = offsets[..sizes.len()].to_vec();
        let mut positions = vec![0u32; row_partition.len()];
        for (row, &id) in row_partition.iter().enumerate() {
            let slot = &mut cursor[id as usize];
            positions[*slot] = row as u32;
            *slot += 1;
        }
        Self {
            positions,
            offsets,
            row_partition,
            contiguous,
        }
    }

    /// Same partitions with each partition's rows stably sorted by `order` (row-aligned).
    pub fn with_order(&self, order: &[ArrayRef], options: SortOptions) -> Result<Self, String> {
        if order.is_empty() || self.num_rows() == 0 {
            return Ok(self.clone());
        }
        let rows = encode_rows(order, options)?;
        let mut positions = self.positions.clone();
        for p in 0..self.num_partitions() {
            let range = self.offsets[p]..self.offsets[p + 1];
            positions[range].sort_by(|&a, &b| rows.row(a as usize).cmp(&rows.row(b as usize)));
        }
        Ok(Self {
            positions,
            offsets: self.offsets.clone(),
            row_partition: self.row_partition.clone(),
            contiguous: false,
        })
    }

    pub fn num_partitions(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_rows(&self) -> usize {
        self.row_partition.len()
    }

    /// Rows of partition `p`, in partition order.
    pub fn partition(&self, p: usize) -> &[u32] {
        &self.positions[self.offsets[p]..self.offsets[p + 1]]
    }

    pub fn partition_len(&self, p: usize) -> usize {
        self.offsets[p + 1] - self.offsets[p]
    }

    /// All positions, partition after partition in enumeration order.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Start of each partition within `positions()`, plus a trailing total.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn row_partition(&self) -> &[u32] {
        &self.row_partition
    }

    /// True when every partition is a contiguous run in row order.
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    pub fn partitions(&self) -> impl Iterator<Item = &[u32]> + '_ {
        (0..self.num_partitions()).map(move |p| self.partition(p))
    }
}
