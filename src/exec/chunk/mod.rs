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
//! Columnar row containers.
//!
//! Responsibilities:
//! - `Chunk` wraps one Arrow `RecordBatch` and is the unit expressions evaluate against.
//! - `Frame` is a logical, possibly multi-chunk, row container addressed by global row
//!   position. Chunk boundaries are never observable through its API.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arrow::array::{Array, ArrayRef};
use arrow::compute::concat;
use arrow::compute::kernels::interleave::interleave;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

/// A chunk of data, consisting of multiple rows.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
    name_to_index: Arc<HashMap<String, usize>>,
}

impl Chunk {
    pub fn try_new(batch: RecordBatch) -> Result<Self, String> {
        let name_to_index = name_to_index_from_schema(batch.schema().as_ref())?;
        Ok(Self {
            batch,
            name_to_index: Arc::new(name_to_index),
        })
    }

    /// Builds a chunk with `num_rows` rows from already aligned columns.
    pub fn from_columns(
        fields: Vec<Field>,
        columns: Vec<ArrayRef>,
        num_rows: usize,
    ) -> Result<Self, String> {
        let schema = Arc::new(Schema::new(fields));
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch = RecordBatch::try_new_with_options(schema, columns, &options)
            .map_err(|e| format!("build chunk: {}", e))?;
        Self::try_new(batch)
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn column_by_name(&self, name: &str) -> Result<ArrayRef, String> {
        let idx = self.name_to_index.get(name).copied().ok_or_else(|| {
            format!(
                "column '{}' not found in chunk (num_columns={}, columns={:?})",
                name,
                self.batch.num_columns(),
                self.column_names()
            )
        })?;
        self.batch
            .columns()
            .get(idx)
            .cloned()
            .ok_or_else(|| format!("column '{}' mapped to invalid index {}", name, idx))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn slice(&self, offset: usize, length: usize) -> Self {
        Self {
            batch: self.batch.slice(offset, length),
            name_to_index: Arc::clone(&self.name_to_index),
        }
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
            name_to_index: Arc::new(HashMap::new()),
        }
    }
}

fn name_to_index_from_schema(schema: &Schema) -> Result<HashMap<String, usize>, String> {
    let mut map = HashMap::new();
    for (idx, f) in schema.fields().iter().enumerate() {
        if map.insert(f.name().clone(), idx).is_some() {
            return Err(format!(
                "duplicate column name '{}' in chunk schema: fields={:?}",
                f.name(),
                schema
                    .fields()
                    .iter()
                    .map(|f| f.name().as_str())
                    .collect::<Vec<_>>()
            ));
        }
    }
    Ok(map)
}

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Ordered row container made of chunks that share one schema.
///
/// Every constructed frame gets a fresh id; clones share it since they share the data.
#[derive(Debug, Clone)]
pub struct Frame {
    id: u64,
    schema: SchemaRef,
    chunks: Vec<Chunk>,
    /// Global row offset of each chunk, plus the total row count at the end.
    chunk_offsets: Vec<usize>,
}

impl Frame {
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self, String> {
        let mut chunks = Vec::with_capacity(batches.len());
        let mut chunk_offsets = Vec::with_capacity(batches.len() + 1);
        let mut total = 0usize;
        for (idx, batch) in batches.into_iter().enumerate() {
            if batch.schema().fields() != schema.fields() {
                return Err(format!(
                    "chunk {} schema does not match frame schema: expected {:?}, got {:?}",
                    idx,
                    schema,
                    batch.schema()
                ));
            }
            if batch.num_rows() == 0 {
                continue;
            }
            chunk_offsets.push(total);
            total += batch.num_rows();
            chunks.push(Chunk::try_new(batch)?);
        }
        chunk_offsets.push(total);
        // Validate column names even for frames without rows.
        name_to_index_from_schema(schema.as_ref())?;
        Ok(Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            schema,
            chunks,
            chunk_offsets,
        })
    }

    pub fn from_batch(batch: RecordBatch) -> Result<Self, String> {
        Self::try_new(batch.schema(), vec![batch])
    }

    pub fn empty(schema: SchemaRef) -> Result<Self, String> {
        Self::try_new(schema, Vec::new())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn num_rows(&self) -> usize {
        self.chunk_offsets.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Maps a global row position to `(chunk index, row within chunk)`.
    pub fn locate(&self, row: usize) -> Result<(usize, usize), String> {
        if row >= self.num_rows() {
            return Err(format!(
                "row position {} out of range for frame with {} rows",
                row,
                self.num_rows()
            ));
        }
        let chunk_idx = self.chunk_offsets.partition_point(|&start| start <= row) - 1;
        Ok((chunk_idx, row - self.chunk_offsets[chunk_idx]))
    }

    fn field(&self, name: &str) -> Result<Field, String> {
        self.schema
            .field_with_name(name)
            .map(|f| f.clone())
            .map_err(|_| {
                format!(
                    "column '{}' not found in frame (columns={:?})",
                    name,
                    self.schema
                        .fields()
                        .iter()
                        .map(|f| f.name().as_str())
                        .collect::<Vec<_>>()
                )
            })
    }

    /// Materializes the rows at `positions` (in that order) for the named columns.
    ///
    /// Positions may be non-contiguous and may cross chunk boundaries; only the requested
    /// columns are copied.
    pub fn gather(&self, columns: &[String], positions: &[u32]) -> Result<Chunk, String> {
        let mut fields = Vec::with_capacity(columns.len());
        for name in columns {
            fields.push(self.field(name)?);
        }

        let mut indices = Vec::with_capacity(positions.len());
        for &pos in positions {
            indices.push(self.locate(pos as usize)?);
        }

        let mut arrays = Vec::with_capacity(columns.len());
        for (name, field) in columns.iter().zip(fields.iter()) {
            let mut per_chunk = Vec::with_capacity(self.chunks.len());
            for chunk in &self.chunks {
                per_chunk.push(chunk.column_by_name(name)?);
            }
            let array = if per_chunk.is_empty() || indices.is_empty() {
                arrow::array::new_empty_array(field.data_type())
            } else {
                let refs: Vec<&dyn Array> = per_chunk.iter().map(|a| a.as_ref()).collect();
                interleave(&refs, &indices)
                    .map_err(|e| format!("gather column '{}': {}", name, e))?
            };
            arrays.push(array);
        }
        Chunk::from_columns(fields, arrays, positions.len())
    }

    /// Concatenates the named columns over all chunks in row order.
    pub fn project_contiguous(&self, columns: &[String]) -> Result<Chunk, String> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());
        for name in columns {
            let field = self.field(name)?;
            let mut per_chunk = Vec::with_capacity(self.chunks.len());
            for chunk in &self.chunks {
                per_chunk.push(chunk.column_by_name(name)?);
            }
            let array = match per_chunk.len() {
                0 => arrow::array::new_empty_array(field.data_type()),
                1 => Arc::clone(&per_chunk[0]),
                _ => {
                    let refs: Vec<&dyn Array> = per_chunk.iter().map(|a| a.as_ref()).collect();
                    concat(&refs).map_err(|e| format!("concat column '{}': {}", name, e))?
                }
            };
            fields.push(field);
            arrays.push(array);
        }
        Chunk::from_columns(fields, arrays, self.num_rows())
    }

    /// The whole frame as one chunk.
    pub fn to_contiguous(&self) -> Result<Chunk, String> {
        let names: Vec<String> = self
            .schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        self.project_contiguous(&names)
    }
}
