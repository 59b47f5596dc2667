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
use thiserror::Error;

use super::MappingStrategy;

pub(crate) const LENGTH_MISMATCH_MESSAGE: &str =
    "the length of the window expression did not match that of the group";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowError {
    #[error("failed to evaluate partition key of `{expr}`: {message}")]
    KeyEvaluation { expr: String, message: String },

    #[error("failed to evaluate window expression `{expr}`: {message}")]
    SubExpressionEvaluation { expr: String, message: String },

    #[error(
        "the length of the window expression did not match that of the group in `{expr}` (mapping strategy {strategy}): group length {group_len}, output length {actual}"
    )]
    LengthMismatch {
        expr: String,
        strategy: MappingStrategy,
        group_len: usize,
        actual: usize,
    },

    #[error("unsupported mapping strategy `{0}`, expected one of group_to_rows, join, explode")]
    UnsupportedMapping(String),

    #[error("{0}")]
    Expression(String),
}

impl WindowError {
    pub fn key(expr: &str, message: impl Into<String>) -> Self {
        WindowError::KeyEvaluation {
            expr: expr.to_string(),
            message: message.into(),
        }
    }

    pub fn sub_expression(expr: &str, message: impl Into<String>) -> Self {
        WindowError::SubExpressionEvaluation {
            expr: expr.to_string(),
            message: message.into(),
        }
    }

    /// Short tag used in stage logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WindowError::KeyEvaluation { .. } => "key_evaluation",
            WindowError::SubExpressionEvaluation { .. } => "sub_expression_evaluation",
            WindowError::LengthMismatch { .. } => "length_mismatch",
            WindowError::UnsupportedMapping(_) => "unsupported_mapping",
            WindowError::Expression(_) => "expression",
        }
    }
}
