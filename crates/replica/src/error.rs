// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Replica-side error types

use thiserror::Error;
use treas_common::{ShareParseError, TagParseError};

/// A column the decoder could not use. Never fatal to the resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("column {column} has no numeric slot suffix")]
    BadColumnName { column: String },

    #[error("column {column} holds an unreadable tag: {source}")]
    BadTag {
        column: String,
        #[source]
        source: TagParseError,
    },

    #[error("column {column} holds an unreadable share: {source}")]
    BadShare {
        column: String,
        #[source]
        source: ShareParseError,
    },

    #[error("share in slot {slot} has no paired tag column")]
    UnpairedShare { slot: usize },

    #[error("share in slot {slot} exceeds the one share a replica stores")]
    ExtraShare { slot: usize },

    #[error("row for key {got} in a response for key {expected}")]
    KeyMismatch { expected: String, got: String },
}

/// Errors raised by the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("table {table} not found")]
    UnknownTable { table: String },

    #[error("local read failed: {reason}")]
    ReadFailed { reason: String },
}

/// Errors that abort a single read request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Cannot service reads while bootstrapping")]
    Bootstrapping,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
