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

//! Quorum-related error types

use thiserror::Error;
use treas_common::Tag;

/// Errors related to quorum operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuorumError {
    /// Too few replicas answered to attempt a resolution
    #[error("Insufficient read quorum: required {required}, available {available}")]
    InsufficientReadQuorum { required: usize, available: usize },

    /// Responses never certified a tag for quorum or for recovery
    #[error("Insufficient evidence for key {key}: quorum max {quorum_max_tag}, recover max {recover_max_tag}")]
    InsufficientEvidence {
        key: String,
        quorum_max_tag: Tag,
        recover_max_tag: Tag,
    },

    /// Quorum configuration is invalid
    #[error("Invalid quorum configuration: {reason}")]
    InvalidConfiguration { reason: String },
}
