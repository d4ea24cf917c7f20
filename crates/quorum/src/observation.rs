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

//! Decoded per-replica evidence fed into the resolver

use treas_common::{Share, TableId, Tag};

/// One tag a replica holds for a key, with the share it stores for it if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObservation {
    /// Position of the tag in the replica's history row
    pub slot: usize,
    pub tag: Tag,
    pub share: Option<Share>,
}

impl TagObservation {
    /// Tag seen but not stored at this replica
    pub fn marker(slot: usize, tag: Tag) -> Self {
        Self { slot, tag, share: None }
    }

    /// Tag whose share this replica stores
    pub fn with_share(slot: usize, tag: Tag, share: Share) -> Self {
        Self {
            slot,
            tag,
            share: Some(share),
        }
    }

    #[inline]
    pub fn carries_share(&self) -> bool {
        self.share.is_some()
    }
}

/// Everything one replica reported for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaObservation {
    /// Replica the response came from
    pub replica: String,
    pub key: String,
    pub table: TableId,
    pub tags: Vec<TagObservation>,
}

impl ReplicaObservation {
    pub fn new(replica: &str, key: &str, table: TableId) -> Self {
        Self {
            replica: replica.to_string(),
            key: key.to_string(),
            table,
            tags: Vec::new(),
        }
    }

    pub fn marker(mut self, slot: usize, tag: Tag) -> Self {
        self.tags.push(TagObservation::marker(slot, tag));
        self
    }

    pub fn share(mut self, slot: usize, tag: Tag, share: Share) -> Self {
        self.tags.push(TagObservation::with_share(slot, tag, share));
        self
    }

    /// Number of observations that carry a share
    pub fn share_count(&self) -> usize {
        self.tags.iter().filter(|t| t.carries_share()).count()
    }

    /// Largest tag this replica reported, stored or not
    pub fn max_tag(&self) -> Tag {
        self.tags.iter().map(|t| t.tag).max().unwrap_or(Tag::SENTINEL)
    }
}
