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

//! Erasure-coded shares and the per-key record a node keeps locally

use crate::tag::Tag;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when a share payload cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareParseError {
    #[error("share payload too short: {len} bytes")]
    TooShort { len: usize },
}

/// One erasure-coded fragment of a logical value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Share {
    /// Which fragment of the code this is
    pub index: u32,
    /// Fragment bytes
    pub data: Bytes,
}

impl Share {
    const INDEX_LEN: usize = 4;

    pub fn new(index: u32, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    /// Value-column wire form: big-endian fragment index followed by the fragment
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::INDEX_LEN + self.data.len());
        buf.put_u32(self.index);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    pub fn decode(bytes: &Bytes) -> Result<Share, ShareParseError> {
        if bytes.len() < Self::INDEX_LEN {
            return Err(ShareParseError::TooShort { len: bytes.len() });
        }
        let mut index = [0u8; Self::INDEX_LEN];
        index.copy_from_slice(&bytes[..Self::INDEX_LEN]);
        Ok(Share {
            index: u32::from_be_bytes(index),
            data: bytes.slice(Self::INDEX_LEN..),
        })
    }
}

/// The most recent state a node knows for one key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Largest tag seen for the key
    pub max_tag: Tag,
    /// Tag history for the key, oldest first
    pub tag_list: Vec<Tag>,
    /// Fragment stored on this node, if any
    pub share: Option<Share>,
    /// Position in `tag_list` whose tag the stored share belongs to
    pub slot: Option<usize>,
}

impl ValueRecord {
    /// Record for a key this node has never seen
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from a tag history and the slot holding the local share.
    ///
    /// `max_tag` is derived from the history so it can never disagree with it.
    pub fn from_history(tag_list: Vec<Tag>, stored: Option<(usize, Share)>) -> Self {
        let max_tag = tag_list.iter().copied().max().unwrap_or(Tag::SENTINEL);
        let (slot, share) = match stored {
            Some((slot, share)) if slot < tag_list.len() => (Some(slot), Some(share)),
            _ => (None, None),
        };
        Self {
            max_tag,
            tag_list,
            share,
            slot,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_tag.is_sentinel()
    }

    /// Tag the stored share was written under
    pub fn share_tag(&self) -> Option<Tag> {
        self.slot.and_then(|slot| self.tag_list.get(slot).copied())
    }

    /// Fragment index of the stored share
    pub fn share_index(&self) -> Option<u32> {
        self.share.as_ref().map(|share| share.index)
    }
}
