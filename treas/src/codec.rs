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

//! Erasure codec seam
//!
//! The read path only ever decodes: it hands the shares certified for the
//! recover tag to an [`ErasureCodec`] and returns whatever comes back.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;
use treas_common::Share;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("codec needs at least one data shard")]
    InvalidLayout,

    #[error("not enough shares to decode: required {required}, available {available}")]
    NotEnoughShares { required: usize, available: usize },

    #[error("fragment {index} missing from share set")]
    MissingFragment { index: u32 },

    #[error("corrupt fragment {index}: {reason}")]
    Corrupt { index: u32, reason: String },
}

/// Rebuilds a value from its fragments
pub trait ErasureCodec: Send + Sync + fmt::Debug {
    /// Fewest distinct fragments `decode` can work from
    fn required_shares(&self) -> usize;

    fn decode(&self, shares: &[Share]) -> Result<Bytes, CodecError>;
}

/// Systematic striping without parity.
///
/// Every fragment carries the value length (8 bytes, big endian) followed by
/// one equally sized stripe; the last stripe is zero padded. All `k` stripes
/// are needed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeCodec {
    data_shards: usize,
}

impl StripeCodec {
    const LEN_PREFIX: usize = 8;

    pub fn new(data_shards: usize) -> Result<Self, CodecError> {
        if data_shards == 0 {
            return Err(CodecError::InvalidLayout);
        }
        Ok(Self { data_shards })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    /// Split `value` into `data_shards` fragments indexed from 0
    pub fn encode(&self, value: &[u8]) -> Vec<Share> {
        let stripe = value.len().div_ceil(self.data_shards);
        (0..self.data_shards)
            .map(|index| {
                let start = (index * stripe).min(value.len());
                let end = (start + stripe).min(value.len());
                let mut buf = BytesMut::with_capacity(Self::LEN_PREFIX + stripe);
                buf.put_u64(value.len() as u64);
                buf.extend_from_slice(&value[start..end]);
                buf.resize(Self::LEN_PREFIX + stripe, 0);
                Share::new(index as u32, buf.freeze())
            })
            .collect()
    }

    fn split(share: &Share) -> Result<(usize, &[u8]), CodecError> {
        if share.data.len() < Self::LEN_PREFIX {
            return Err(CodecError::Corrupt {
                index: share.index,
                reason: format!("{} bytes is shorter than the length prefix", share.data.len()),
            });
        }
        let (prefix, stripe) = share.data.split_at(Self::LEN_PREFIX);
        let mut len = [0u8; Self::LEN_PREFIX];
        len.copy_from_slice(prefix);
        Ok((u64::from_be_bytes(len) as usize, stripe))
    }
}

impl ErasureCodec for StripeCodec {
    fn required_shares(&self) -> usize {
        self.data_shards
    }

    fn decode(&self, shares: &[Share]) -> Result<Bytes, CodecError> {
        let mut stripes: Vec<Option<&Share>> = vec![None; self.data_shards];
        for share in shares {
            // replicas holding the same fragment are interchangeable
            if let Some(slot) = stripes.get_mut(share.index as usize) {
                slot.get_or_insert(share);
            }
        }

        let available = stripes.iter().filter(|s| s.is_some()).count();
        if available < self.data_shards {
            return Err(CodecError::NotEnoughShares {
                required: self.data_shards,
                available,
            });
        }

        let mut value = BytesMut::new();
        let mut expected_len = None;
        for (index, share) in stripes.into_iter().enumerate() {
            let share = share.ok_or(CodecError::MissingFragment { index: index as u32 })?;
            let (len, stripe) = Self::split(share)?;
            match expected_len {
                None => expected_len = Some(len),
                Some(expected) if expected != len => {
                    return Err(CodecError::Corrupt {
                        index: share.index,
                        reason: format!("length prefix {len} disagrees with {expected}"),
                    });
                }
                Some(_) => {}
            }
            value.extend_from_slice(stripe);
        }

        let len = expected_len.unwrap_or(0);
        if value.len() < len {
            return Err(CodecError::Corrupt {
                index: 0,
                reason: format!("stripes hold {} bytes, value needs {len}", value.len()),
            });
        }
        value.truncate(len);
        Ok(value.freeze())
    }
}
