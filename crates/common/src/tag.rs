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

//! Version tags ordering concurrent writes to a key

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors produced when a tag cannot be read back from its wire form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagParseError {
    /// Tag bytes are not valid UTF-8
    #[error("tag bytes are not valid utf-8")]
    InvalidUtf8,

    /// Tag text does not have the `<time>;<writer>` shape
    #[error("malformed tag: {raw}")]
    Malformed { raw: String },

    /// Negative logical times never travel on the wire
    #[error("negative logical time {logical_time} in tag")]
    NegativeTime { logical_time: i64 },
}

/// Totally ordered version identifier.
///
/// Tags order by logical time first and writer id second, so two writers that
/// raced on the same logical time still produce a deterministic winner. A tag
/// whose logical time is `-1` is the sentinel meaning "no tag found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    writer_id: i32,
    logical_time: i64,
}

impl Tag {
    /// The "no tag found" placeholder
    pub const SENTINEL: Tag = Tag {
        writer_id: 0,
        logical_time: -1,
    };

    const SEPARATOR: char = ';';

    pub fn new(writer_id: i32, logical_time: i64) -> Self {
        Self { writer_id, logical_time }
    }

    #[inline]
    pub fn writer_id(&self) -> i32 {
        self.writer_id
    }

    #[inline]
    pub fn logical_time(&self) -> i64 {
        self.logical_time
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.logical_time == -1
    }

    /// Strictly greater in tag order
    #[inline]
    pub fn is_larger_than(&self, other: &Tag) -> bool {
        self > other
    }

    /// The tag a writer should use for its next write after observing `self`
    pub fn successor(&self, writer_id: i32) -> Tag {
        Tag::new(writer_id, self.logical_time.max(0) + 1)
    }

    /// Encode to the column wire form (`<time>;<writer>`)
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}{}{}", self.logical_time, Self::SEPARATOR, self.writer_id).into_bytes()
    }

    /// Decode from the column wire form
    pub fn parse(bytes: &[u8]) -> Result<Tag, TagParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| TagParseError::InvalidUtf8)?;
        let malformed = || TagParseError::Malformed { raw: text.to_string() };

        let (time, writer) = text.trim().split_once(Self::SEPARATOR).ok_or_else(malformed)?;
        let logical_time: i64 = time.trim().parse().map_err(|_| malformed())?;
        let writer_id: i32 = writer.trim().parse().map_err(|_| malformed())?;

        if logical_time < 0 {
            return Err(TagParseError::NegativeTime { logical_time });
        }

        Ok(Tag::new(writer_id, logical_time))
    }
}

impl Default for Tag {
    fn default() -> Self {
        Tag::SENTINEL
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.logical_time
            .cmp(&other.logical_time)
            .then_with(|| self.writer_id.cmp(&other.writer_id))
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.logical_time, self.writer_id)
    }
}
