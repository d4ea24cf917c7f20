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

//! Digest comparison and single-tag max-response selection

use crate::command::{ReadResponse, ResponsePayload};
use crate::row::ResponseRow;
use tracing::{debug, trace};
use treas_common::{ColumnLayout, Tag};

/// MD5 over the rows, length-prefixing every field so boundaries can't blur
pub fn rows_digest(rows: &[ResponseRow]) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    let mut field = |bytes: &[u8]| {
        ctx.consume((bytes.len() as u64).to_be_bytes());
        ctx.consume(bytes);
    };

    for row in rows {
        field(row.key.as_bytes());
        field(row.table.keyspace.as_bytes());
        field(row.table.name.as_bytes());
        for cell in &row.cells {
            field(cell.name.as_bytes());
            field(&cell.value);
        }
    }
    ctx.compute().0
}

/// Whether every response carries the same digest
pub fn responses_match(responses: &[ReadResponse]) -> bool {
    let mut expected: Option<[u8; 16]> = None;
    for response in responses {
        let digest = response.digest();
        match expected {
            None => expected = Some(digest),
            Some(expected) if expected != digest => {
                debug!(key = %response.key, "Digest mismatch between replica responses");
                return false;
            }
            Some(_) => {}
        }
    }
    true
}

/// Largest parseable tag in any tag column of a row
fn row_max_tag(row: &ResponseRow, layout: &ColumnLayout) -> Tag {
    row.cells
        .iter()
        .filter(|c| c.name.starts_with(&layout.tag_prefix) && !c.value.is_empty())
        .filter_map(|c| Tag::parse(&c.value).ok())
        .max()
        .unwrap_or(Tag::SENTINEL)
}

/// Data response holding the largest tag, for replicated (single tag) reads.
///
/// Digest responses are ignored. On ties the earliest response wins.
pub fn extract_max_tag_response<'a>(responses: &'a [ReadResponse], layout: &ColumnLayout) -> Option<&'a ReadResponse> {
    let mut max_tag = Tag::SENTINEL;
    let mut max_response = None;

    for response in responses {
        let ResponsePayload::Data(rows) = &response.payload else {
            continue;
        };
        for row in rows {
            let tag = row_max_tag(row, layout);
            trace!(key = %row.key, tag = %tag, "Inspecting row tag");
            if tag.is_larger_than(&max_tag) {
                max_tag = tag;
                max_response = Some(response);
            }
        }
    }
    max_response
}
