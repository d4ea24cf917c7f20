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

//! Tag history rows and their named-column wire form
//!
//! On the wire a replica's row for a key is a flat set of named cells where
//! `tagN` pairs with `valN`. Internally the row is an explicit list of slots,
//! each holding a tag and, for at most one slot, the share stored here.

use crate::error::DecodeError;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::warn;
use treas_common::{ColumnLayout, Share, TableId, Tag, ValueRecord};

/// One named column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub name: String,
    pub value: Bytes,
}

impl Cell {
    pub fn new(name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A raw row as produced by the storage engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRow {
    pub key: String,
    pub table: TableId,
    pub cells: Vec<Cell>,
}

impl ResponseRow {
    pub fn new(key: &str, table: TableId) -> Self {
        Self {
            key: key.to_string(),
            table,
            cells: Vec::new(),
        }
    }

    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.name == name)
    }
}

/// One position of a replica's tag history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySlot {
    pub index: usize,
    pub tag: Tag,
    pub share: Option<Share>,
}

/// Decoded tag history of one replica for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHistoryRow {
    pub key: String,
    pub table: TableId,
    /// Slots holding a tag, in slot order
    pub slots: Vec<HistorySlot>,
}

#[derive(Default)]
struct RawSlot {
    tag: Option<Tag>,
    share: Option<Share>,
}

fn slot_suffix(name: &str, prefix: &str) -> Result<usize, DecodeError> {
    name[prefix.len()..].parse().map_err(|_| DecodeError::BadColumnName {
        column: name.to_string(),
    })
}

impl TagHistoryRow {
    pub fn new(key: &str, table: TableId) -> Self {
        Self {
            key: key.to_string(),
            table,
            slots: Vec::new(),
        }
    }

    /// Append a tag the replica has seen but does not store
    pub fn push_marker(&mut self, tag: Tag) -> usize {
        let index = self.next_index();
        self.slots.push(HistorySlot { index, tag, share: None });
        index
    }

    /// Append the tag whose share this replica stores.
    ///
    /// Any share already held moves out of its slot, leaving the tag as a marker.
    pub fn push_share(&mut self, tag: Tag, share: Share) -> usize {
        for slot in &mut self.slots {
            slot.share = None;
        }
        let index = self.next_index();
        self.slots.push(HistorySlot {
            index,
            tag,
            share: Some(share),
        });
        index
    }

    fn next_index(&self) -> usize {
        self.slots.last().map(|s| s.index + 1).unwrap_or(1)
    }

    pub fn stored_share(&self) -> Option<&HistorySlot> {
        self.slots.iter().find(|s| s.share.is_some())
    }

    pub fn max_tag(&self) -> Tag {
        self.slots.iter().map(|s| s.tag).max().unwrap_or(Tag::SENTINEL)
    }

    /// Parse a wire row, skipping every column that cannot be used.
    ///
    /// Unusable columns come back as errors next to the row instead of failing
    /// it, so one corrupt cell costs at most one observation.
    pub fn from_wire(row: &ResponseRow, layout: &ColumnLayout) -> (TagHistoryRow, Vec<DecodeError>) {
        let mut raw: BTreeMap<usize, RawSlot> = BTreeMap::new();
        let mut skipped = Vec::new();

        for cell in &row.cells {
            if cell.name.starts_with(&layout.tag_prefix) {
                if cell.value.is_empty() {
                    continue;
                }
                let parsed = slot_suffix(&cell.name, &layout.tag_prefix).and_then(|slot| {
                    Tag::parse(&cell.value)
                        .map(|tag| (slot, tag))
                        .map_err(|source| DecodeError::BadTag {
                            column: cell.name.clone(),
                            source,
                        })
                });
                match parsed {
                    Ok((slot, tag)) => raw.entry(slot).or_default().tag = Some(tag),
                    Err(err) => skipped.push(err),
                }
            } else if cell.name.starts_with(&layout.value_prefix) && cell.name != layout.placeholder {
                if cell.value.is_empty() {
                    continue;
                }
                let parsed = slot_suffix(&cell.name, &layout.value_prefix).and_then(|slot| {
                    Share::decode(&cell.value)
                        .map(|share| (slot, share))
                        .map_err(|source| DecodeError::BadShare {
                            column: cell.name.clone(),
                            source,
                        })
                });
                match parsed {
                    Ok((slot, share)) => raw.entry(slot).or_default().share = Some(share),
                    Err(err) => skipped.push(err),
                }
            }
        }

        let mut history = TagHistoryRow::new(&row.key, row.table.clone());
        let mut has_share = false;
        for (index, slot) in raw {
            let Some(tag) = slot.tag else {
                if slot.share.is_some() {
                    skipped.push(DecodeError::UnpairedShare { slot: index });
                }
                continue;
            };
            let share = match slot.share {
                Some(_) if has_share => {
                    skipped.push(DecodeError::ExtraShare { slot: index });
                    None
                }
                Some(share) => {
                    has_share = true;
                    Some(share)
                }
                None => None,
            };
            history.slots.push(HistorySlot { index, tag, share });
        }

        for err in &skipped {
            warn!(key = %row.key, table = %row.table, error = %err, "Skipping unusable column");
        }

        (history, skipped)
    }

    /// Encode back to the named-column wire form.
    ///
    /// Emits the placeholder value column and an empty value cell for every
    /// slot that stores no share, as the storage engine does.
    pub fn to_wire(&self, layout: &ColumnLayout) -> ResponseRow {
        let mut row = ResponseRow::new(&self.key, self.table.clone());
        row.cells.push(Cell::new(layout.placeholder.clone(), Bytes::new()));
        for slot in &self.slots {
            row.cells.push(Cell::new(layout.tag_column(slot.index), slot.tag.to_bytes()));
            let value = slot.share.as_ref().map(Share::encode).unwrap_or_default();
            row.cells.push(Cell::new(layout.value_column(slot.index), value));
        }
        row
    }

    /// Local record equivalent to this history
    pub fn to_value_record(&self) -> ValueRecord {
        let tags = self.slots.iter().map(|s| s.tag).collect();
        let stored = self
            .slots
            .iter()
            .enumerate()
            .find_map(|(pos, s)| s.share.clone().map(|share| (pos, share)));
        ValueRecord::from_history(tags, stored)
    }

    /// History equivalent to a local record
    pub fn from_record(key: &str, table: TableId, record: &ValueRecord) -> Self {
        let slots = record
            .tag_list
            .iter()
            .enumerate()
            .map(|(pos, tag)| HistorySlot {
                index: pos + 1,
                tag: *tag,
                share: if record.slot == Some(pos) { record.share.clone() } else { None },
            })
            .collect();
        Self {
            key: key.to_string(),
            table,
            slots,
        }
    }
}
