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

//! Per-node key -> record map consulted by local reads and seeded into quorums

use crate::record::ValueRecord;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

type Entry = Arc<RwLock<ValueRecord>>;

/// Concurrent key-indexed store of the latest record this node holds per key.
///
/// The outer map is only write-locked to register a new key, so first-touch
/// creation is atomic: every concurrent creator ends up with the same entry.
/// Records are replaced whole under the entry lock, so a reader sees either
/// the record before a write or the one after it.
#[derive(Debug, Default)]
pub struct LocalTagStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl LocalTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the entry for a key
    fn entry(&self, key: &str) -> Entry {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                return entry.clone();
            }
        }

        let mut entries = self.entries.write();
        entries
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Registered empty tag record");
                Arc::new(RwLock::new(ValueRecord::empty()))
            })
            .clone()
    }

    /// Current record for `key`, registering an empty one on first touch
    pub fn read_tag(&self, key: &str) -> ValueRecord {
        self.entry(key).read().clone()
    }

    /// Current record for `key` without registering anything
    pub fn get(&self, key: &str) -> Option<ValueRecord> {
        self.entries.read().get(key).map(|entry| entry.read().clone())
    }

    /// Install `record` if it is newer than what is stored.
    ///
    /// Returns whether the record was applied.
    pub fn write(&self, key: &str, record: ValueRecord) -> bool {
        let entry = self.entry(key);
        let mut current = entry.write();
        if !record.max_tag.is_larger_than(&current.max_tag) {
            debug!(
                key = %key,
                stored = %current.max_tag,
                offered = %record.max_tag,
                "Ignoring stale tag record"
            );
            return false;
        }
        *current = record;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
