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

//! Response enrichment strategies
//!
//! A replica decorates its read response in exactly one way, chosen by
//! [`EnrichmentMode`]. `LocalStore` is the steady-state mode.

use crate::command::{Enrichment, LocalTagMetadata, ReadCommand, SecondRoundMarker};
use crate::row::{ResponseRow, TagHistoryRow};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use treas_common::{ColumnLayout, EnrichmentMode, LocalTagStore, TreasConfig};

/// Decides what a replica attaches to its read response
pub trait EnrichmentStrategy: Send + Sync + fmt::Debug {
    fn mode(&self) -> EnrichmentMode;

    /// Extra fields for the response to `command`, given the rows read locally
    fn enrich(&self, command: &ReadCommand, rows: &[ResponseRow]) -> Enrichment;
}

/// Attach the local tag store record for the opted-in keyspace
#[derive(Debug)]
pub struct LocalStoreEnrichment {
    store: Arc<LocalTagStore>,
    keyspace: String,
    layout: ColumnLayout,
}

impl LocalStoreEnrichment {
    pub fn new(store: Arc<LocalTagStore>, keyspace: &str, layout: ColumnLayout) -> Self {
        Self {
            store,
            keyspace: keyspace.to_string(),
            layout,
        }
    }

    /// Bring the record up to the history the storage engine returned.
    ///
    /// Fills a record lost on restart and catches up with writes that reached
    /// storage without passing through this store.
    fn refresh_from_rows(&self, command: &ReadCommand, rows: &[ResponseRow]) {
        for row in rows.iter().filter(|r| r.key == command.key) {
            let (history, _) = TagHistoryRow::from_wire(row, &self.layout);
            let record = history.to_value_record();
            if !record.is_empty() && self.store.write(&command.key, record) {
                debug!(key = %command.key, tag = %history.max_tag(), "Refreshed local tag record from storage");
            }
        }
    }
}

impl EnrichmentStrategy for LocalStoreEnrichment {
    fn mode(&self) -> EnrichmentMode {
        EnrichmentMode::LocalStore
    }

    fn enrich(&self, command: &ReadCommand, rows: &[ResponseRow]) -> Enrichment {
        if command.keyspace() != self.keyspace {
            return Enrichment::default();
        }

        self.refresh_from_rows(command, rows);
        let record = self.store.read_tag(&command.key);
        debug!(key = %command.key, tag = %record.max_tag, "Attaching local tag record");

        Enrichment {
            local_tags: Some(LocalTagMetadata::from(record)),
            second_round: None,
        }
    }
}

/// Tag the response as input to second-round tag resolution
#[derive(Debug)]
pub struct SecondRoundTagging {
    keyspace: String,
}

impl SecondRoundTagging {
    pub fn new(keyspace: &str) -> Self {
        Self {
            keyspace: keyspace.to_string(),
        }
    }
}

impl EnrichmentStrategy for SecondRoundTagging {
    fn mode(&self) -> EnrichmentMode {
        EnrichmentMode::SecondRound
    }

    fn enrich(&self, command: &ReadCommand, _rows: &[ResponseRow]) -> Enrichment {
        if command.keyspace() != self.keyspace {
            return Enrichment::default();
        }
        Enrichment {
            local_tags: None,
            second_round: Some(SecondRoundMarker {
                key: command.key.clone(),
            }),
        }
    }
}

/// Leave responses as the storage engine built them
#[derive(Debug, Default)]
pub struct NoEnrichment;

impl EnrichmentStrategy for NoEnrichment {
    fn mode(&self) -> EnrichmentMode {
        EnrichmentMode::Disabled
    }

    fn enrich(&self, _command: &ReadCommand, _rows: &[ResponseRow]) -> Enrichment {
        Enrichment::default()
    }
}

/// The strategy `config` selects
pub fn strategy_for(config: &TreasConfig, store: Arc<LocalTagStore>) -> Arc<dyn EnrichmentStrategy> {
    match config.enrichment {
        EnrichmentMode::LocalStore => Arc::new(LocalStoreEnrichment::new(
            store,
            &config.enriched_keyspace,
            config.column_layout(),
        )),
        EnrichmentMode::SecondRound => Arc::new(SecondRoundTagging::new(&config.enriched_keyspace)),
        EnrichmentMode::Disabled => Arc::new(NoEnrichment),
    }
}
