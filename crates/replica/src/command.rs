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

//! Read commands, responses and the messages that carry them

use crate::row::ResponseRow;
use std::time::{Duration, Instant};
use treas_common::{Share, TableId, Tag, ValueRecord};

/// Single-partition read of one key
#[derive(Debug, Clone)]
pub struct ReadCommand {
    pub table: TableId,
    pub key: String,
    /// Ask for a digest of the data instead of the data itself
    pub digest_query: bool,
    constructed_at: Instant,
    timeout: Duration,
    cross_node: bool,
}

impl ReadCommand {
    pub fn new(table: TableId, key: &str) -> Self {
        Self {
            table,
            key: key.to_string(),
            digest_query: false,
            constructed_at: Instant::now(),
            timeout: Duration::from_secs(5),
            cross_node: false,
        }
    }

    pub fn with_digest(mut self) -> Self {
        self.digest_query = true;
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.table.keyspace
    }

    /// Start the monitoring window from the message that carried the command
    pub fn set_monitoring_time(&mut self, constructed_at: Instant, cross_node: bool, timeout: Duration) {
        self.constructed_at = constructed_at;
        self.cross_node = cross_node;
        self.timeout = timeout;
    }

    pub fn is_cross_node(&self) -> bool {
        self.cross_node
    }

    /// Whether a reply built now would still be inside the timeout window
    pub fn complete(&self) -> bool {
        self.constructed_at.elapsed() < self.timeout
    }
}

/// Inbound read request
#[derive(Debug, Clone)]
pub struct ReadMessage {
    pub id: u64,
    /// Node that sent the request and expects the reply
    pub from: String,
    pub command: ReadCommand,
    pub constructed_at: Instant,
    pub timeout: Duration,
    pub cross_node: bool,
}

impl ReadMessage {
    pub fn new(id: u64, from: &str, command: ReadCommand, timeout: Duration) -> Self {
        Self {
            id,
            from: from.to_string(),
            command,
            constructed_at: Instant::now(),
            timeout,
            cross_node: true,
        }
    }

    /// Time since the message was constructed
    pub fn lifetime(&self) -> Duration {
        self.constructed_at.elapsed()
    }
}

/// Digest-or-data body of a read response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    Digest([u8; 16]),
    Data(Vec<ResponseRow>),
}

/// Local tag store state attached to a response for the opted-in keyspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTagMetadata {
    pub tag_list: Vec<Tag>,
    pub value: Option<Share>,
    /// Position in `tag_list` of the tag `value` was written under
    pub share_index: Option<usize>,
}

impl From<ValueRecord> for LocalTagMetadata {
    fn from(record: ValueRecord) -> Self {
        Self {
            tag_list: record.tag_list,
            value: record.share,
            share_index: record.slot,
        }
    }
}

impl From<&LocalTagMetadata> for ValueRecord {
    fn from(metadata: &LocalTagMetadata) -> Self {
        let stored = metadata.share_index.zip(metadata.value.clone());
        ValueRecord::from_history(metadata.tag_list.clone(), stored)
    }
}

/// Marks a response as input to second-round tag resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondRoundMarker {
    pub key: String,
}

/// Extra fields an enrichment strategy adds to a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub local_tags: Option<LocalTagMetadata>,
    pub second_round: Option<SecondRoundMarker>,
}

/// Response to a [`ReadCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub key: String,
    pub table: TableId,
    pub payload: ResponsePayload,
    pub local_tags: Option<LocalTagMetadata>,
    pub second_round: Option<SecondRoundMarker>,
}

impl ReadResponse {
    /// Data or digest response for the rows a local read produced
    pub fn from_rows(command: &ReadCommand, rows: Vec<ResponseRow>) -> Self {
        let payload = if command.digest_query {
            ResponsePayload::Digest(crate::digest::rows_digest(&rows))
        } else {
            ResponsePayload::Data(rows)
        };
        Self {
            key: command.key.clone(),
            table: command.table.clone(),
            payload,
            local_tags: None,
            second_round: None,
        }
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.local_tags = enrichment.local_tags;
        self.second_round = enrichment.second_round;
        self
    }

    pub fn is_digest_response(&self) -> bool {
        matches!(self.payload, ResponsePayload::Digest(_))
    }

    pub fn rows(&self) -> &[ResponseRow] {
        match &self.payload {
            ResponsePayload::Data(rows) => rows,
            ResponsePayload::Digest(_) => &[],
        }
    }

    /// Digest of the response, computing it for data responses
    pub fn digest(&self) -> [u8; 16] {
        match &self.payload {
            ResponsePayload::Digest(digest) => *digest,
            ResponsePayload::Data(rows) => crate::digest::rows_digest(rows),
        }
    }
}

/// Outbound reply to the node that sent a [`ReadMessage`]
#[derive(Debug, Clone)]
pub struct ReplyMessage {
    pub id: u64,
    pub to: String,
    pub response: ReadResponse,
}
