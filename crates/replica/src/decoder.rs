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

//! Replica response decoding

use crate::command::ReadResponse;
use crate::error::DecodeError;
use crate::row::TagHistoryRow;
use metrics::counter;
use tracing::debug;
use treas_common::{ColumnLayout, ValueRecord};
use treas_quorum::{ReplicaObservation, TagObservation};

/// Observations extracted from one replica response, plus what was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    pub observation: ReplicaObservation,
    pub skipped: Vec<DecodeError>,
}

/// Turns raw replica responses into resolver input
#[derive(Debug, Clone, Default)]
pub struct ReplicaResponseDecoder {
    layout: ColumnLayout,
}

impl ReplicaResponseDecoder {
    pub fn new(layout: ColumnLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Decode one response from `replica`.
    ///
    /// Local tag metadata attached by the replica and the data rows are two
    /// views of the same replica; whichever reaches the larger tag is used,
    /// the rows on a tie. Returns `None` for responses that hold nothing for
    /// the key, including digest responses without metadata.
    pub fn decode(&self, replica: &str, response: &ReadResponse) -> Option<DecodedResponse> {
        let from_rows = self.decode_rows(replica, response);
        let from_metadata = decode_metadata(replica, response);

        match (from_rows, from_metadata) {
            (Some(rows), Some(metadata)) if metadata.observation.max_tag() > rows.observation.max_tag() => {
                debug!(
                    replica = %replica,
                    key = %response.key,
                    local = %metadata.observation.max_tag(),
                    stored = %rows.observation.max_tag(),
                    "Local tag record ahead of storage rows"
                );
                Some(metadata)
            }
            (Some(rows), _) => Some(rows),
            (None, metadata) => metadata,
        }
    }

    fn decode_rows(&self, replica: &str, response: &ReadResponse) -> Option<DecodedResponse> {
        if response.is_digest_response() {
            debug!(replica = %replica, key = %response.key, "Digest response carries no tag columns");
            return None;
        }

        let rows = response.rows();
        if rows.is_empty() {
            debug!(replica = %replica, key = %response.key, "Replica holds no row for key");
            return None;
        }

        let mut observation = ReplicaObservation::new(replica, &response.key, response.table.clone());
        let mut skipped = Vec::new();
        for row in rows {
            if row.key != response.key {
                skipped.push(DecodeError::KeyMismatch {
                    expected: response.key.clone(),
                    got: row.key.clone(),
                });
                continue;
            }
            let (history, row_skipped) = TagHistoryRow::from_wire(row, &self.layout);
            skipped.extend(row_skipped);
            observation.tags.extend(observation_from(replica, &history).tags);
        }

        // one share per replica, even across rows
        let mut seen_share = false;
        for tag in &mut observation.tags {
            if tag.share.is_some() {
                if seen_share {
                    skipped.push(DecodeError::ExtraShare { slot: tag.slot });
                    tag.share = None;
                }
                seen_share = true;
            }
        }

        if !skipped.is_empty() {
            counter!("treas_decode_skipped_columns_total").increment(skipped.len() as u64);
            debug!(replica = %replica, key = %response.key, skipped = skipped.len(), "Decoded response with skipped columns");
        }

        Some(DecodedResponse { observation, skipped })
    }

    /// Decode every response, dropping the ones that carry nothing usable
    pub fn decode_all<'a, I>(&self, responses: I) -> Vec<DecodedResponse>
    where
        I: IntoIterator<Item = (&'a str, &'a ReadResponse)>,
    {
        responses
            .into_iter()
            .filter_map(|(replica, response)| self.decode(replica, response))
            .collect()
    }
}

fn decode_metadata(replica: &str, response: &ReadResponse) -> Option<DecodedResponse> {
    let record = ValueRecord::from(response.local_tags.as_ref()?);
    if record.is_empty() {
        return None;
    }
    let history = TagHistoryRow::from_record(&response.key, response.table.clone(), &record);
    Some(DecodedResponse {
        observation: observation_from(replica, &history),
        skipped: Vec::new(),
    })
}

fn observation_from(replica: &str, history: &TagHistoryRow) -> ReplicaObservation {
    let mut observation = ReplicaObservation::new(replica, &history.key, history.table.clone());
    observation.tags = history
        .slots
        .iter()
        .map(|slot| match &slot.share {
            Some(share) => TagObservation::with_share(slot.index, slot.tag, share.clone()),
            None => TagObservation::marker(slot.index, slot.tag),
        })
        .collect();
    observation
}
