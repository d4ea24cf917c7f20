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

//! Drives one logical read across the replicas of a key

use crate::client::ReplicaClient;
use crate::codec::{CodecError, ErasureCodec};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use treas_common::globals::{GLOBAL_TAG_STORE, local_node_name};
use treas_common::{LocalTagStore, Tag, TreasConfig};
use treas_quorum::{QuorumError, QuorumTagResolver, QuorumThresholds, ReplicaObservation};
use treas_replica::{ReadCommand, ReadResponse, ReplicaResponseDecoder};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error(transparent)]
    Quorum(#[from] QuorumError),

    #[error("decoding value for tag {tag} failed: {source}")]
    Codec {
        tag: Tag,
        #[source]
        source: CodecError,
    },
}

/// A value read at a certified tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub key: String,
    /// Latest tag certified as durably written
    pub quorum_tag: Tag,
    /// Tag the returned value was decoded at
    pub recover_tag: Tag,
    pub value: Bytes,
    /// Replicas that answered before the deadline
    pub responses: usize,
    /// Some replica asked for a second round on this key
    pub second_round: bool,
}

impl ReadResult {
    /// Whether the value is at least as new as the latest durable write
    pub fn is_current(&self) -> bool {
        self.recover_tag >= self.quorum_tag
    }
}

pub struct ReadCoordinator {
    replicas: Vec<Arc<dyn ReplicaClient>>,
    decoder: ReplicaResponseDecoder,
    resolver: QuorumTagResolver,
    codec: Arc<dyn ErasureCodec>,
    read_timeout: Duration,
}

impl ReadCoordinator {
    /// Coordinator over `replicas`, resolving against the process-wide tag
    /// store as the process-wide local node
    pub fn new(
        config: &TreasConfig,
        replicas: Vec<Arc<dyn ReplicaClient>>,
        codec: Arc<dyn ErasureCodec>,
    ) -> anyhow::Result<Self> {
        let coordinator = Self::with_store(config, replicas, codec, GLOBAL_TAG_STORE.clone())?;
        Ok(coordinator.with_local_node(&local_node_name()))
    }

    pub fn with_store(
        config: &TreasConfig,
        replicas: Vec<Arc<dyn ReplicaClient>>,
        codec: Arc<dyn ErasureCodec>,
        store: Arc<LocalTagStore>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let thresholds = QuorumThresholds::from_config(config)?;
        anyhow::ensure!(!replicas.is_empty(), "read coordinator needs at least one replica");
        anyhow::ensure!(
            thresholds.recovery() >= codec.required_shares(),
            "recovery threshold {} cannot certify a value that needs {} shares",
            thresholds.recovery(),
            codec.required_shares()
        );

        info!(
            replicas = replicas.len(),
            intersection = thresholds.intersection(),
            recovery = thresholds.recovery(),
            read_quorum = thresholds.read_quorum_size(),
            "Read coordinator initialized"
        );

        Ok(Self {
            replicas,
            decoder: ReplicaResponseDecoder::new(config.column_layout()),
            resolver: QuorumTagResolver::with_store(thresholds, store),
            codec,
            read_timeout: config.read_timeout(),
        })
    }

    /// Replace the configured thresholds, e.g. with ones derived from the cluster shape
    pub fn with_thresholds(self, thresholds: QuorumThresholds) -> anyhow::Result<Self> {
        anyhow::ensure!(
            thresholds.recovery() >= self.codec.required_shares(),
            "recovery threshold {} cannot certify a value that needs {} shares",
            thresholds.recovery(),
            self.codec.required_shares()
        );
        Ok(Self {
            resolver: self.resolver.with_thresholds(thresholds),
            ..self
        })
    }

    /// Name of the replica that runs in this process; its local record then
    /// stops voting when that replica answers
    pub fn with_local_node(self, name: &str) -> Self {
        Self {
            resolver: self.resolver.with_local_node(name),
            ..self
        }
    }

    pub fn thresholds(&self) -> &QuorumThresholds {
        self.resolver.thresholds()
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Read `command`'s key: fan out, gather until every replica answered or
    /// the read timeout passed, then resolve and decode.
    pub async fn read(&self, command: ReadCommand) -> Result<ReadResult, ReadError> {
        let responses = self.gather(&command).await;
        self.resolver.thresholds().verify_read_quorum(responses.len())?;

        let second_round = responses
            .iter()
            .any(|(_, response)| response.second_round.as_ref().is_some_and(|marker| marker.key == command.key));
        if second_round {
            debug!(key = %command.key, "Replica requested a second round");
        }

        let decoded = self
            .decoder
            .decode_all(responses.iter().map(|(replica, response)| (replica.as_str(), response)));
        let observations: Vec<ReplicaObservation> = decoded.into_iter().map(|d| d.observation).collect();
        let outcome = self.resolver.resolve(&command.table, &command.key, &observations)?;

        if !outcome.is_current() {
            debug!(
                key = %outcome.key,
                quorum_max = %outcome.quorum_max_tag,
                recover_max = %outcome.recover_max_tag,
                "Decodable value lags the latest durable tag"
            );
        }

        let value = self.codec.decode(&outcome.recover_shares).map_err(|source| {
            counter!("treas_decode_failures_total").increment(1);
            ReadError::Codec {
                tag: outcome.recover_max_tag,
                source,
            }
        })?;

        Ok(ReadResult {
            key: outcome.key,
            quorum_tag: outcome.quorum_max_tag,
            recover_tag: outcome.recover_max_tag,
            value,
            responses: responses.len(),
            second_round,
        })
    }

    async fn gather(&self, command: &ReadCommand) -> Vec<(String, ReadResponse)> {
        let mut pending: FuturesUnordered<_> = self
            .replicas
            .iter()
            .map(|client| {
                let replica = client.replica().to_string();
                let read = client.read(command.clone(), self.read_timeout);
                async move { (replica, read.await) }
            })
            .collect();

        let deadline = Instant::now() + self.read_timeout;
        let mut responses = Vec::with_capacity(self.replicas.len());
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let next = time::timeout(remaining, pending.next()).await;
            match next {
                Ok(Some((replica, Ok(response)))) => responses.push((replica, response)),
                Ok(Some((replica, Err(err)))) => {
                    warn!(replica = %replica, key = %command.key, error = %err, "Replica read failed");
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(
                        key = %command.key,
                        outstanding = pending.len(),
                        "Read timeout passed with replicas outstanding"
                    );
                    break;
                }
            }
        }
        responses
    }
}
