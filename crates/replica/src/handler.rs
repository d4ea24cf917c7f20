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

//! Replica-side read command handler

use crate::command::{ReadMessage, ReadResponse, ReplyMessage};
use crate::enrichment::EnrichmentStrategy;
use crate::error::HandlerError;
use crate::storage::{MessagingService, StorageEngine};
use metrics::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};
use treas_common::NodeState;
use treas_common::globals::GLOBAL_NODE_STATE;

/// What happened to a request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Reply handed to the messaging service
    Sent,
    /// Request outlived its timeout, no reply sent
    Dropped,
}

/// Handler statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerStats {
    pub received: u64,
    pub replied: u64,
    pub dropped: u64,
    pub rejected: u64,
}

/// Serves read requests against the local storage engine
pub struct ReadCommandHandler {
    storage: Arc<dyn StorageEngine>,
    messaging: Arc<dyn MessagingService>,
    enrichment: Arc<dyn EnrichmentStrategy>,
    node: Arc<NodeState>,
    metrics_received: AtomicU64,
    metrics_replied: AtomicU64,
    metrics_dropped: AtomicU64,
    metrics_rejected: AtomicU64,
}

impl ReadCommandHandler {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        messaging: Arc<dyn MessagingService>,
        enrichment: Arc<dyn EnrichmentStrategy>,
    ) -> Self {
        Self::with_node_state(storage, messaging, enrichment, GLOBAL_NODE_STATE.clone())
    }

    pub fn with_node_state(
        storage: Arc<dyn StorageEngine>,
        messaging: Arc<dyn MessagingService>,
        enrichment: Arc<dyn EnrichmentStrategy>,
        node: Arc<NodeState>,
    ) -> Self {
        Self {
            storage,
            messaging,
            enrichment,
            node,
            metrics_received: AtomicU64::new(0),
            metrics_replied: AtomicU64::new(0),
            metrics_dropped: AtomicU64::new(0),
            metrics_rejected: AtomicU64::new(0),
        }
    }

    /// Serve one read request.
    ///
    /// Fails only when the request itself cannot be served (bootstrapping,
    /// storage failure). A request that timed out while it was being served
    /// is dropped without a reply and reported as [`Delivery::Dropped`].
    pub fn handle(&self, message: ReadMessage) -> Result<Delivery, HandlerError> {
        self.metrics_received.fetch_add(1, Ordering::Relaxed);

        if self.node.is_bootstrap_mode() {
            self.metrics_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(from = %message.from, key = %message.command.key, "Rejecting read while bootstrapping");
            return Err(HandlerError::Bootstrapping);
        }

        let ReadMessage {
            id,
            from,
            mut command,
            constructed_at,
            timeout,
            cross_node,
        } = message;
        command.set_monitoring_time(constructed_at, cross_node, timeout);

        let response = {
            let controller = self.storage.execution_controller(&command)?;
            let rows = self.storage.execute_locally(&command, &controller)?;
            let enrichment = self.enrichment.enrich(&command, &rows);
            ReadResponse::from_rows(&command, rows).with_enrichment(enrichment)
        };

        if !command.complete() {
            self.metrics_dropped.fetch_add(1, Ordering::Relaxed);
            counter!("treas_read_responses_dropped_total").increment(1);
            debug!(
                to = %from,
                lifetime_ms = constructed_at.elapsed().as_millis() as u64,
                "Discarding partial response (timed out)"
            );
            return Ok(Delivery::Dropped);
        }

        trace!(to = %from, key = %command.key, "Enqueuing response");
        self.messaging.send_reply(ReplyMessage { id, to: from, response });
        self.metrics_replied.fetch_add(1, Ordering::Relaxed);
        Ok(Delivery::Sent)
    }

    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            received: self.metrics_received.load(Ordering::Relaxed),
            replied: self.metrics_replied.load(Ordering::Relaxed),
            dropped: self.metrics_dropped.load(Ordering::Relaxed),
            rejected: self.metrics_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ReadCommand, ResponsePayload};
    use crate::enrichment::{LocalStoreEnrichment, NoEnrichment, SecondRoundTagging};
    use crate::error::StorageError;
    use crate::row::{ResponseRow, TagHistoryRow};
    use crate::storage::ReadExecutionController;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use treas_common::{ColumnLayout, LocalTagStore, Share, TableId, Tag, ValueRecord};

    #[derive(Default)]
    struct FakeStorage {
        rows: Vec<ResponseRow>,
        fail: bool,
        opened: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl StorageEngine for FakeStorage {
        fn execution_controller(&self, command: &ReadCommand) -> Result<ReadExecutionController, StorageError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let released = self.released.clone();
            Ok(ReadExecutionController::new(command.key.clone()).on_release(move || {
                released.fetch_add(1, Ordering::SeqCst);
            }))
        }

        fn execute_locally(
            &self,
            _command: &ReadCommand,
            _controller: &ReadExecutionController,
        ) -> Result<Vec<ResponseRow>, StorageError> {
            if self.fail {
                return Err(StorageError::ReadFailed {
                    reason: String::from("disk gone"),
                });
            }
            Ok(self.rows.clone())
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<ReplyMessage>>);

    impl MessagingService for Outbox {
        fn send_reply(&self, reply: ReplyMessage) {
            self.0.lock().unwrap().push(reply);
        }
    }

    fn table() -> TableId {
        TableId::new("ycsb", "usertable")
    }

    fn stored_rows() -> Vec<ResponseRow> {
        let mut history = TagHistoryRow::new("user1", table());
        history.push_share(Tag::new(1, 3), Share::new(0, "frag"));
        vec![history.to_wire(&ColumnLayout::default())]
    }

    fn message(table: TableId, timeout: Duration) -> ReadMessage {
        ReadMessage::new(7, "coordinator", ReadCommand::new(table, "user1"), timeout)
    }

    fn handler(
        storage: Arc<FakeStorage>,
        enrichment: Arc<dyn EnrichmentStrategy>,
    ) -> (ReadCommandHandler, Arc<Outbox>, Arc<NodeState>) {
        let outbox = Arc::new(Outbox::default());
        let node = Arc::new(NodeState::new("replica-1"));
        let handler = ReadCommandHandler::with_node_state(storage, outbox.clone(), enrichment, node.clone());
        (handler, outbox, node)
    }

    #[test]
    fn test_reply_sent_with_local_store_record() {
        let store = Arc::new(LocalTagStore::new());
        let record = ValueRecord::from_history(vec![Tag::new(1, 3)], Some((0, Share::new(0, "frag"))));
        store.write("user1", record.clone());
        let storage = Arc::new(FakeStorage {
            rows: stored_rows(),
            ..Default::default()
        });
        let enrichment = Arc::new(LocalStoreEnrichment::new(store, "ycsb", ColumnLayout::default()));
        let (handler, outbox, _) = handler(storage.clone(), enrichment);

        let delivery = handler.handle(message(table(), Duration::from_secs(30))).unwrap();
        assert_eq!(delivery, Delivery::Sent);

        let replies = outbox.0.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, 7);
        assert_eq!(replies[0].to, "coordinator");
        let response = &replies[0].response;
        assert_eq!(response.payload, ResponsePayload::Data(stored_rows()));
        assert_eq!(response.local_tags.as_ref().map(|m| m.tag_list.clone()), Some(record.tag_list));
        assert_eq!(storage.released.load(Ordering::SeqCst), 1);
        assert_eq!(handler.stats().replied, 1);
    }

    #[test]
    fn test_other_keyspace_not_enriched() {
        let storage = Arc::new(FakeStorage::default());
        let enrichment = Arc::new(LocalStoreEnrichment::new(
            Arc::new(LocalTagStore::new()),
            "ycsb",
            ColumnLayout::default(),
        ));
        let (handler, outbox, _) = handler(storage, enrichment);

        handler
            .handle(message(TableId::new("system", "peers"), Duration::from_secs(30)))
            .unwrap();
        let replies = outbox.0.lock().unwrap();
        assert!(replies[0].response.local_tags.is_none());
        assert!(replies[0].response.second_round.is_none());
    }

    #[test]
    fn test_second_round_marker_attached() {
        let storage = Arc::new(FakeStorage::default());
        let (handler, outbox, _) = handler(storage, Arc::new(SecondRoundTagging::new("ycsb")));

        handler.handle(message(table(), Duration::from_secs(30))).unwrap();
        let replies = outbox.0.lock().unwrap();
        assert_eq!(replies[0].response.second_round.as_ref().map(|m| m.key.as_str()), Some("user1"));
    }

    #[test]
    fn test_bootstrap_rejects_without_reading() {
        let storage = Arc::new(FakeStorage::default());
        let (handler, outbox, node) = handler(storage.clone(), Arc::new(NoEnrichment));
        node.set_bootstrap_mode(true);

        let err = handler.handle(message(table(), Duration::from_secs(30))).unwrap_err();
        assert_eq!(err, HandlerError::Bootstrapping);
        assert_eq!(storage.opened.load(Ordering::SeqCst), 0);
        assert!(outbox.0.lock().unwrap().is_empty());
        assert_eq!(handler.stats().rejected, 1);
    }

    #[test]
    fn test_timed_out_response_dropped() {
        let storage = Arc::new(FakeStorage {
            rows: stored_rows(),
            ..Default::default()
        });
        let (handler, outbox, _) = handler(storage.clone(), Arc::new(NoEnrichment));

        let delivery = handler.handle(message(table(), Duration::ZERO)).unwrap();
        assert_eq!(delivery, Delivery::Dropped);
        assert!(outbox.0.lock().unwrap().is_empty());
        assert_eq!(storage.released.load(Ordering::SeqCst), 1);

        let stats = handler.stats();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.replied, 0);
    }

    #[test]
    fn test_storage_failure_still_releases_scope() {
        let storage = Arc::new(FakeStorage {
            fail: true,
            ..Default::default()
        });
        let (handler, outbox, _) = handler(storage.clone(), Arc::new(NoEnrichment));

        let err = handler.handle(message(table(), Duration::from_secs(30))).unwrap_err();
        assert!(matches!(err, HandlerError::Storage(StorageError::ReadFailed { .. })));
        assert_eq!(storage.opened.load(Ordering::SeqCst), 1);
        assert_eq!(storage.released.load(Ordering::SeqCst), 1);
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_digest_query_replies_with_digest() {
        let storage = Arc::new(FakeStorage {
            rows: stored_rows(),
            ..Default::default()
        });
        let (handler, outbox, _) = handler(storage, Arc::new(NoEnrichment));

        let mut message = message(table(), Duration::from_secs(30));
        message.command = message.command.with_digest();
        handler.handle(message).unwrap();

        let replies = outbox.0.lock().unwrap();
        assert!(replies[0].response.is_digest_response());
        assert_eq!(replies[0].response.digest(), crate::digest::rows_digest(&stored_rows()));
    }
}
