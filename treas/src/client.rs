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

//! Coordinator-side view of a replica

use anyhow::{Result, anyhow, bail};
use futures::future::BoxFuture;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;
use treas_common::NodeState;
use treas_replica::{
    Delivery, EnrichmentStrategy, HandlerStats, MessagingService, ReadCommand, ReadCommandHandler, ReadMessage, ReadResponse,
    ReplyMessage, StorageEngine,
};

/// Sends a read command to one replica and waits for its response
pub trait ReplicaClient: Send + Sync {
    /// Name the replica reports under
    fn replica(&self) -> &str;

    fn read(&self, command: ReadCommand, timeout: Duration) -> BoxFuture<'static, Result<ReadResponse>>;
}

/// Routes replies back to the read waiting on their message id
#[derive(Debug, Default)]
struct ReplyRouter {
    pending: Mutex<HashMap<u64, oneshot::Sender<ReadResponse>>>,
}

impl ReplyRouter {
    fn register(&self, id: u64) -> oneshot::Receiver<ReadResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        rx
    }

    fn cancel(&self, id: u64) {
        self.pending.lock().remove(&id);
    }
}

impl MessagingService for ReplyRouter {
    fn send_reply(&self, reply: ReplyMessage) {
        let Some(tx) = self.pending.lock().remove(&reply.id) else {
            debug!(id = reply.id, to = %reply.to, "No reader waiting for reply");
            return;
        };
        if tx.send(reply.response).is_err() {
            debug!(id = reply.id, "Reader went away before reply arrived");
        }
    }
}

/// Replica living in the coordinator's process.
///
/// Requests are served by a [`ReadCommandHandler`] on the blocking pool and
/// replies travel back over a oneshot channel per message.
pub struct LocalReplicaClient {
    name: String,
    coordinator: String,
    handler: Arc<ReadCommandHandler>,
    router: Arc<ReplyRouter>,
    next_id: AtomicU64,
}

impl LocalReplicaClient {
    pub fn new(
        name: &str,
        storage: Arc<dyn StorageEngine>,
        enrichment: Arc<dyn EnrichmentStrategy>,
        node: Arc<NodeState>,
    ) -> Self {
        let router = Arc::new(ReplyRouter::default());
        let handler = ReadCommandHandler::with_node_state(storage, router.clone(), enrichment, node);
        Self {
            name: name.to_string(),
            coordinator: String::from("coordinator"),
            handler: Arc::new(handler),
            router,
            next_id: AtomicU64::new(1),
        }
    }

    /// Name stamped on outgoing messages as their sender
    pub fn with_coordinator(mut self, coordinator: &str) -> Self {
        self.coordinator = coordinator.to_string();
        self
    }

    pub fn stats(&self) -> HandlerStats {
        self.handler.stats()
    }
}

impl ReplicaClient for LocalReplicaClient {
    fn replica(&self) -> &str {
        &self.name
    }

    fn read(&self, command: ReadCommand, timeout: Duration) -> BoxFuture<'static, Result<ReadResponse>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = ReadMessage::new(id, &self.coordinator, command, timeout);
        let reply = self.router.register(id);
        Box::pin(serve(
            self.name.clone(),
            self.handler.clone(),
            self.router.clone(),
            message,
            reply,
        ))
    }
}

async fn serve(
    name: String,
    handler: Arc<ReadCommandHandler>,
    router: Arc<ReplyRouter>,
    message: ReadMessage,
    reply: oneshot::Receiver<ReadResponse>,
) -> Result<ReadResponse> {
    let id = message.id;
    let delivery = tokio::task::spawn_blocking(move || handler.handle(message))
        .await
        .map_err(|e| anyhow!("replica {name} handler task failed: {e}"))?;

    match delivery {
        Ok(Delivery::Sent) => reply
            .await
            .map_err(|_| anyhow!("replica {name} closed the reply channel")),
        Ok(Delivery::Dropped) => {
            router.cancel(id);
            bail!("replica {name} dropped the read after its timeout")
        }
        Err(err) => {
            router.cancel(id);
            Err(anyhow::Error::new(err).context(format!("replica {name} rejected the read")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treas_common::TableId;
    use treas_replica::{NoEnrichment, ReadExecutionController, ResponseRow, StorageError};

    #[derive(Debug)]
    struct EmptyStorage;

    impl StorageEngine for EmptyStorage {
        fn execution_controller(&self, command: &ReadCommand) -> Result<ReadExecutionController, StorageError> {
            Ok(ReadExecutionController::new(command.key.clone()))
        }

        fn execute_locally(
            &self,
            command: &ReadCommand,
            _controller: &ReadExecutionController,
        ) -> Result<Vec<ResponseRow>, StorageError> {
            Ok(vec![ResponseRow::new(&command.key, command.table.clone())])
        }
    }

    fn client(node: Arc<NodeState>) -> LocalReplicaClient {
        LocalReplicaClient::new("r1", Arc::new(EmptyStorage), Arc::new(NoEnrichment), node)
    }

    fn command() -> ReadCommand {
        ReadCommand::new(TableId::new("ycsb", "usertable"), "user1")
    }

    #[tokio::test]
    async fn test_reply_routed_to_reader() {
        let client = client(Arc::new(NodeState::new("r1")));
        let response = client.read(command(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(response.key, "user1");
        assert_eq!(response.rows().len(), 1);
        assert_eq!(client.stats().replied, 1);
        assert!(client.router.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrapping_replica_errors() {
        let node = Arc::new(NodeState::new("r1"));
        node.set_bootstrap_mode(true);
        let client = client(node);

        let err = client.read(command(), Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert!(client.router.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_read_errors() {
        let client = client(Arc::new(NodeState::new("r1")));
        let err = client.read(command(), Duration::ZERO).await.unwrap_err();
        assert!(err.to_string().contains("dropped"));
        assert_eq!(client.stats().dropped, 1);
    }
}
