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

//! # Treas
//!
//! Reads from an erasure-coded atomic register.
//!
//! A [`ReadCoordinator`] sends one read command to every replica of a key
//! through [`ReplicaClient`]s, resolves the certified tags from whatever came
//! back before the read timeout and decodes the value with an
//! [`ErasureCodec`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use treas::{ErasureCodec, ReadCoordinator, ReplicaClient, StripeCodec};
//! use treas_common::{TableId, TreasConfig};
//! use treas_replica::ReadCommand;
//!
//! # async fn run(replicas: Vec<Arc<dyn ReplicaClient>>) -> anyhow::Result<()> {
//! let config = TreasConfig::from_env()?;
//! let codec: Arc<dyn ErasureCodec> = Arc::new(StripeCodec::new(config.recovery_threshold)?);
//! let coordinator = ReadCoordinator::new(&config, replicas, codec)?;
//!
//! let result = coordinator.read(ReadCommand::new(TableId::new("ycsb", "usertable"), "user1")).await?;
//! tracing::info!(bytes = result.value.len(), tag = %result.recover_tag, "Read value");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod read_coordinator;

pub use client::{LocalReplicaClient, ReplicaClient};
pub use codec::{CodecError, ErasureCodec, StripeCodec};
pub use read_coordinator::{ReadCoordinator, ReadError, ReadResult};
