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

//! # Treas Replica
//!
//! The replica half of the read path and the coordinator-side decoding of
//! what replicas send back.
//!
//! A replica serves a [`ReadMessage`] through [`ReadCommandHandler`]: it reads
//! the key inside a [`ReadExecutionController`] scope, decorates the response
//! per the configured [`EnrichmentStrategy`] and replies unless the request
//! timed out. The coordinator turns each [`ReadResponse`] into a
//! [`treas_quorum::ReplicaObservation`] with [`ReplicaResponseDecoder`].

pub mod command;
pub mod decoder;
pub mod digest;
pub mod enrichment;
pub mod error;
pub mod handler;
pub mod row;
pub mod storage;

pub use command::{
    Enrichment, LocalTagMetadata, ReadCommand, ReadMessage, ReadResponse, ReplyMessage, ResponsePayload, SecondRoundMarker,
};
pub use decoder::{DecodedResponse, ReplicaResponseDecoder};
pub use digest::{extract_max_tag_response, responses_match, rows_digest};
pub use enrichment::{EnrichmentStrategy, LocalStoreEnrichment, NoEnrichment, SecondRoundTagging, strategy_for};
pub use error::{DecodeError, HandlerError, StorageError};
pub use handler::{Delivery, HandlerStats, ReadCommandHandler};
pub use row::{Cell, HistorySlot, ResponseRow, TagHistoryRow};
pub use storage::{MessagingService, ReadExecutionController, StorageEngine};
