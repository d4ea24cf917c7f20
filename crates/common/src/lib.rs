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

//! # Treas Common
//!
//! Types shared by every stage of the erasure-coded read path: version tags,
//! shares, the per-key record a node keeps, the process-wide local tag store
//! and the read path configuration.

pub mod config;
pub mod globals;
pub mod record;
pub mod table;
pub mod tag;
pub mod tag_store;

pub use config::{ColumnLayout, ConfigError, EnrichmentMode, TreasConfig};
pub use globals::NodeState;
pub use record::{Share, ShareParseError, ValueRecord};
pub use table::TableId;
pub use tag::{Tag, TagParseError};
pub use tag_store::LocalTagStore;
