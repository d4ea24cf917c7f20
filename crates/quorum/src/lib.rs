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

//! # Treas Quorum Resolution
//!
//! Certification of version tags for erasure-coded atomic-register reads.
//!
//! ## Certification Rules
//!
//! - **Quorum certification**: a tag is durable once `intersection` voters
//!   report it, the guaranteed overlap between any two quorums.
//! - **Recovery certification**: a tag is decodable once `recovery` shares
//!   for it have been collected.
//!
//! ## Example
//!
//! ```rust
//! use treas_common::{Share, TableId, Tag};
//! use treas_quorum::{QuorumThresholds, QuorumTagResolver, ReplicaObservation};
//!
//! let resolver = QuorumTagResolver::new(QuorumThresholds::new(1, 1).unwrap());
//! let tag = Tag::new(1, 10);
//! let observation = ReplicaObservation::new("node1", "doc-example", TableId::new("ks", "t"))
//!     .marker(1, tag)
//!     .share(2, tag, Share::new(0, "fragment"));
//!
//! let outcome = resolver.resolve(&TableId::new("ks", "t"), "doc-example", &[observation]).unwrap();
//! assert_eq!(outcome.recover_max_tag, tag);
//! ```

pub mod error;
pub mod observation;
pub mod resolver;
pub mod thresholds;

pub use error::QuorumError;
pub use observation::{ReplicaObservation, TagObservation};
pub use resolver::{QuorumTagResolver, ResolutionOutcome};
pub use thresholds::QuorumThresholds;
