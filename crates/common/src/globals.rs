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

use crate::record::ValueRecord;
use crate::tag_store::LocalTagStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::info;

/// Process-wide local tag store shared by the read handler and the resolver
pub static GLOBAL_TAG_STORE: LazyLock<Arc<LocalTagStore>> = LazyLock::new(|| Arc::new(LocalTagStore::new()));

/// Process-wide node lifecycle state
pub static GLOBAL_NODE_STATE: LazyLock<Arc<NodeState>> = LazyLock::new(|| Arc::new(NodeState::new("")));

/// Lifecycle flags for the local node
#[derive(Debug)]
pub struct NodeState {
    name: RwLock<String>,
    bootstrapping: AtomicBool,
}

impl NodeState {
    pub fn new(name: &str) -> Self {
        Self {
            name: RwLock::new(name.to_string()),
            bootstrapping: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }

    /// Whether the node is still streaming data in and must not serve reads
    pub fn is_bootstrap_mode(&self) -> bool {
        self.bootstrapping.load(Ordering::Acquire)
    }

    pub fn set_bootstrap_mode(&self, bootstrapping: bool) {
        let was = self.bootstrapping.swap(bootstrapping, Ordering::AcqRel);
        if was != bootstrapping {
            info!(node = %self.name(), bootstrapping, "Node bootstrap mode changed");
        }
    }
}

pub fn set_local_node_name(name: &str) {
    GLOBAL_NODE_STATE.set_name(name);
}

pub fn local_node_name() -> String {
    GLOBAL_NODE_STATE.name()
}

pub fn is_bootstrap_mode() -> bool {
    GLOBAL_NODE_STATE.is_bootstrap_mode()
}

pub fn set_bootstrap_mode(bootstrapping: bool) {
    GLOBAL_NODE_STATE.set_bootstrap_mode(bootstrapping);
}

/// Read the local record for a key, registering an empty one on first touch
pub fn read_local_tag(key: &str) -> ValueRecord {
    GLOBAL_TAG_STORE.read_tag(key)
}

/// Install a newer local record for a key
pub fn write_local_tag(key: &str, record: ValueRecord) -> bool {
    GLOBAL_TAG_STORE.write(key, record)
}
