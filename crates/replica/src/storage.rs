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

//! Collaborators the read handler depends on: storage and messaging

use crate::command::{ReadCommand, ReplyMessage};
use crate::error::StorageError;
use crate::row::ResponseRow;
use std::fmt;
use tracing::trace;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Scope of one local read.
///
/// Whatever the storage engine acquired for the read is released when the
/// controller is dropped, on every exit path of the handler.
pub struct ReadExecutionController {
    label: String,
    release: Option<ReleaseHook>,
}

impl ReadExecutionController {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            release: None,
        }
    }

    /// Run `hook` when the controller goes out of scope
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ReadExecutionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadExecutionController")
            .field("label", &self.label)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

impl Drop for ReadExecutionController {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            trace!(scope = %self.label, "Released read execution resources");
        }
    }
}

/// Local storage engine serving single-partition reads
pub trait StorageEngine: Send + Sync {
    /// Open the execution scope for a read
    fn execution_controller(&self, command: &ReadCommand) -> Result<ReadExecutionController, StorageError>;

    /// Read the command's key from local storage within `controller`'s scope
    fn execute_locally(
        &self,
        command: &ReadCommand,
        controller: &ReadExecutionController,
    ) -> Result<Vec<ResponseRow>, StorageError>;
}

/// Outbound message delivery
pub trait MessagingService: Send + Sync {
    fn send_reply(&self, reply: ReplyMessage);
}
