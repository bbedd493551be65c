// Copyright 2025 eraflo
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

use crate::renderer::api::dstorage::{DStorageFileId, DStorageFileInfo, DStorageRequest};
use crate::renderer::api::sync::FenceId;
use crate::renderer::error::ResourceError;
use std::fmt::Debug;

/// A hardware scatter-gather queue reading files straight into GPU resources.
///
/// Requests accumulate on the queue until [`submit`](DirectStorageQueue::submit),
/// which dispatches all of them and arranges for the given device fence to be
/// signaled once every request has landed.
pub trait DirectStorageQueue: Send + Sync + Debug + 'static {
    /// Opens a file for reading through the queue.
    fn open_file(&self, path: &str) -> Result<DStorageFileId, ResourceError>;

    /// Returns information about an opened file.
    fn query_file_info(&self, file: DStorageFileId) -> Result<DStorageFileInfo, ResourceError>;

    /// Enqueues a read. Nothing is transferred before the next submit.
    fn enqueue_request(&self, request: &DStorageRequest) -> Result<(), ResourceError>;

    /// Dispatches every enqueued request; `signal_fence` completes after all of them.
    fn submit(&self, signal_fence: FenceId) -> Result<(), ResourceError>;

    /// Closes a file. Requests already submitted against it are unaffected.
    fn close_file(&self, file: DStorageFileId);
}
