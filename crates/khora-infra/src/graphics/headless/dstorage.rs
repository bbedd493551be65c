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

use super::device::HeadlessDevice;
use super::lock;
use khora_core::renderer::traits::DirectStorageQueue;
use khora_core::renderer::{
    DStorageDestination, DStorageFileId, DStorageFileInfo, DStorageRequest, FenceId,
    ResourceError,
};
use khora_core::vfs::{OpenMode, VfsError, VfsFile, VirtualFileSystem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A DirectStorage queue that reads files from a VFS straight into the
/// resources of a [`HeadlessDevice`].
///
/// Enqueued reads run when the queue is submitted; the submission's fence is
/// then armed like any other device submission.
#[derive(Debug)]
pub struct HeadlessDirectStorageQueue {
    device: HeadlessDevice,
    vfs: Arc<dyn VirtualFileSystem>,
    files: Mutex<HashMap<DStorageFileId, Box<dyn VfsFile>>>,
    pending: Mutex<Vec<DStorageRequest>>,
    next_file_id: AtomicU64,
}

impl HeadlessDirectStorageQueue {
    /// Creates a queue reading from `vfs` into `device`.
    pub fn new(device: HeadlessDevice, vfs: Arc<dyn VirtualFileSystem>) -> Self {
        Self {
            device,
            vfs,
            files: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            next_file_id: AtomicU64::new(0),
        }
    }

    /// Number of files opened and not closed.
    pub fn open_file_count(&self) -> usize {
        lock(&self.files).len()
    }

    fn execute(&self, request: &DStorageRequest) -> Result<(), ResourceError> {
        let mut bytes = vec![0; request.size as usize];
        {
            let mut files = lock(&self.files);
            let file = files.get_mut(&request.file).ok_or(ResourceError::NotFound)?;
            file.read_exact_at(&mut bytes, request.offset)
                .map_err(to_resource_error)?;
        }
        match request.destination {
            DStorageDestination::Buffer { buffer, offset } => {
                self.device.fill_buffer(buffer, offset, &bytes)
            }
            DStorageDestination::Texture { texture } => self.device.fill_texture(texture, &bytes),
        }
    }
}

fn to_resource_error(error: VfsError) -> ResourceError {
    match error {
        VfsError::NotFound { .. } => ResourceError::NotFound,
        other => ResourceError::BackendError(other.to_string()),
    }
}

impl DirectStorageQueue for HeadlessDirectStorageQueue {
    fn open_file(&self, path: &str) -> Result<DStorageFileId, ResourceError> {
        let file = self
            .vfs
            .open(path, OpenMode::Read)
            .map_err(to_resource_error)?;
        let id = DStorageFileId(self.next_file_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.files).insert(id, file);
        log::debug!("HeadlessDirectStorageQueue: Opened '{path}' as {id:?}");
        Ok(id)
    }

    fn query_file_info(&self, file: DStorageFileId) -> Result<DStorageFileInfo, ResourceError> {
        let files = lock(&self.files);
        let file = files.get(&file).ok_or(ResourceError::NotFound)?;
        Ok(DStorageFileInfo {
            file_size: file.size().map_err(to_resource_error)?,
        })
    }

    fn enqueue_request(&self, request: &DStorageRequest) -> Result<(), ResourceError> {
        if !lock(&self.files).contains_key(&request.file) {
            return Err(ResourceError::InvalidHandle);
        }
        lock(&self.pending).push(*request);
        Ok(())
    }

    fn submit(&self, signal_fence: FenceId) -> Result<(), ResourceError> {
        let requests = std::mem::take(&mut *lock(&self.pending));
        log::debug!(
            "HeadlessDirectStorageQueue: Executing {} reads",
            requests.len()
        );
        for request in &requests {
            self.execute(request)?;
        }
        self.device.arm_fence(signal_fence)
    }

    fn close_file(&self, file: DStorageFileId) {
        if lock(&self.files).remove(&file).is_none() {
            log::warn!("HeadlessDirectStorageQueue: Closing unknown file {file:?}");
        }
    }
}
