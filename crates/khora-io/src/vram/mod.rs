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

//! Creating GPU resources and filling them from memory or from disk.
//!
//! Every request walks the same pipeline on the worker thread, one step per
//! worker cycle:
//!
//! 1. the destination buffer or texture is created (`CreatingResource`);
//! 2. the transfer is recorded (`VramLoading`), either as a copy from a staging
//!    buffer into a command encoder shared by the batch, or as a read on a
//!    hardware DirectStorage queue;
//! 3. once every request of the batch has been recorded, the batch is submitted
//!    with one fence per queue;
//! 4. when all of the batch's fences have signaled, every request of the batch
//!    moves to `Ok` together.
//!
//! Requests dispatched in the same worker cycle form one batch per transfer kind.
//! Once dispatched, a request can no longer be cancelled.

mod batch;
mod task;
mod worker;

use crate::config::ServiceConfig;
use crate::error::IoError;
use crate::request::{Request, RequestStatus};
use crate::service::{delegate_io_service, ServiceHandle};
use crate::task::{Priority, Task, TaskCallbacks};
use khora_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, DirectStorageQueue, GraphicsDevice, QueueId,
    TextureDescriptor, TextureId, TextureUsage,
};
use std::fmt;
use std::sync::Arc;
use worker::VramWorker;

/// The resource a completed VRAM request hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VramResource {
    /// A filled GPU buffer.
    Buffer(BufferId),
    /// A filled GPU texture.
    Texture(TextureId),
}

/// A request whose output is the created resource.
pub type VramRequest = Request<VramResource>;

/// The resource to create.
#[derive(Debug, Clone)]
pub enum VramResourceDescriptor {
    /// A buffer. For uploads a size of `0` means "the size of the source bytes";
    /// for DirectStorage transfers the size always comes from the file.
    Buffer(BufferDescriptor<'static>),
    /// A texture. Only the base mip level is filled.
    Texture(TextureDescriptor<'static>),
}

/// Where the bytes come from and which queue carries them.
pub enum VramIoKind {
    /// Copy `bytes` through a staging buffer on `queue`.
    Upload {
        /// The queue the copy is recorded for.
        queue: QueueId,
        /// The source bytes.
        bytes: Vec<u8>,
    },
    /// Read the file at `path` straight into the resource on a hardware queue.
    DirectStorage {
        /// The hardware transfer queue.
        queue: Arc<dyn DirectStorageQueue>,
        /// The file to read, as understood by `queue`.
        path: String,
    },
}

impl fmt::Debug for VramIoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VramIoKind::Upload { queue, bytes } => f
                .debug_struct("Upload")
                .field("queue", queue)
                .field("bytes", &bytes.len())
                .finish(),
            VramIoKind::DirectStorage { path, .. } => f
                .debug_struct("DirectStorage")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Describes one GPU load.
#[derive(Debug)]
pub struct VramIoDescriptor {
    /// The device that owns the destination resource.
    pub device: Arc<dyn GraphicsDevice>,
    /// The destination resource.
    pub resource: VramResourceDescriptor,
    /// The source and transfer path.
    pub kind: VramIoKind,
    /// Dispatch priority.
    pub priority: Priority,
    /// Tie-break between requests of equal priority; higher is dispatched first.
    pub sub_priority: f32,
    /// Callbacks fired as the request changes status.
    pub callbacks: TaskCallbacks,
}

impl VramIoDescriptor {
    /// Uploads `bytes` into a new resource through a staging copy on `queue`.
    pub fn upload(
        device: Arc<dyn GraphicsDevice>,
        resource: VramResourceDescriptor,
        queue: QueueId,
        bytes: Vec<u8>,
    ) -> Self {
        Self::with_kind(device, resource, VramIoKind::Upload { queue, bytes })
    }

    /// Reads the file at `path` into a new resource through `queue`.
    pub fn direct_storage(
        device: Arc<dyn GraphicsDevice>,
        resource: VramResourceDescriptor,
        queue: Arc<dyn DirectStorageQueue>,
        path: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            device,
            resource,
            VramIoKind::DirectStorage {
                queue,
                path: path.into(),
            },
        )
    }

    fn with_kind(
        device: Arc<dyn GraphicsDevice>,
        resource: VramResourceDescriptor,
        kind: VramIoKind,
    ) -> Self {
        Self {
            device,
            resource,
            kind,
            priority: Priority::default(),
            sub_priority: 0.0,
            callbacks: TaskCallbacks::new(),
        }
    }

    /// Sets the dispatch priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the tie-break between requests of equal priority.
    pub fn with_sub_priority(mut self, sub_priority: f32) -> Self {
        self.sub_priority = sub_priority;
        self
    }

    /// Replaces the whole callback table.
    pub fn with_callbacks(mut self, callbacks: TaskCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Registers a callback for `status`.
    pub fn on(
        mut self,
        status: RequestStatus,
        callback: impl Fn(RequestStatus) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.set(status, callback);
        self
    }

    /// Checks the descriptor and fills in what can be derived from it.
    fn validate(&mut self) -> Result<(), IoError> {
        match &mut self.resource {
            VramResourceDescriptor::Buffer(desc) => desc.usage |= BufferUsage::COPY_DST,
            VramResourceDescriptor::Texture(desc) => desc.usage |= TextureUsage::COPY_DST,
        }

        match (&self.kind, &mut self.resource) {
            (VramIoKind::Upload { bytes, .. }, _) if bytes.is_empty() => Err(
                IoError::InvalidDescriptor("upload without source bytes".to_string()),
            ),
            (VramIoKind::Upload { bytes, .. }, VramResourceDescriptor::Buffer(desc)) => {
                let len = bytes.len() as u64;
                if desc.size == 0 {
                    desc.size = len;
                }
                if desc.size < len {
                    return Err(IoError::InvalidDescriptor(format!(
                        "{len} source bytes do not fit a {} byte buffer",
                        desc.size
                    )));
                }
                Ok(())
            }
            (VramIoKind::Upload { bytes, .. }, VramResourceDescriptor::Texture(desc)) => {
                let expected = desc.base_level_size();
                if bytes.len() as u64 != expected {
                    return Err(IoError::InvalidDescriptor(format!(
                        "texture upload expects {expected} bytes, got {}",
                        bytes.len()
                    )));
                }
                Ok(())
            }
            (VramIoKind::DirectStorage { path, .. }, _) if path.is_empty() => Err(
                IoError::InvalidDescriptor("empty file path".to_string()),
            ),
            (VramIoKind::DirectStorage { .. }, _) => Ok(()),
        }
    }
}

pub(crate) struct VramPayload {
    pub(crate) device: Arc<dyn GraphicsDevice>,
    pub(crate) resource: VramResourceDescriptor,
    pub(crate) kind: VramIoKind,
}

/// A service that creates and fills GPU resources on its own worker thread.
pub struct VramService {
    handle: ServiceHandle<VramPayload, VramResource>,
}

impl VramService {
    /// Creates the service and starts its worker thread.
    pub fn create(config: ServiceConfig) -> Result<Self, IoError> {
        let handle = ServiceHandle::start(&config, VramWorker::new)?;
        Ok(Self { handle })
    }

    /// Queues the load described by `descriptor`, tracked by `request`.
    ///
    /// # Errors
    /// [`IoError::InvalidDescriptor`] when the source cannot fill the
    /// destination or the request is still in flight, [`IoError::QueueFull`] when a critical service is
    /// saturated, [`IoError::ServiceStopped`] after
    /// [`destroy`](crate::IoService::destroy).
    pub fn request(
        &self,
        mut descriptor: VramIoDescriptor,
        request: &Arc<VramRequest>,
    ) -> Result<(), IoError> {
        descriptor.validate()?;
        let VramIoDescriptor {
            device,
            resource,
            kind,
            priority,
            sub_priority,
            callbacks,
        } = descriptor;
        self.handle.submit(Task::new(
            request,
            priority,
            sub_priority,
            callbacks,
            VramPayload {
                device,
                resource,
                kind,
            },
        ))
    }
}

delegate_io_service!(VramService, VramResource);
