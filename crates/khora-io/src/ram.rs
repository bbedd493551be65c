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

//! Reading byte ranges from a virtual filesystem into memory.

use crate::config::ServiceConfig;
use crate::container::TaskContainer;
use crate::error::IoError;
use crate::request::{Request, RequestStatus};
use crate::service::runtime::{ServiceShared, ServiceWorker, TaskOutcome, WorkerCycle};
use crate::service::{delegate_io_service, ServiceHandle};
use crate::task::{Priority, Task, TaskCallbacks};
use khora_core::vfs::{OpenMode, VfsError, VirtualFileSystem};
use std::sync::Arc;

/// A request whose output is the bytes read.
pub type RamRequest = Request<Vec<u8>>;

/// Describes one read.
#[derive(Debug, Default)]
pub struct RamIoDescriptor {
    /// The file to read, relative to the filesystem root.
    pub path: String,
    /// The first byte to read.
    pub offset: u64,
    /// How many bytes to read; `0` reads up to the end of the file.
    pub size: u64,
    /// Dispatch priority.
    pub priority: Priority,
    /// Tie-break between requests of equal priority; higher is dispatched first.
    pub sub_priority: f32,
    /// Callbacks fired as the request changes status.
    pub callbacks: TaskCallbacks,
}

impl RamIoDescriptor {
    /// Reads the whole file at `path` with normal priority.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Restricts the read to `size` bytes starting at `offset`.
    pub fn with_range(mut self, offset: u64, size: u64) -> Self {
        self.offset = offset;
        self.size = size;
        self
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
}

pub(crate) struct RamPayload {
    vfs: Arc<dyn VirtualFileSystem>,
    path: String,
    offset: u64,
    size: u64,
    destination: Option<Vec<u8>>,
}

/// A service that reads file ranges into memory on its own worker thread.
///
/// # Example
///
/// ```no_run
/// use khora_io::{IoService, RamIoDescriptor, RamRequest, RamService, ServiceConfig};
/// use khora_core::vfs::VirtualFileSystem;
/// use std::sync::Arc;
///
/// # fn load(vfs: Arc<dyn VirtualFileSystem>) -> Result<(), khora_io::IoError> {
/// let service = RamService::create(ServiceConfig::new("ram"))?;
/// let request = Arc::new(RamRequest::new());
/// service.request(&vfs, RamIoDescriptor::new("level.pack").with_range(64, 128), &request, None)?;
/// service.drain();
/// let bytes = request.take_output();
/// # Ok(())
/// # }
/// ```
pub struct RamService {
    handle: ServiceHandle<RamPayload, Vec<u8>>,
}

impl RamService {
    /// Creates the service and starts its worker thread.
    pub fn create(config: ServiceConfig) -> Result<Self, IoError> {
        let handle = ServiceHandle::start(&config, |container, shared| RamWorker {
            container,
            shared,
        })?;
        Ok(Self { handle })
    }

    /// Queues a read of `descriptor` from `vfs`, tracked by `request`.
    ///
    /// When `destination` is given, the bytes are read into it (resized to fit)
    /// instead of a fresh allocation.
    ///
    /// # Errors
    /// [`IoError::InvalidDescriptor`] for an empty path or a request still in
    /// flight, [`IoError::QueueFull`] when a critical service is saturated,
    /// [`IoError::ServiceStopped`] after [`destroy`](crate::IoService::destroy).
    pub fn request(
        &self,
        vfs: &Arc<dyn VirtualFileSystem>,
        descriptor: RamIoDescriptor,
        request: &Arc<RamRequest>,
        destination: Option<Vec<u8>>,
    ) -> Result<(), IoError> {
        if descriptor.path.is_empty() {
            return Err(IoError::InvalidDescriptor("empty file path".to_string()));
        }
        let RamIoDescriptor {
            path,
            offset,
            size,
            priority,
            sub_priority,
            callbacks,
        } = descriptor;
        let payload = RamPayload {
            vfs: Arc::clone(vfs),
            path,
            offset,
            size,
            destination,
        };
        self.handle.submit(Task::new(
            request,
            priority,
            sub_priority,
            callbacks,
            payload,
        ))
    }
}

delegate_io_service!(RamService, Vec<u8>);

struct RamWorker {
    container: Arc<TaskContainer<RamPayload, Vec<u8>>>,
    shared: Arc<ServiceShared>,
}

impl RamWorker {
    fn execute(&self, mut task: Task<RamPayload, Vec<u8>>) {
        task.transition(RequestStatus::RamLoading);
        log::debug!(
            "IoService '{}': reading '{}' [{}; {}].",
            self.shared.name(),
            task.payload.path,
            task.payload.offset,
            task.payload.size
        );

        match read_range(&mut task.payload) {
            Ok(bytes) => {
                task.request.store_output(bytes);
                task.transition(RequestStatus::Ok);
                self.shared.task_retired(TaskOutcome::Completed);
            }
            Err(e) => {
                log::error!(
                    "IoService '{}': failed to read '{}': {}",
                    self.shared.name(),
                    task.payload.path,
                    e
                );
                task.fail(e.to_string());
                self.shared.task_retired(TaskOutcome::Failed);
            }
        }
    }
}

impl ServiceWorker for RamWorker {
    fn run_cycle(&mut self) -> WorkerCycle {
        match self.container.peek() {
            Some(task) => {
                self.execute(task);
                WorkerCycle::Busy
            }
            None => WorkerCycle::Idle,
        }
    }
}

fn read_range(payload: &mut RamPayload) -> Result<Vec<u8>, IoError> {
    let mut file = payload.vfs.open(&payload.path, OpenMode::Read)?;
    let file_size = file.size()?;
    if payload.offset > file_size {
        return Err(IoError::InvalidDescriptor(format!(
            "offset {} is past the end of '{}' ({} bytes)",
            payload.offset, payload.path, file_size
        )));
    }

    let available = file_size - payload.offset;
    let size = match payload.size {
        0 => available,
        size => size,
    };
    // Checked against the file before allocating.
    if size > available {
        return Err(VfsError::UnexpectedEof {
            path: payload.path.clone(),
            expected: size,
            read: available,
        }
        .into());
    }
    let len = usize::try_from(size).map_err(|_| {
        IoError::InvalidDescriptor(format!(
            "range of {} bytes in '{}' does not fit in memory",
            size, payload.path
        ))
    })?;

    let mut buffer = payload.destination.take().unwrap_or_default();
    buffer.resize(len, 0);
    file.read_exact_at(&mut buffer, payload.offset)?;
    Ok(buffer)
}
