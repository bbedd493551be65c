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

use super::command::{HeadlessCommandEncoder, RecordedCommand};
use super::lock;
use khora_core::math::Extent3D;
use khora_core::renderer::traits::CommandEncoder;
use khora_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CommandBufferId, FenceId, FenceStatus,
    GraphicsDevice, QueueId, QueueType, ResourceError, TextureDescriptor, TextureId,
    TextureUsage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Tunables of a [`HeadlessDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessLimits {
    /// Largest buffer or texture the device accepts, in bytes.
    pub max_buffer_size: u64,
    /// How many status queries a submitted fence answers `Incomplete` before it completes.
    pub fence_latency: u32,
}

impl Default for HeadlessLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 * 1024 * 1024,
            fence_latency: 1,
        }
    }
}

#[derive(Debug)]
struct HeadlessBufferEntry {
    data: Vec<u8>,
    usage: BufferUsage,
}

#[derive(Debug)]
struct HeadlessTextureEntry {
    data: Vec<u8>,
    size: Extent3D,
    bytes_per_row: u32,
    usage: TextureUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Pending { remaining_queries: u32 },
    Signaled,
}

#[derive(Debug)]
struct PendingCommandBuffer {
    queue: QueueId,
    commands: Vec<RecordedCommand>,
}

/// The internal, non-clonable state of the [`HeadlessDevice`].
#[derive(Debug)]
struct HeadlessDeviceInternal {
    limits: HeadlessLimits,
    buffers: Mutex<HashMap<BufferId, HeadlessBufferEntry>>,
    textures: Mutex<HashMap<TextureId, HeadlessTextureEntry>>,
    fences: Mutex<HashMap<FenceId, FenceState>>,
    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, PendingCommandBuffer>>,

    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_fence_id: AtomicU64,
    command_buffer_id_counter: AtomicU64,

    allocated_bytes: AtomicUsize,
    submission_count: AtomicUsize,
    barrier_count: AtomicUsize,
    fence_query_count: AtomicUsize,
}

/// A clonable, thread-safe handle to a GPU device living in CPU memory.
///
/// Offers one queue of each [`QueueType`], all with index 0.
#[derive(Clone, Debug)]
pub struct HeadlessDevice {
    internal: Arc<HeadlessDeviceInternal>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessLimits::default())
    }
}

impl HeadlessDevice {
    /// Creates a device with the given limits.
    pub fn new(limits: HeadlessLimits) -> Self {
        Self {
            internal: Arc::new(HeadlessDeviceInternal {
                limits,
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                fences: Mutex::new(HashMap::new()),
                pending_command_buffers: Mutex::new(HashMap::new()),
                next_buffer_id: AtomicUsize::new(0),
                next_texture_id: AtomicUsize::new(0),
                next_fence_id: AtomicU64::new(0),
                command_buffer_id_counter: AtomicU64::new(0),
                allocated_bytes: AtomicUsize::new(0),
                submission_count: AtomicUsize::new(0),
                barrier_count: AtomicUsize::new(0),
                fence_query_count: AtomicUsize::new(0),
            }),
        }
    }

    /// The limits the device was created with.
    pub fn limits(&self) -> HeadlessLimits {
        self.internal.limits
    }

    // --- Inspection ---

    /// A copy of the contents of `id`, if it exists.
    pub fn read_buffer(&self, id: BufferId) -> Option<Vec<u8>> {
        lock(&self.internal.buffers)
            .get(&id)
            .map(|entry| entry.data.clone())
    }

    /// A copy of the base level of `id`, if it exists.
    pub fn read_texture(&self, id: TextureId) -> Option<Vec<u8>> {
        lock(&self.internal.textures)
            .get(&id)
            .map(|entry| entry.data.clone())
    }

    /// Number of buffers created and not destroyed.
    pub fn live_buffer_count(&self) -> usize {
        lock(&self.internal.buffers).len()
    }

    /// Number of textures created and not destroyed.
    pub fn live_texture_count(&self) -> usize {
        lock(&self.internal.textures).len()
    }

    /// Number of fences created and not destroyed.
    pub fn live_fence_count(&self) -> usize {
        lock(&self.internal.fences).len()
    }

    /// Bytes held by live buffers and textures.
    pub fn allocated_bytes(&self) -> usize {
        self.internal.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Number of successful calls to [`GraphicsDevice::submit`].
    pub fn submission_count(&self) -> usize {
        self.internal.submission_count.load(Ordering::Relaxed)
    }

    /// Number of barriers executed by submitted command buffers.
    pub fn barrier_count(&self) -> usize {
        self.internal.barrier_count.load(Ordering::Relaxed)
    }

    /// Number of calls to [`GraphicsDevice::query_fence_status`].
    pub fn fence_query_count(&self) -> usize {
        self.internal.fence_query_count.load(Ordering::Relaxed)
    }

    // --- Crate-internal plumbing ---

    pub(crate) fn register_command_buffer(
        &self,
        queue: QueueId,
        commands: Vec<RecordedCommand>,
    ) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::Relaxed),
        );
        lock(&self.internal.pending_command_buffers)
            .insert(id, PendingCommandBuffer { queue, commands });
        id
    }

    /// Arms `fence` as if work had been submitted with it.
    pub(crate) fn arm_fence(&self, fence: FenceId) -> Result<(), ResourceError> {
        let mut fences = lock(&self.internal.fences);
        let state = fences.get_mut(&fence).ok_or(ResourceError::NotFound)?;
        *state = FenceState::Pending {
            remaining_queries: self.internal.limits.fence_latency,
        };
        Ok(())
    }

    /// Writes `data` at `offset` of a buffer without the mapping check.
    pub(crate) fn fill_buffer(
        &self,
        id: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers);
        let entry = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        write_range(&mut entry.data, offset, data)
    }

    /// Overwrites the start of a texture's base level.
    pub(crate) fn fill_texture(&self, id: TextureId, data: &[u8]) -> Result<(), ResourceError> {
        let mut textures = lock(&self.internal.textures);
        let entry = textures.get_mut(&id).ok_or(ResourceError::NotFound)?;
        write_range(&mut entry.data, 0, data)
    }

    fn check_allocation(&self, size: u64) -> Result<(), ResourceError> {
        if size == 0 {
            return Err(ResourceError::BackendError(
                "zero-sized allocation".to_string(),
            ));
        }
        if size > self.internal.limits.max_buffer_size {
            return Err(ResourceError::OutOfMemory { requested: size });
        }
        Ok(())
    }

    fn execute(&self, command: &RecordedCommand) -> Result<(), ResourceError> {
        match *command {
            RecordedCommand::CopyBufferToBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                let mut buffers = lock(&self.internal.buffers);
                let src = buffers.get(&source).ok_or(ResourceError::NotFound)?;
                if !src.usage.contains(BufferUsage::COPY_SRC) {
                    return Err(ResourceError::BackendError(format!(
                        "buffer {source:?} is missing COPY_SRC"
                    )));
                }
                let bytes = read_range(&src.data, source_offset, size)?.to_vec();
                let dst = buffers.get_mut(&destination).ok_or(ResourceError::NotFound)?;
                if !dst.usage.contains(BufferUsage::COPY_DST) {
                    return Err(ResourceError::BackendError(format!(
                        "buffer {destination:?} is missing COPY_DST"
                    )));
                }
                write_range(&mut dst.data, destination_offset, &bytes)
            }
            RecordedCommand::CopyBufferToTexture {
                source,
                source_offset,
                bytes_per_row,
                destination,
                size,
            } => {
                let bytes = {
                    let buffers = lock(&self.internal.buffers);
                    let src = buffers.get(&source).ok_or(ResourceError::NotFound)?;
                    let rows = size.height as u64 * size.depth_or_array_layers as u64;
                    read_range(&src.data, source_offset, rows * bytes_per_row as u64)?.to_vec()
                };
                let mut textures = lock(&self.internal.textures);
                let dst = textures
                    .get_mut(&destination)
                    .ok_or(ResourceError::NotFound)?;
                if !dst.usage.contains(TextureUsage::COPY_DST) {
                    return Err(ResourceError::BackendError(format!(
                        "texture {destination:?} is missing COPY_DST"
                    )));
                }
                if size != dst.size || bytes_per_row != dst.bytes_per_row {
                    return Err(ResourceError::OutOfBounds);
                }
                write_range(&mut dst.data, 0, &bytes)
            }
            RecordedCommand::Barrier { count } => {
                self.internal
                    .barrier_count
                    .fetch_add(count, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}

fn read_range(data: &[u8], offset: u64, size: u64) -> Result<&[u8], ResourceError> {
    let start = usize::try_from(offset).map_err(|_| ResourceError::OutOfBounds)?;
    let end = offset
        .checked_add(size)
        .and_then(|end| usize::try_from(end).ok())
        .ok_or(ResourceError::OutOfBounds)?;
    data.get(start..end).ok_or(ResourceError::OutOfBounds)
}

fn write_range(data: &mut [u8], offset: u64, bytes: &[u8]) -> Result<(), ResourceError> {
    let start = usize::try_from(offset).map_err(|_| ResourceError::OutOfBounds)?;
    let end = start
        .checked_add(bytes.len())
        .ok_or(ResourceError::OutOfBounds)?;
    data.get_mut(start..end)
        .ok_or(ResourceError::OutOfBounds)?
        .copy_from_slice(bytes);
    Ok(())
}

impl GraphicsDevice for HeadlessDevice {
    fn get_queue(&self, kind: QueueType) -> Option<QueueId> {
        Some(QueueId { kind, index: 0 })
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.check_allocation(descriptor.size)?;
        let id = BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.internal.buffers).insert(
            id,
            HeadlessBufferEntry {
                data: vec![0; descriptor.size as usize],
                usage: descriptor.usage,
            },
        );
        self.internal
            .allocated_bytes
            .fetch_add(descriptor.size as usize, Ordering::Relaxed);

        log::debug!(
            "HeadlessDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.buffers)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        self.internal
            .allocated_bytes
            .fetch_sub(entry.data.len(), Ordering::Relaxed);
        log::debug!("HeadlessDevice: Destroyed buffer with ID: {id:?}");
        Ok(())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers);
        let entry = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        if !entry.usage.contains(BufferUsage::MAP_WRITE) {
            return Err(ResourceError::BackendError(format!(
                "buffer {id:?} is not mappable for writing"
            )));
        }
        write_range(&mut entry.data, offset, data)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let size = descriptor.base_level_size();
        self.check_allocation(size)?;
        let id = TextureId(self.internal.next_texture_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.internal.textures).insert(
            id,
            HeadlessTextureEntry {
                data: vec![0; size as usize],
                size: descriptor.size,
                bytes_per_row: descriptor.bytes_per_row(),
                usage: descriptor.usage,
            },
        );
        self.internal
            .allocated_bytes
            .fetch_add(size as usize, Ordering::Relaxed);

        log::debug!(
            "HeadlessDevice: Created texture '{}' with ID: {:?}, {:?} {:?}",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size,
            descriptor.format
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.textures)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        self.internal
            .allocated_bytes
            .fetch_sub(entry.data.len(), Ordering::Relaxed);
        log::debug!("HeadlessDevice: Destroyed texture with ID: {id:?}");
        Ok(())
    }

    fn create_command_encoder(
        &self,
        queue: QueueId,
        label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError> {
        if self.get_queue(queue.kind) != Some(queue) {
            return Err(ResourceError::QueueUnavailable(format!("{queue:?}")));
        }
        Ok(Box::new(HeadlessCommandEncoder::new(
            self.clone(),
            queue,
            label.map(str::to_string),
        )))
    }

    fn create_fence(&self) -> Result<FenceId, ResourceError> {
        let id = FenceId(self.internal.next_fence_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.internal.fences).insert(id, FenceState::Unsignaled);
        Ok(id)
    }

    fn submit(
        &self,
        queue: QueueId,
        command_buffers: &[CommandBufferId],
        signal_fence: Option<FenceId>,
    ) -> Result<(), ResourceError> {
        for id in command_buffers {
            let pending = lock(&self.internal.pending_command_buffers)
                .remove(id)
                .ok_or(ResourceError::NotFound)?;
            if pending.queue != queue {
                return Err(ResourceError::BackendError(format!(
                    "command buffer {id:?} was recorded for {:?}, submitted to {queue:?}",
                    pending.queue
                )));
            }
            for command in &pending.commands {
                self.execute(command)?;
            }
        }
        if let Some(fence) = signal_fence {
            self.arm_fence(fence)?;
        }
        self.internal
            .submission_count
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn query_fence_status(&self, fence: FenceId) -> Result<FenceStatus, ResourceError> {
        self.internal
            .fence_query_count
            .fetch_add(1, Ordering::Relaxed);
        let mut fences = lock(&self.internal.fences);
        let state = fences.get_mut(&fence).ok_or(ResourceError::NotFound)?;
        Ok(match *state {
            FenceState::Unsignaled => FenceStatus::NotSubmitted,
            FenceState::Pending {
                remaining_queries: 0,
            }
            | FenceState::Signaled => {
                *state = FenceState::Signaled;
                FenceStatus::Complete
            }
            FenceState::Pending { remaining_queries } => {
                *state = FenceState::Pending {
                    remaining_queries: remaining_queries - 1,
                };
                FenceStatus::Incomplete
            }
        })
    }

    fn destroy_fence(&self, fence: FenceId) -> Result<(), ResourceError> {
        lock(&self.internal.fences)
            .remove(&fence)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }
}
