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
use khora_core::math::Extent3D;
use khora_core::renderer::traits::CommandEncoder;
use khora_core::renderer::{
    BufferBarrier, BufferId, CommandBufferId, QueueId, ResourceError, TextureBarrier, TextureId,
};

/// A command recorded by a [`HeadlessCommandEncoder`], executed at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordedCommand {
    CopyBufferToBuffer {
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        source: BufferId,
        source_offset: u64,
        bytes_per_row: u32,
        destination: TextureId,
        size: Extent3D,
    },
    Barrier {
        count: usize,
    },
}

/// Records commands for one queue of a [`HeadlessDevice`].
#[derive(Debug)]
pub struct HeadlessCommandEncoder {
    device: HeadlessDevice,
    queue: QueueId,
    label: Option<String>,
    commands: Vec<RecordedCommand>,
}

impl HeadlessCommandEncoder {
    pub(crate) fn new(device: HeadlessDevice, queue: QueueId, label: Option<String>) -> Self {
        Self {
            device,
            queue,
            label,
            commands: Vec::new(),
        }
    }
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn queue(&self) -> QueueId {
        self.queue
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferId,
        source_offset: u64,
        destination: &BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToBuffer {
            source: *source,
            source_offset,
            destination: *destination,
            destination_offset,
            size,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: &BufferId,
        source_offset: u64,
        bytes_per_row: u32,
        destination: &TextureId,
        size: Extent3D,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToTexture {
            source: *source,
            source_offset,
            bytes_per_row,
            destination: *destination,
            size,
        });
    }

    fn resource_barrier(&mut self, buffers: &[BufferBarrier], textures: &[TextureBarrier]) {
        let count = buffers.len() + textures.len();
        if count > 0 {
            self.commands.push(RecordedCommand::Barrier { count });
        }
    }

    fn finish(self: Box<Self>) -> Result<CommandBufferId, ResourceError> {
        log::trace!(
            "HeadlessCommandEncoder '{}': finished with {} commands",
            self.label.as_deref().unwrap_or_default(),
            self.commands.len()
        );
        let Self {
            device,
            queue,
            commands,
            ..
        } = *self;
        Ok(device.register_command_buffer(queue, commands))
    }
}
