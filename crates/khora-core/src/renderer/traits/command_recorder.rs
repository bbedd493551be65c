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

use crate::math::Extent3D;
use crate::renderer::api::command::{BufferBarrier, CommandBufferId, TextureBarrier};
use crate::renderer::api::queue::QueueId;
use crate::renderer::error::ResourceError;
use crate::renderer::{BufferId, TextureId};

/// A trait for an object that records a sequence of GPU copy commands.
///
/// An encoder is bound to the queue it was created for. It is the main tool for
/// building a [`CommandBufferId`]: it records copies and barriers, then
/// [`finish`](CommandEncoder::finish) seals it for submission on that queue.
///
/// Encoders are `Send` so that they can be created and owned by a worker thread.
pub trait CommandEncoder: Send {
    /// The queue this encoder records for.
    fn queue(&self) -> QueueId;

    /// Records a command to copy data from one buffer to another on the GPU.
    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferId,
        source_offset: u64,
        destination: &BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Records a command to copy tightly packed rows from a buffer into the base
    /// mip level of a texture.
    fn copy_buffer_to_texture(
        &mut self,
        source: &BufferId,
        source_offset: u64,
        bytes_per_row: u32,
        destination: &TextureId,
        size: Extent3D,
    );

    /// Records resource state transitions.
    fn resource_barrier(&mut self, buffers: &[BufferBarrier], textures: &[TextureBarrier]);

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    ///
    /// This method consumes the encoder. The returned [`CommandBufferId`] can then
    /// be submitted to the [`GraphicsDevice`](crate::renderer::GraphicsDevice).
    fn finish(self: Box<Self>) -> Result<CommandBufferId, ResourceError>;
}
