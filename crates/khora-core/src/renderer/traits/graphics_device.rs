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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The interface for creating GPU resources and submitting copy work.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Returns a queue of the requested kind, if the device exposes one.
    fn get_queue(&self, kind: QueueType) -> Option<QueueId>;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to be destroyed.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data to a CPU-visible GPU buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to.
    /// * `offset` - The offset in the buffer where the data will be written.
    /// * `data` - A slice of bytes containing the data to be written.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a new GPU texture.
    /// ## Arguments
    /// * `descriptor` - A reference to a `TextureDescriptor` containing the texture configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created texture or an error if the creation fails.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    /// ## Arguments
    /// * `id` - The ID of the texture to be destroyed.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a new command encoder recording for `queue`.
    /// ## Arguments
    /// * `queue` - The queue the command buffer will be submitted to.
    /// * `label` - An optional label for the command encoder.
    /// ## Returns
    /// A `Box` containing the created command encoder.
    fn create_command_encoder(
        &self,
        queue: QueueId,
        label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError>;

    /// Creates an unsignaled fence.
    fn create_fence(&self) -> Result<FenceId, ResourceError>;

    /// Submits recorded command buffers to `queue`.
    /// ## Arguments
    /// * `queue` - The queue to execute on; must match the queue of every encoder.
    /// * `command_buffers` - The command buffers, executed in order.
    /// * `signal_fence` - A fence signaled once all of them have completed.
    fn submit(
        &self,
        queue: QueueId,
        command_buffers: &[CommandBufferId],
        signal_fence: Option<FenceId>,
    ) -> Result<(), ResourceError>;

    /// Queries whether the GPU has reached a fence. Never blocks.
    fn query_fence_status(&self, fence: FenceId) -> Result<FenceStatus, ResourceError>;

    /// Destroys a fence. The fence must not be pending.
    fn destroy_fence(&self, fence: FenceId) -> Result<(), ResourceError>;
}
