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

//! Defines data structures used for recording and describing GPU copy commands.

use crate::renderer::api::queue::QueueType;
use crate::renderer::{BufferId, TextureId};

/// An opaque handle to a recorded command buffer that is ready for submission.
///
/// This ID is returned by [`CommandEncoder::finish`] and consumed by
/// [`GraphicsDevice::submit`].
///
/// [`CommandEncoder::finish`]: crate::renderer::CommandEncoder::finish
/// [`GraphicsDevice::submit`]: crate::renderer::GraphicsDevice::submit
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// The logical state a resource is in between two GPU operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Initial state of a freshly created resource.
    Undefined,
    /// The resource is the destination of a copy.
    CopyDest,
    /// The resource is the source of a copy.
    CopySource,
    /// The resource is read by shaders.
    ShaderResource,
    /// The resource is readable by any stage; used after a queue transfer.
    Common,
}

/// A state transition for a buffer.
///
/// When `queue_release` is set, the barrier also releases ownership of the buffer
/// from the recording queue so that a queue of the given type can acquire it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    /// The buffer that transitions.
    pub buffer: BufferId,
    /// The state before the barrier.
    pub src_state: ResourceState,
    /// The state after the barrier.
    pub dst_state: ResourceState,
    /// The queue family that will acquire the buffer, if ownership moves.
    pub queue_release: Option<QueueType>,
}

/// A state transition for a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    /// The texture that transitions.
    pub texture: TextureId,
    /// The state before the barrier.
    pub src_state: ResourceState,
    /// The state after the barrier.
    pub dst_state: ResourceState,
    /// The queue family that will acquire the texture, if ownership moves.
    pub queue_release: Option<QueueType>,
}
