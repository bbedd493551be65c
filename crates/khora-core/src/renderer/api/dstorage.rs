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

//! Data structures for hardware scatter-gather ("DirectStorage") transfers.
//!
//! A hardware transfer reads file bytes straight into GPU-visible memory,
//! bypassing the staging buffer and the copy queue.

use crate::renderer::{BufferId, TextureId};

/// An opaque handle to a file opened on a [`DirectStorageQueue`].
///
/// [`DirectStorageQueue`]: crate::renderer::DirectStorageQueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DStorageFileId(pub u64);

/// Information reported for an opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DStorageFileInfo {
    /// The length of the file in bytes.
    pub file_size: u64,
}

/// The GPU resource a hardware read lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DStorageDestination {
    /// A byte range of a buffer, starting at `offset`.
    Buffer {
        /// Destination buffer.
        buffer: BufferId,
        /// Byte offset inside the buffer.
        offset: u64,
    },
    /// The base mip level of a texture, tightly packed.
    Texture {
        /// Destination texture.
        texture: TextureId,
    },
}

/// A single read request enqueued on a hardware queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DStorageRequest {
    /// The file to read from.
    pub file: DStorageFileId,
    /// Byte offset in the file.
    pub offset: u64,
    /// Number of bytes to read.
    pub size: u64,
    /// Where the bytes land.
    pub destination: DStorageDestination,
}
