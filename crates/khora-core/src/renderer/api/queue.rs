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

//! Defines the GPU queue handles used for submission.

/// The kind of work a GPU queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Accepts graphics, compute and copy work.
    Graphics,
    /// Accepts compute and copy work.
    Compute,
    /// Accepts copy work only; usually backed by a DMA engine.
    Transfer,
}

/// An opaque handle to a device queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId {
    /// The kind of queue.
    pub kind: QueueType,
    /// The index of the queue within its family.
    pub index: u32,
}
