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

//! Defines GPU synchronization primitives.

/// An opaque handle to a fence, signaled by the GPU when submitted work completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub u64);

/// The observable state of a [`FenceId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// The fence has been signaled; all work submitted with it has completed.
    Complete,
    /// The fence was submitted but the GPU has not reached it yet.
    Incomplete,
    /// The fence has never been passed to a submission.
    NotSubmitted,
}
