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

//! Concrete implementations of the contracts defined in `khora-core`.
//!
//! - [`vfs`]: a filesystem rooted at a local directory and an in-memory one.
//! - [`graphics::headless`]: a GPU device that keeps resources in CPU memory,
//!   and a DirectStorage queue that reads through a VFS. Used by tools and tests
//!   that run without a graphics adapter.

pub mod graphics;
pub mod vfs;

pub use graphics::headless::{HeadlessDevice, HeadlessDirectStorageQueue, HeadlessLimits};
pub use vfs::{LocalFileSystem, MemoryFileSystem};
